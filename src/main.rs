#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use clamfront::{cli, config, log::LogSettings, ClamFront, Flags};
use std::process::ExitCode;
use std::time::Instant;

pub fn main() -> ExitCode {
    let custom_settings = match cli::parse_args(std::env::args()) {
        Ok(c) => c.settings,
        Err(e) => return e,
    };

    let now = Instant::now();

    let store = if let Some(path) = custom_settings {
        config::SettingsStore::load_path(path)
    } else {
        config::SettingsStore::load()
    };

    let elapsed = now.elapsed();

    // if we could not initialize the logger, hand the error to the ui
    // so it shows up in the output pane
    let startup_error = store
        .section::<LogSettings>("advanced")
        .init_logger()
        .err();

    ::log::debug!(
        "Loaded settings from {} in {:.6} sec",
        store.path().display(),
        elapsed.as_secs_f32()
    );

    let flags = Flags {
        store,
        startup_error,
    };

    iced::application(ClamFront::title, ClamFront::update, ClamFront::view)
        .subscription(ClamFront::subscription)
        .theme(ClamFront::theme)
        .window_size((900.0, 650.0))
        .run_with(move || ClamFront::new(flags))
        .map(|_| ExitCode::SUCCESS)
        .unwrap_or(ExitCode::FAILURE)
}
