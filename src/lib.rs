//! clamfront is a binary crate that is not intended to be used as a
//! library. Its API is unstable and only exists in order to support
//! integration testing.

use iced::widget::{
    button, column, container, horizontal_space, progress_bar, row, scrollable, text, Column,
};
use iced::{window, Element, Length, Subscription, Task};
use std::path::{Path, PathBuf};

pub mod cli;
pub mod config;
mod dispatch;
pub mod error;
pub mod log;
mod platform;
pub mod quarantine;
mod quarantine_view;
pub mod scanner;
pub mod settings;
mod settings_view;
mod ui;

use quarantine::QuarantineManager;
use settings::{DarkMode, InterfaceSettings, NotificationSettings, QuarantineSettings};

lazy_static::lazy_static! {
    static ref OUTPUT_ID: scrollable::Id = scrollable::Id::unique();
}

const RULE: &str = "--------------------------------------------------";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub enum Message {
    DispatcherReady(dispatch::Dispatcher),
    Worker(scanner::Event),
    QuickScan,
    FullScan,
    CustomScan,
    CustomScanPicked(Option<PathBuf>),
    StopScan,
    UpdateDatabase,
    ShowMain,
    ShowSettings,
    ShowQuarantine,
    ShowAbout,
    Settings(settings_view::Message),
    Quarantine(quarantine_view::Message),
}

// everything main hands over to the ui
pub struct Flags {
    pub store: config::SettingsStore,
    pub startup_error: Option<error::Error>,
}

enum Page {
    Main,
    Settings(settings_view::SettingsEditor),
    Quarantine(quarantine_view::QuarantineView),
    About,
}

struct RunningScan {
    id: scanner::ScanId,
    label: String,
    detections: Vec<scanner::Detection>,
}

pub struct ClamFront {
    store: config::SettingsStore,
    clamav: scanner::ClamAv,
    installed: bool,
    dispatcher: Option<dispatch::Dispatcher>,
    quarantine: Option<QuarantineManager>,
    quarantine_settings: QuarantineSettings,
    notifications: NotificationSettings,
    dark_mode: DarkMode,
    page: Page,
    output: Vec<String>,
    status: String,
    progress: f32,
    scan: Option<RunningScan>,
    updating: bool,
    last_scan: Option<String>,
}

fn now() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

impl ClamFront {
    pub fn new(flags: Flags) -> (Self, Task<Message>) {
        let mut app = Self {
            store: flags.store,
            clamav: scanner::ClamAv::new(),
            installed: false,
            dispatcher: None,
            quarantine: None,
            quarantine_settings: QuarantineSettings::default(),
            notifications: NotificationSettings::default(),
            dark_mode: DarkMode::default(),
            page: Page::Main,
            output: Vec::new(),
            status: "Ready".into(),
            progress: 0.0,
            scan: None,
            updating: false,
            last_scan: None,
        };
        app.apply_settings();

        if let Some(e) = flags.startup_error {
            app.output.push(e.to_string());
        }

        app.installed = app.clamav.is_installed();
        if !app.installed {
            app.status = "ClamAV Not Installed".into();
            app.output.extend([
                "ClamAV antivirus engine is not installed on your system.".to_string(),
                format!("To install ClamAV, run: {}", platform::INSTALL_HINT),
            ]);
        }

        if let Some(manager) = &app.quarantine {
            if let Err(e) = manager.sweep(app.quarantine_settings.retention_days) {
                ::log::error!("{}", e);
            }
        }

        let interface: InterfaceSettings = app.store.section("interface");
        let task = if interface.start_minimized {
            window::get_oldest().and_then(|id| window::minimize(id, true))
        } else {
            Task::none()
        };

        (app, task)
    }

    // push the current settings into the parts of the app that cache them
    fn apply_settings(&mut self) {
        self.clamav.set_scan_options(
            self.store.section("scan_options"),
            self.store.section("exclusions"),
        );
        self.notifications = self.store.section("notifications");
        self.dark_mode = self.store.section::<InterfaceSettings>("interface").dark_mode;
        self.quarantine_settings = self.store.section("quarantine");
        self.quarantine = match QuarantineManager::from_settings(&self.quarantine_settings) {
            Ok(m) => Some(m),
            Err(e) => {
                ::log::error!("Quarantine unavailable: {}", e);
                None
            }
        };
    }

    pub fn title(&self) -> String {
        match self.scan.as_ref() {
            Some(scan) => format!("clamfront - {}", scan.label),
            None => String::from("clamfront"),
        }
    }

    pub fn theme(&self) -> iced::Theme {
        ui::theme(self.dark_mode)
    }

    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::run(dispatch::bridge)
    }

    fn append<S: Into<String>>(&mut self, line: S) -> Task<Message> {
        self.output.push(line.into());
        scrollable::snap_to(OUTPUT_ID.clone(), scrollable::RelativeOffset::END)
    }

    fn start_scan(&mut self, label: &str, path: &Path) -> Task<Message> {
        let dispatcher = match &self.dispatcher {
            Some(d) => d.clone(),
            None => return self.append("Scanner is still starting up, try again"),
        };

        self.output.clear();
        self.output.push(format!("Starting {} of: {}", label, path.display()));
        self.output.push(format!("Scan started at: {}", now()));
        self.output.push(RULE.into());

        let sink = move |event| dispatcher.send(Message::Worker(event));
        match self.clamav.scan_path(path, sink) {
            Some(id) => {
                self.scan = Some(RunningScan {
                    id,
                    label: label.to_string(),
                    detections: Vec::new(),
                });
                self.status = format!("Scanning: {}", label);
                self.progress = 0.0;
            }
            None => self.output.push("A scan is already running".into()),
        }
        scrollable::snap_to(OUTPUT_ID.clone(), scrollable::RelativeOffset::END)
    }

    fn finish_scan(&mut self, scan: RunningScan, outcome: scanner::Outcome) -> Task<Message> {
        self.output.push(RULE.into());
        if outcome.success {
            self.output.push("Scan completed successfully!".into());
            self.status = "Scan Complete".into();
            self.progress = 1.0;
        } else if outcome.threats_found() {
            self.output.push("Scan completed: threats found!".into());
            self.status = "Threats Found".into();
            self.progress = 1.0;
        } else {
            self.output.push(format!("Scan failed: {}", outcome.error.trim()));
            self.status = "Scan Failed".into();
            self.progress = 0.0;
        }

        if self.notifications.show_threats_found && !scan.detections.is_empty() {
            self.output
                .push(format!("{} threat(s) found:", scan.detections.len()));
            for d in &scan.detections {
                self.output
                    .push(format!("  {} ({})", d.path.display(), d.threat));
            }
        }

        if self.quarantine_settings.auto_quarantine {
            self.quarantine_detections(&scan.detections);
        }

        let finished = now();
        self.output.push(format!("Scan finished at: {}", finished));
        self.last_scan = Some(finished);
        scrollable::snap_to(OUTPUT_ID.clone(), scrollable::RelativeOffset::END)
    }

    fn quarantine_detections(&mut self, detections: &[scanner::Detection]) {
        let manager = match &self.quarantine {
            Some(m) => m,
            None => {
                if !detections.is_empty() {
                    self.output
                        .push("Quarantine directory is not available".into());
                }
                return;
            }
        };
        for d in detections {
            let line = match manager.quarantine(&d.path, &d.threat) {
                Ok(_) => format!("Quarantined: {}", d.path.display()),
                Err(e) => {
                    ::log::error!("{}", e);
                    format!("Could not quarantine {}: {}", d.path.display(), e)
                }
            };
            self.output.push(line);
        }
    }

    fn handle_worker(&mut self, event: scanner::Event) -> Task<Message> {
        match event {
            scanner::Event::ScanLine(id, line) => match self.scan.as_ref() {
                Some(scan) if scan.id == id => self.append(line),
                _ => Task::none(),
            },
            scanner::Event::Detected(id, detection) => {
                if let Some(scan) = self.scan.as_mut().filter(|s| s.id == id) {
                    scan.detections.push(detection);
                }
                Task::none()
            }
            scanner::Event::ScanFinished(id, outcome) => match self.scan.take() {
                Some(scan) if scan.id == id => self.finish_scan(scan, outcome),
                other => {
                    // a stopped scan reporting in late
                    ::log::debug!("ignoring result of scan {}", id);
                    self.scan = other;
                    Task::none()
                }
            },
            scanner::Event::UpdateFinished(outcome) => {
                self.updating = false;
                if outcome.success {
                    self.append("Database updated successfully!")
                } else {
                    let reason = if outcome.error.trim().is_empty() {
                        outcome.output.trim().to_string()
                    } else {
                        outcome.error.trim().to_string()
                    };
                    self.append(format!("Database update failed: {}", reason))
                }
            }
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::DispatcherReady(d) => {
                self.dispatcher = Some(d);
                Task::none()
            }
            Message::Worker(event) => self.handle_worker(event),
            Message::QuickScan => match platform::home_dir() {
                Ok(home) => self.start_scan("Quick Scan", &home),
                Err(e) => self.append(error::Error::PlatformError(e).to_string()),
            },
            Message::FullScan => self.start_scan("Full System Scan", &platform::full_scan_root()),
            Message::CustomScan => Task::perform(
                async {
                    rfd::AsyncFileDialog::new()
                        .set_title("Choose Directory to Scan")
                        .pick_folder()
                        .await
                        .map(|h| h.path().to_path_buf())
                },
                Message::CustomScanPicked,
            ),
            Message::CustomScanPicked(Some(path)) => self.start_scan("Custom Scan", &path),
            Message::CustomScanPicked(None) => Task::none(),
            Message::StopScan => {
                if self.scan.take().is_none() {
                    return Task::none();
                }
                self.clamav.stop();
                self.status = "Scan Stopped".into();
                self.progress = 0.0;
                self.append("Scan stopped by user")
            }
            Message::UpdateDatabase => {
                let dispatcher = match &self.dispatcher {
                    Some(d) => d.clone(),
                    None => return Task::none(),
                };
                self.updating = true;
                self.clamav
                    .update_database(move |event| dispatcher.send(Message::Worker(event)));
                self.append("Updating virus database...")
            }
            Message::ShowMain => {
                self.page = Page::Main;
                Task::none()
            }
            Message::ShowSettings => {
                self.page = Page::Settings(settings_view::SettingsEditor::new(
                    self.store.settings(),
                ));
                Task::none()
            }
            Message::ShowQuarantine => {
                self.page = Page::Quarantine(quarantine_view::QuarantineView::new(
                    self.quarantine.as_ref(),
                ));
                Task::none()
            }
            Message::ShowAbout => {
                self.page = Page::About;
                Task::none()
            }
            Message::Settings(msg) => {
                let editor = match &mut self.page {
                    Page::Settings(editor) => editor,
                    _ => return Task::none(),
                };
                match editor.update(msg) {
                    settings_view::Action::None => Task::none(),
                    settings_view::Action::Run(task) => task.map(Message::Settings),
                    settings_view::Action::Close => {
                        self.page = Page::Main;
                        Task::none()
                    }
                    settings_view::Action::Save { settings, close } => {
                        if let Err(e) = self.store.replace(settings) {
                            ::log::error!("Error saving settings: {}", e);
                            self.output.push(e.to_string());
                        }
                        self.apply_settings();
                        if close {
                            self.page = Page::Main;
                        }
                        Task::none()
                    }
                }
            }
            Message::Quarantine(msg) => {
                let retention_days = self.quarantine_settings.retention_days;
                let manager = self.quarantine.as_ref();
                let view = match &mut self.page {
                    Page::Quarantine(view) => view,
                    _ => return Task::none(),
                };
                if let quarantine_view::Action::Close = view.update(msg, manager, retention_days) {
                    self.page = Page::Main;
                }
                Task::none()
            }
        }
    }

    fn main_view(&self) -> Element<'_, Message> {
        let scanning = self.scan.is_some();
        let can_scan = self.installed && !scanning;

        let status_line = if self.installed {
            text("System Status: Protected")
                .size(ui::HEADING_SIZE)
                .style(text::success)
        } else {
            text("System Status: ClamAV Not Installed")
                .size(ui::HEADING_SIZE)
                .style(text::danger)
        };
        let last_scan = match &self.last_scan {
            Some(t) => format!("Last scan: {}", t),
            None => "Last scan: never".into(),
        };

        let header = row![status_line, horizontal_space(), text(last_scan)]
            .align_y(iced::alignment::Vertical::Center);

        let scans = row![
            button("Quick Scan").on_press_maybe(can_scan.then_some(Message::QuickScan)),
            button("Full Scan").on_press_maybe(can_scan.then_some(Message::FullScan)),
            button("Custom Scan").on_press_maybe(can_scan.then_some(Message::CustomScan)),
            button("Stop")
                .style(button::danger)
                .on_press_maybe(scanning.then_some(Message::StopScan)),
            horizontal_space(),
            button("Update Database").on_press_maybe(
                (self.installed && !self.updating).then_some(Message::UpdateDatabase)
            ),
            button("Quarantine")
                .style(button::secondary)
                .on_press(Message::ShowQuarantine),
            button("Settings")
                .style(button::secondary)
                .on_press(Message::ShowSettings),
            button("About")
                .style(button::secondary)
                .on_press(Message::ShowAbout),
        ]
        .spacing(ui::SPACING);

        let progress = row![
            text(self.status.as_str()).width(Length::FillPortion(1)),
            progress_bar(0.0..=1.0, self.progress).width(Length::FillPortion(3)),
        ]
        .spacing(ui::SPACING)
        .align_y(iced::alignment::Vertical::Center);

        let lines = self.output.iter().fold(Column::new(), |col, line| {
            col.push(
                text(line.as_str())
                    .size(ui::TEXT_SIZE)
                    .font(iced::Font::MONOSPACE),
            )
        });
        let output = container(
            scrollable(container(lines).padding(ui::SPACING).width(Length::Fill))
                .id(OUTPUT_ID.clone())
                .height(Length::Fill),
        )
        .style(container::bordered_box)
        .height(Length::Fill);

        column![header, scans, progress, output]
            .spacing(ui::SPACING)
            .padding(ui::PADDING)
            .into()
    }

    fn about_view(&self) -> Element<'_, Message> {
        column![
            text(env!("CARGO_PKG_NAME")).size(ui::HEADING_SIZE + 8),
            text(format!("Version {}", env!("CARGO_PKG_VERSION"))),
            text(env!("CARGO_PKG_DESCRIPTION")),
            text(format!("Settings file: {}", self.store.path().display())),
            text(format!(
                "Quarantine directory: {}",
                self.quarantine_settings.quarantine_path.display()
            )),
            text(format!("License: {}", env!("CARGO_PKG_LICENSE"))),
            button("Back").on_press(Message::ShowMain),
        ]
        .spacing(ui::SPACING)
        .padding(ui::PADDING)
        .into()
    }

    pub fn view(&self) -> Element<'_, Message> {
        match &self.page {
            Page::Main => self.main_view(),
            Page::Settings(editor) => editor.view().map(Message::Settings),
            Page::Quarantine(view) => view.view().map(Message::Quarantine),
            Page::About => self.about_view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner::{Detection, Event, Outcome};
    use std::fs;
    use tempfile::TempDir;

    fn app(dir: &TempDir, auto_quarantine: bool, show_threats_found: bool) -> ClamFront {
        let mut store = config::SettingsStore::load_path(dir.path().join("settings.json"));
        let quarantine = dir.path().join("quarantine");
        store
            .set("quarantine", "quarantine_path", quarantine.to_string_lossy().into_owned())
            .unwrap();
        store.set("quarantine", "auto_quarantine", auto_quarantine).unwrap();
        store
            .set("notifications", "show_threats_found", show_threats_found)
            .unwrap();

        let (app, _) = ClamFront::new(Flags {
            store,
            startup_error: None,
        });
        app
    }

    fn infected(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join("files").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR").unwrap();
        path
    }

    fn start(app: &mut ClamFront, id: scanner::ScanId) {
        app.scan = Some(RunningScan {
            id,
            label: "Quick Scan".into(),
            detections: Vec::new(),
        });
    }

    // feed the events a scan of `files` would produce
    fn report(app: &mut ClamFront, id: scanner::ScanId, files: &[PathBuf]) {
        for path in files {
            let line = format!("{}: Eicar-Signature FOUND", path.display());
            let _ = app.handle_worker(Event::ScanLine(id, line));
            let _ = app.handle_worker(Event::Detected(
                id,
                Detection {
                    path: path.clone(),
                    threat: "Eicar-Signature".into(),
                },
            ));
        }
        let _ = app.handle_worker(Event::ScanFinished(
            id,
            Outcome {
                success: false,
                output: String::new(),
                error: String::new(),
                code: Some(1),
            },
        ));
    }

    fn has_line(app: &ClamFront, prefix: &str) -> bool {
        app.output.iter().any(|l| l.starts_with(prefix))
    }

    #[test]
    fn detections_are_quarantined_when_scan_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, true, true);
        let a = infected(&dir, "a.com");
        let b = infected(&dir, "b.com");

        start(&mut app, 7);
        report(&mut app, 7, &[a.clone(), b.clone()]);

        assert!(app.scan.is_none());
        assert_eq!(app.status, "Threats Found");
        assert!(!a.exists() && !b.exists());
        let manager = app.quarantine.as_ref().unwrap();
        assert_eq!(manager.list().unwrap().len(), 2);
        assert!(has_line(&app, "2 threat(s) found:"));
        assert!(has_line(&app, &format!("Quarantined: {}", a.display())));
        assert!(has_line(&app, "Scan finished at: "));
        assert!(app.last_scan.is_some());
    }

    #[test]
    fn detections_stay_put_without_auto_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false, false);
        let a = infected(&dir, "a.com");

        start(&mut app, 3);
        report(&mut app, 3, &[a.clone()]);

        assert!(a.exists());
        assert!(app.quarantine.as_ref().unwrap().list().unwrap().is_empty());
        assert!(!has_line(&app, "Quarantined: "));
        assert!(!has_line(&app, "1 threat(s) found:"));
        assert!(has_line(&app, "Scan completed: threats found!"));
    }

    #[test]
    fn late_events_from_another_scan_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, true, true);
        let a = infected(&dir, "a.com");

        start(&mut app, 9);
        let before = app.output.len();
        report(&mut app, 8, &[a.clone()]);

        assert!(a.exists());
        assert_eq!(app.output.len(), before);
        assert_eq!(app.scan.as_ref().map(|s| s.id), Some(9));
        assert!(app.scan.as_ref().unwrap().detections.is_empty());

        // after stop nothing is running, so the stopped scan's result is dropped too
        let _ = app.update(Message::StopScan);
        assert!(has_line(&app, "Scan stopped by user"));
        let before = app.output.len();
        report(&mut app, 9, &[a.clone()]);
        assert!(a.exists());
        assert_eq!(app.output.len(), before);
        assert_eq!(app.status, "Scan Stopped");
    }
}
