// typed views over the categories of the settings document. each
// view is deserialized on demand from `config::SettingsStore::section`
// and falls back to defaults for anything missing.

use crate::config;
use serde;
use std::path::PathBuf;

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanOptions {
    pub scan_archives: bool,
    pub scan_pdf: bool,
    pub scan_ole2: bool,
    pub scan_html: bool,
    pub scan_pe: bool,
    pub scan_elf: bool,
    pub detect_pua: bool,
    pub scan_hidden: bool,
    // megabytes
    pub max_file_size: u64,
    pub max_recursion: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_archives: true,
            scan_pdf: true,
            scan_ole2: true,
            scan_html: true,
            scan_pe: true,
            scan_elf: true,
            detect_pua: false,
            scan_hidden: false,
            max_file_size: 20,
            max_recursion: 15,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct QuarantineSettings {
    pub auto_quarantine: bool,
    pub quarantine_path: PathBuf,
    pub retention_days: u64,
}

impl Default for QuarantineSettings {
    fn default() -> Self {
        Self {
            auto_quarantine: true,
            quarantine_path: config::default_quarantine_path(),
            retention_days: 30,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DarkMode {
    #[default]
    Auto,
    Light,
    Dark,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InterfaceSettings {
    pub start_minimized: bool,
    pub close_to_tray: bool,
    pub dark_mode: DarkMode,
    pub language: String,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            start_minimized: false,
            close_to_tray: true,
            dark_mode: DarkMode::Auto,
            language: "auto".into(),
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub show_scan_complete: bool,
    pub show_threats_found: bool,
    pub show_update_complete: bool,
    pub system_tray: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            show_scan_complete: true,
            show_threats_found: true,
            show_update_complete: false,
            system_tray: true,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Exclusions {
    pub paths: Vec<String>,
    pub extensions: Vec<String>,
    pub processes: Vec<String>,
}

impl Default for Exclusions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            extensions: vec![".tmp".into(), ".log".into()],
            processes: Vec::new(),
        }
    }
}

// extensions are matched as a suffix, so `tmp` is stored as `.tmp`
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}
