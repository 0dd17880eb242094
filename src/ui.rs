// shared bits of the clamfront window: theme selection and the text
// used to label settings.

use crate::settings::DarkMode;
use dark_light;
use iced;
use lazy_static::lazy_static;

pub const TEXT_SIZE: u16 = 14;
pub const HEADING_SIZE: u16 = 20;
pub const SPACING: u16 = 8;
pub const PADDING: u16 = 12;

pub fn theme(mode: DarkMode) -> iced::Theme {
    // store detected theme in lazy static to avoid probing the desktop more than once
    lazy_static! {
        static ref DEFAULT_THEME: iced::Theme = if dark_light::detect() == dark_light::Mode::Dark {
            iced::Theme::Dark
        } else {
            iced::Theme::Light
        };
    }

    match mode {
        DarkMode::Auto => DEFAULT_THEME.clone(),
        DarkMode::Dark => iced::Theme::Dark,
        DarkMode::Light => iced::Theme::Light,
    }
}

pub fn category_title(category: &str) -> String {
    match category {
        "scan_options" => "Scan Options".into(),
        "real_time" => "Real-time".into(),
        "updates" => "Updates".into(),
        "notifications" => "Notifications".into(),
        "quarantine" => "Quarantine".into(),
        "interface" => "Interface".into(),
        "exclusions" => "Exclusions".into(),
        "advanced" => "Advanced".into(),
        other => humanize(other),
    }
}

// label for a settings key: `watch_home` -> `Watch home`
pub fn setting_label(key: &str) -> String {
    match key {
        "scan_pdf" => "Scan PDF files".into(),
        "scan_ole2" => "Scan OLE2 documents".into(),
        "scan_html" => "Scan HTML files".into(),
        "scan_pe" => "Scan PE executables".into(),
        "scan_elf" => "Scan ELF executables".into(),
        "detect_pua" => "Detect potentially unwanted applications".into(),
        "scan_hidden" => "Scan hidden files and directories".into(),
        "max_file_size" => "Max file size (MB)".into(),
        "memory_limit" => "Memory limit (MB)".into(),
        "retention_days" => "Retention period (days)".into(),
        other => humanize(other),
    }
}

pub fn humanize(key: &str) -> String {
    let mut words = key.split('_').filter(|w| !w.is_empty());
    let mut out = String::new();
    if let Some(first) = words.next() {
        let mut chars = first.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    for w in words {
        out.push(' ');
        out.push_str(w);
    }
    out
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(humanize("watch_downloads"), "Watch downloads");
        assert_eq!(humanize("enabled"), "Enabled");
        assert_eq!(humanize(""), "");
        assert_eq!(setting_label("max_file_size"), "Max file size (MB)");
        assert_eq!(setting_label("retention_days"), "Retention period (days)");
        assert_eq!(setting_label("watch_home"), "Watch home");
        assert_eq!(category_title("real_time"), "Real-time");
        assert_eq!(category_title("custom_thing"), "Custom thing");
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn explicit_modes_ignore_desktop() {
        assert!(matches!(theme(DarkMode::Dark), iced::Theme::Dark));
        assert!(matches!(theme(DarkMode::Light), iced::Theme::Light));
    }
}
