// contains logic for loading and saving the clamfront settings file.
//
// the settings file is a json document with one object per category.
// whatever is loaded from disk is merged over a fixed set of defaults,
// so new settings show up for users with an old file.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::{fs, path};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const APP_DIR_NAME: &str = "clamfront";

pub const CATEGORIES: [&str; 8] = [
    "scan_options",
    "real_time",
    "updates",
    "notifications",
    "quarantine",
    "interface",
    "exclusions",
    "advanced",
];

pub fn default_quarantine_path() -> path::PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| path::PathBuf::from("."))
        .join("quarantine")
}

pub fn defaults() -> Map<String, Value> {
    let settings = json!({
        "scan_options": {
            "scan_archives": true,
            "scan_pdf": true,
            "scan_ole2": true,
            "scan_html": true,
            "scan_pe": true,
            "scan_elf": true,
            "detect_pua": false,
            "scan_hidden": false,
            "max_file_size": 20,
            "max_recursion": 15
        },
        "real_time": {
            "enabled": false,
            "watch_downloads": true,
            "watch_home": false,
            "watch_removable": true,
            "prevention_mode": false
        },
        "updates": {
            "auto_update": true,
            "update_frequency": "daily",
            "check_on_startup": true
        },
        "notifications": {
            "show_scan_complete": true,
            "show_threats_found": true,
            "show_update_complete": false,
            "system_tray": true
        },
        "quarantine": {
            "auto_quarantine": true,
            "quarantine_path": default_quarantine_path().to_string_lossy(),
            "retention_days": 30
        },
        "interface": {
            "start_minimized": false,
            "close_to_tray": true,
            "dark_mode": "auto",
            "language": "auto"
        },
        "exclusions": {
            "paths": [],
            "extensions": [".tmp", ".log"],
            "processes": []
        },
        "advanced": {
            "scan_threads": 4,
            "memory_limit": 512,
            "database_mirror": "auto",
            "log_level": "info"
        }
    });

    match settings {
        Value::Object(m) => m,
        _ => unreachable!("default settings are an object"),
    }
}

/// Recursively merge `loaded` over `default`. Objects present on both
/// sides are merged key by key, anything else from `loaded` wins.
pub fn merge(default: &Value, loaded: Value) -> Value {
    match (default, loaded) {
        (Value::Object(d), Value::Object(l)) => Value::Object(merge_maps(d, l)),
        (_, loaded) => loaded,
    }
}

fn merge_maps(default: &Map<String, Value>, loaded: Map<String, Value>) -> Map<String, Value> {
    let mut result = default.clone();
    for (key, value) in loaded {
        let merged = match result.get(&key) {
            Some(d) => merge(d, value),
            None => value,
        };
        result.insert(key, merged);
    }
    result
}

pub fn settings_path() -> Result<path::PathBuf, Error> {
    let config_dir = dirs::config_dir().ok_or(Error::CustomError(
        "Cannot Determine Config Dir".to_string(),
    ))?;
    Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

// the settings document plus the file it is persisted to. every
// change is written straight back to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsStore {
    path: path::PathBuf,
    settings: Map<String, Value>,
}

impl SettingsStore {
    pub fn load() -> Self {
        match settings_path() {
            Ok(path) => Self::load_path(path),
            Err(e) => {
                ::log::error!("{}", e);
                Self {
                    path: path::PathBuf::from(SETTINGS_FILE_NAME),
                    settings: defaults(),
                }
            }
        }
    }

    // never fails: a file that cannot be read or parsed is logged and
    // replaced by the defaults
    pub fn load_path<P: AsRef<path::Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        let settings = if path.exists() {
            match read_settings(&path) {
                Ok(loaded) => merge_maps(&defaults(), loaded),
                Err(e) => {
                    ::log::error!("Error loading settings: {}", e);
                    defaults()
                }
            }
        } else {
            ::log::debug!("{} not found, using defaults", path.display());
            defaults()
        };

        Self { path, settings }
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn category(&self, category: &str) -> Option<&Map<String, Value>> {
        self.settings.get(category).and_then(Value::as_object)
    }

    pub fn get(&self, category: &str, key: &str) -> Option<&Value> {
        self.category(category).and_then(|c| c.get(key))
    }

    // deserialize a category into one of the typed views in
    // `settings`. a leaf that does not fit its field is dropped, so
    // only that field falls back to its default.
    pub fn section<T: DeserializeOwned + Default>(&self, category: &str) -> T {
        let values = match self.category(category) {
            Some(v) => v,
            None => return T::default(),
        };

        let valid: Map<String, Value> = values
            .iter()
            .filter(|(key, value)| {
                let mut single = Map::new();
                single.insert(key.to_string(), (*value).clone());
                match T::deserialize(Value::Object(single)) {
                    Ok(_) => true,
                    Err(e) => {
                        ::log::warn!("Invalid setting {}.{}: {}", category, key, e);
                        false
                    }
                }
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        T::deserialize(Value::Object(valid)).unwrap_or_else(|e| {
            ::log::warn!("Invalid settings in [{}]: {}", category, e);
            T::default()
        })
    }

    pub fn set<V: Into<Value>>(&mut self, category: &str, key: &str, value: V) -> Result<(), Error> {
        let entry = self
            .settings
            .entry(category.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(c) = entry {
            c.insert(key.to_string(), value.into());
        }
        self.save()
    }

    pub fn replace(&mut self, settings: Map<String, Value>) -> Result<(), Error> {
        self.settings = settings;
        self.save()
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.replace(defaults())
    }

    pub fn save(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(Error::io(parent))?;
            }
        }
        let txt = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| Error::ParseError(e.to_string()))?;
        fs::write(&self.path, txt).map_err(Error::io(&self.path))?;
        ::log::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

fn read_settings(path: &path::Path) -> Result<Map<String, Value>, Error> {
    let txt = fs::read_to_string(path).map_err(Error::io(path))?;
    load_txt(&txt)
}

fn load_txt(txt: &str) -> Result<Map<String, Value>, Error> {
    let value: Value = serde_json::from_str(txt).map_err(|e| Error::ParseError(e.to_string()))?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(Error::ParseError("settings file is not an object".to_string())),
    }
}
