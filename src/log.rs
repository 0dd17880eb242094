use env_logger::Builder;
use serde::Deserialize;

use crate::error;

// logging is configured from the `advanced` category of the settings
// document. `log_file` is not in the defaults; it is only honored
// when a user adds it by hand.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    #[serde(rename = "log_file")]
    file: Option<String>,
    #[serde(rename = "log_level")]
    level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".into(),
        }
    }
}

impl LogSettings {
    pub fn init_logger(&self) -> Result<(), error::Error> {
        let mut builder = self.build_logger()?;
        builder
            .try_init()
            .map_err(|e| error::Error::CustomError(e.to_string()))
    }

    // the settings dialog offers python-style level names
    fn filter(&self) -> String {
        match self.level.to_lowercase().as_str() {
            "warning" => "warn".into(),
            "critical" => "error".into(),
            l => l.into(),
        }
    }

    fn build_logger(&self) -> Result<Builder, error::Error> {
        use env_logger::fmt::Target;

        let mut builder = Builder::new();
        builder
            .parse_filters(&self.filter())
            .format_timestamp_micros();

        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }

        match self.file.as_deref() {
            None | Some("stdout") => {
                builder.target(Target::Stdout);
            }
            Some("stderr") => {
                builder.target(Target::Stderr);
            }
            Some(filename) => {
                let f = std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(filename)
                    .map_err(error::Error::io(filename))?;
                builder.target(Target::Pipe(Box::new(f)));
            }
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::LogSettings;
    use crate::error;
    use ::log;
    use env_logger::Builder;
    use log::Log;
    use tempfile;

    fn file_logger<F: AsRef<std::path::Path>>(f: F) -> Result<Builder, error::Error> {
        LogSettings {
            file: Some(f.as_ref().to_string_lossy().to_string()),
            level: "trace".into(),
        }
        .build_logger()
    }

    #[test]
    fn test_log_appends() {
        let dir = tempfile::tempdir().unwrap();

        let filename = dir.path().join("a");

        let record = log::RecordBuilder::new().level(log::Level::Error).build();

        for i in 1..3 {
            let logger = file_logger(&filename).unwrap().build();
            logger.log(&record);

            std::mem::drop(logger);

            let linecount = std::fs::read_to_string(&filename).unwrap().lines().count();

            assert_eq!(linecount, i);
        }
    }

    #[test]
    fn warning_maps_to_warn() {
        let settings: LogSettings =
            serde_json::from_str(r#"{"log_level": "warning", "scan_threads": 4}"#).unwrap();
        assert_eq!(settings.filter(), "warn");
        assert_eq!(settings.file, None);
    }

    #[test]
    fn unwritable_log_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no").join("such").join("dir.log");
        assert!(matches!(
            file_logger(missing),
            Err(error::Error::IoError(Some(_), _))
        ));
    }
}
