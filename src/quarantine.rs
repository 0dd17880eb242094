//! Quarantine storage for suspect files.
//!
//! A quarantined file is moved into the quarantine directory under the
//! name `<timestamp>_<file name>_<threat>` and gets a JSON sidecar next
//! to it with the same name plus [`SIDECAR_SUFFIX`]. A name that is
//! already taken gets a `_<n>` counter appended:
//!
//! ```text
//! quarantine/
//! ├── 20250101_120000_invoice.pdf_Pdf.Exploit.CVE_2010_0188-1
//! ├── 20250101_120000_invoice.pdf_Pdf.Exploit.CVE_2010_0188-1.info
//! ├── 20250101_120000_invoice.pdf_Pdf.Exploit.CVE_2010_0188-1_1
//! └── 20250101_120000_invoice.pdf_Pdf.Exploit.CVE_2010_0188-1_1.info
//! ```

use crate::error::Error;
use crate::settings::QuarantineSettings;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SIDECAR_SUFFIX: &str = ".info";

/// Format of the timestamp prefix and of `quarantine_date`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Metadata written to the sidecar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub original_path: PathBuf,
    pub threat_name: String,
    pub quarantine_date: String,
    pub file_size: u64,
}

impl QuarantineRecord {
    /// The recorded quarantine time, if the date string is well formed.
    pub fn quarantined_at(&self) -> Option<chrono::DateTime<Local>> {
        let naive = NaiveDateTime::parse_from_str(&self.quarantine_date, TIMESTAMP_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()
    }
}

/// A record together with the quarantined file it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantineEntry {
    pub record: QuarantineRecord,
    pub quarantine_file: PathBuf,
}

impl QuarantineEntry {
    pub fn sidecar(&self) -> PathBuf {
        sidecar_path(&self.quarantine_file)
    }

    pub fn file_name(&self) -> String {
        self.quarantine_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn sidecar_path(quarantine_file: &Path) -> PathBuf {
    let mut name = quarantine_file.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

// threat names come from scanner output; keep them from adding path
// components to the quarantine name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

// rename, falling back to copy + remove when the rename cannot be done
// in place (for example across filesystems)
fn move_file(from: &Path, to: &Path) -> Result<(), Error> {
    if let Err(rename_err) = fs::rename(from, to) {
        ::log::debug!(
            "rename {} -> {} failed ({}), copying instead",
            from.display(),
            to.display(),
            rename_err
        );
        fs::copy(from, to).map_err(|_| Error::IoError(Some(from.to_path_buf()), rename_err))?;
        fs::remove_file(from).map_err(Error::io(from))?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct QuarantineManager {
    dir: PathBuf,
}

impl QuarantineManager {
    /// Opens the quarantine directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
        Ok(Self { dir })
    }

    pub fn from_settings(settings: &QuarantineSettings) -> Result<Self, Error> {
        Self::new(&settings.quarantine_path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // first free `<timestamp>_<file>_<threat>` name, adding a counter
    // when a file or sidecar from the same second is already there
    fn free_name(&self, base: &str) -> PathBuf {
        let mut candidate = self.dir.join(base);
        let mut n = 1;
        while candidate.exists() || sidecar_path(&candidate).exists() {
            candidate = self.dir.join(format!("{}_{}", base, n));
            n += 1;
        }
        candidate
    }

    /// Moves `source` into quarantine and records why.
    pub fn quarantine<P: AsRef<Path>>(
        &self,
        source: P,
        threat_name: &str,
    ) -> Result<QuarantineEntry, Error> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(Error::MissingFile(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| Error::MissingFile(source.to_path_buf()))?
            .to_string_lossy();

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

        // keep the absolute path so restore works from any working dir
        let original_path = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let file_size = fs::metadata(source).map_err(Error::io(source))?.len();

        let record = QuarantineRecord {
            original_path,
            threat_name: threat_name.to_string(),
            quarantine_date: timestamp,
            file_size,
        };

        // the file only moves once its record is known to be writable
        let txt = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::ParseError(format!("{}: {}", source.display(), e)))?;

        let quarantine_file = self.free_name(&format!(
            "{}_{}_{}",
            record.quarantine_date,
            file_name,
            sanitize(threat_name)
        ));
        move_file(source, &quarantine_file)?;

        let sidecar = sidecar_path(&quarantine_file);
        if let Err(e) = fs::write(&sidecar, txt) {
            let _ = fs::remove_file(&sidecar);
            if let Err(back) = move_file(&quarantine_file, source) {
                ::log::error!(
                    "Could not return {} to {}: {}",
                    quarantine_file.display(),
                    source.display(),
                    back
                );
            }
            return Err(Error::IoError(Some(sidecar), e));
        }

        ::log::info!(
            "Quarantined {} ({}) as {}",
            record.original_path.display(),
            record.threat_name,
            quarantine_file.display()
        );

        Ok(QuarantineEntry {
            record,
            quarantine_file,
        })
    }

    fn sidecars(&self) -> Result<Vec<PathBuf>, Error> {
        let entries = fs::read_dir(&self.dir).map_err(Error::io(&self.dir))?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(SIDECAR_SUFFIX))
                        .unwrap_or(false)
            })
            .collect())
    }

    fn read_entry(sidecar: &Path) -> Result<QuarantineEntry, Error> {
        let txt = fs::read_to_string(sidecar).map_err(Error::io(sidecar))?;
        let record: QuarantineRecord =
            serde_json::from_str(&txt).map_err(|e| Error::ParseError(e.to_string()))?;

        let name = sidecar.as_os_str().to_string_lossy();
        let quarantine_file = PathBuf::from(&name[..name.len() - SIDECAR_SUFFIX.len()]);

        Ok(QuarantineEntry {
            record,
            quarantine_file,
        })
    }

    /// Lists quarantined entries whose file is still present, newest first.
    pub fn list(&self) -> Result<Vec<QuarantineEntry>, Error> {
        let mut entries: Vec<_> = self
            .sidecars()?
            .iter()
            .filter_map(|sidecar| match Self::read_entry(sidecar) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    ::log::warn!("Error reading quarantine info: {}", e);
                    None
                }
            })
            .filter(|entry| entry.quarantine_file.exists())
            .collect();

        entries.sort_by(|a, b| b.record.quarantine_date.cmp(&a.record.quarantine_date));
        Ok(entries)
    }

    /// Moves a quarantined file back to where it came from.
    pub fn restore(&self, entry: &QuarantineEntry) -> Result<(), Error> {
        let original = &entry.record.original_path;
        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }

        move_file(&entry.quarantine_file, original)?;

        let sidecar = entry.sidecar();
        if sidecar.exists() {
            fs::remove_file(&sidecar).map_err(Error::io(&sidecar))?;
        }

        ::log::info!("Restored {}", original.display());
        Ok(())
    }

    /// Permanently removes a quarantined file and its sidecar.
    pub fn delete(&self, entry: &QuarantineEntry) -> Result<(), Error> {
        self.delete_file(&entry.quarantine_file)
    }

    fn delete_file(&self, quarantine_file: &Path) -> Result<(), Error> {
        let sidecar = sidecar_path(quarantine_file);
        for path in [quarantine_file, sidecar.as_path()] {
            if path.exists() {
                fs::remove_file(path).map_err(Error::io(path))?;
            }
        }
        ::log::info!("Deleted {}", quarantine_file.display());
        Ok(())
    }

    /// Deletes entries quarantined at or before `retention_days` ago and
    /// returns how many were removed.
    pub fn sweep(&self, retention_days: u64) -> Result<usize, Error> {
        let cutoff = chrono::TimeDelta::try_days(retention_days as i64)
            .filter(|_| retention_days <= i64::MAX as u64)
            .and_then(|d| Local::now().checked_sub_signed(d));

        // a window too large to represent keeps everything
        let cutoff = match cutoff {
            Some(c) => c,
            None => return Ok(0),
        };

        let mut removed = 0;
        for sidecar in self.sidecars()? {
            let entry = match Self::read_entry(&sidecar) {
                Ok(e) => e,
                Err(e) => {
                    ::log::warn!("Error during cleanup: {}", e);
                    continue;
                }
            };

            let quarantined_at = match entry.record.quarantined_at() {
                Some(t) => Some(t),
                None => fs::metadata(&sidecar)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(|t: SystemTime| chrono::DateTime::<Local>::from(t)),
            };

            match quarantined_at {
                Some(t) if t <= cutoff => match self.delete_file(&entry.quarantine_file) {
                    Ok(()) => removed += 1,
                    Err(e) => ::log::warn!("Error during cleanup: {}", e),
                },
                Some(_) => (),
                None => ::log::warn!("Cannot determine age of {}", sidecar.display()),
            }
        }

        if removed > 0 {
            ::log::info!("Removed {} expired quarantine entries", removed);
        }
        Ok(removed)
    }
}
