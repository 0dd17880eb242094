use opener;
use std::error;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Error {
    OpenerError(opener::OpenError),
    NoHomeDir,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Error::OpenerError(err) => {
                if let opener::OpenError::ExitStatus { stderr: e, .. } = err {
                    f.write_str(e)
                } else {
                    err.fmt(f)
                }
            }
            Error::NoHomeDir => f.write_str("Cannot Determine Home Dir"),
        }
    }
}

impl error::Error for Error {}

#[cfg(unix)]
mod os {
    pub const FULL_SCAN_ROOT: &str = "/";
    pub const INSTALL_HINT: &str = "sudo apt install clamav clamav-daemon";
}

#[cfg(windows)]
mod os {
    pub const FULL_SCAN_ROOT: &str = "C:\\";
    pub const INSTALL_HINT: &str = "download the installer from https://www.clamav.net/downloads";
}

pub use os::INSTALL_HINT;

// target of a quick scan
pub fn home_dir() -> Result<PathBuf, Error> {
    dirs::home_dir().ok_or(Error::NoHomeDir)
}

// target of a full system scan
pub fn full_scan_root() -> PathBuf {
    PathBuf::from(os::FULL_SCAN_ROOT)
}

pub fn open_path<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    opener::open(path.as_ref().as_os_str()).map_err(Error::OpenerError)
}
