// clamfront error types

use super::platform;
use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    IoError(Option<PathBuf>, io::Error),
    ParseError(String),
    ProcessError(String),
    MissingFile(PathBuf),
    PlatformError(platform::Error),
    CustomError(String),
}

impl Error {
    pub(crate) fn io<P: Into<PathBuf>>(path: P) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |e| Error::IoError(Some(path), e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: ")?;
        match self {
            Error::IoError(Some(path), e) => write!(f, "{}: {}", path.display(), e),
            Error::IoError(None, e) => e.fmt(f),
            Error::ParseError(e) => {
                write!(f, "JSON Error: ")?;
                e.fmt(f)
            }
            Error::ProcessError(e) => {
                write!(f, "Process Error: ")?;
                e.fmt(f)
            }
            Error::MissingFile(path) => write!(f, "No such file: {}", path.display()),
            Error::PlatformError(e) => e.fmt(f),
            Error::CustomError(s) => f.write_str(s),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn io_error_names_path() {
        let err = Error::io("/tmp/settings.json")(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ));
        let msg = err.to_string();
        assert!(msg.starts_with("Error: "));
        assert!(msg.contains("/tmp/settings.json"), "{}", msg);
    }
}
