// command line handling for clamfront.
//
// the only thing the command line controls is which settings file is
// used; everything else lives in the settings dialog.
use crate::config;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "[OPTIONS] [SETTINGS FILE]";

fn exe_name() -> &'static str {
    option_env!("CARGO_BIN_NAME").unwrap_or("clamfront")
}

fn print_help() {
    println!(
        r#"{description}

Usage: {exe} {USAGE}

Options:
  -s, --settings <FILE>  Read and write settings in FILE
      --settings-path    Print the settings file that would be used and exit
  -V, --version          Print version info and exit
  -h, --help             Print this help and exit

Without a settings file, clamfront uses {default}.
A settings file that does not exist yet is created on the first change."#,
        description = env!("CARGO_PKG_DESCRIPTION"),
        exe = exe_name(),
        default = default_settings_display(),
    );
}

fn default_settings_display() -> String {
    config::settings_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| format!("<config dir>/{}/{}", config::APP_DIR_NAME, config::SETTINGS_FILE_NAME))
}

fn print_version() {
    println!(
        "{} {} (built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CLAMFRONT_BUILD_DATE")
    );
}

fn usage_error(msg: &str) -> ExitCode {
    eprintln!("{}: {}", exe_name(), msg);
    eprintln!("Usage: {} {}", exe_name(), USAGE);
    eprintln!("Try '{} --help' for more information", exe_name());
    ExitCode::FAILURE
}

#[derive(Default, Debug, PartialEq)]
pub struct ParsedArgs {
    pub settings: Option<PathBuf>,
}

impl ParsedArgs {
    // the file that will actually be loaded
    fn settings_file(&self) -> Option<PathBuf> {
        self.settings
            .clone()
            .or_else(|| config::settings_path().ok())
    }

    fn set_settings(&mut self, arg: String) -> Result<(), ExitCode> {
        if self.settings.is_some() {
            return Err(usage_error("only one settings file can be given"));
        }
        let path = PathBuf::from(arg);
        if path.as_os_str().is_empty() {
            return Err(usage_error("settings file name is empty"));
        }
        if path.is_dir() {
            return Err(usage_error(&format!(
                "{} is a directory, expected a settings file",
                path.display()
            )));
        }
        self.settings = Some(path);
        Ok(())
    }
}

/// Parses the process arguments (including the program name). `Err`
/// carries the exit code when the program should stop right away.
pub fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<ParsedArgs, ExitCode> {
    let mut parsed = ParsedArgs::default();
    let mut print_path = false;
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Err(ExitCode::SUCCESS);
            }
            "-V" | "-v" | "--version" => {
                print_version();
                return Err(ExitCode::SUCCESS);
            }
            "--settings-path" => print_path = true,
            "-s" | "--settings" => match args.next() {
                Some(file) => parsed.set_settings(file)?,
                None => return Err(usage_error(&format!("{} needs a file name", arg))),
            },
            "--" => {
                for file in args.by_ref() {
                    parsed.set_settings(file)?;
                }
            }
            opt if opt.starts_with("--settings=") => {
                parsed.set_settings(opt["--settings=".len()..].to_string())?
            }
            opt if opt.starts_with('-') && opt.len() > 1 => {
                return Err(usage_error(&format!("unknown option '{}'", opt)))
            }
            _ => parsed.set_settings(arg.clone())?,
        }
    }

    if print_path {
        match parsed.settings_file() {
            Some(p) => println!("{}", p.display()),
            None => return Err(usage_error("cannot determine the settings file location")),
        }
        return Err(ExitCode::SUCCESS);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParsedArgs, ExitCode> {
        parse_args(
            std::iter::once("clamfront")
                .chain(args.iter().copied())
                .map(String::from),
        )
    }

    fn settings_of(args: &[&str]) -> Option<PathBuf> {
        parse(args).unwrap().settings
    }

    #[test]
    fn no_args_uses_default_settings() {
        assert_eq!(parse(&[]).unwrap(), ParsedArgs::default());
    }

    #[test]
    fn settings_file_forms() {
        let expected = Some(PathBuf::from("/tmp/settings.json"));
        assert_eq!(settings_of(&["/tmp/settings.json"]), expected);
        assert_eq!(settings_of(&["-s", "/tmp/settings.json"]), expected);
        assert_eq!(settings_of(&["--settings=/tmp/settings.json"]), expected);
        assert_eq!(
            settings_of(&["--", "-odd.json"]),
            Some(PathBuf::from("-odd.json"))
        );
    }

    #[test]
    fn directory_is_not_a_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let arg = dir.path().to_string_lossy().into_owned();
        assert_eq!(parse(&[&arg]).unwrap_err(), ExitCode::FAILURE);
    }

    #[test]
    fn bad_args_fail() {
        assert_eq!(parse(&["--bogus"]).unwrap_err(), ExitCode::FAILURE);
        assert_eq!(parse(&["a.json", "b.json"]).unwrap_err(), ExitCode::FAILURE);
        assert_eq!(parse(&["--settings"]).unwrap_err(), ExitCode::FAILURE);
        assert_eq!(parse(&["--settings="]).unwrap_err(), ExitCode::FAILURE);
        assert_eq!(parse(&["--help"]).unwrap_err(), ExitCode::SUCCESS);
        assert_eq!(
            parse(&["--settings-path", "a.json"]).unwrap_err(),
            ExitCode::SUCCESS
        );
    }
}
