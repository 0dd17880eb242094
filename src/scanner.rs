// wrapper around the clamav command line tools.
//
// scans and database updates each run on their own background thread.
// results are reported through a caller supplied sink, which the ui
// uses to forward them onto its own thread.

use crate::error::Error;
use crate::settings::{normalize_extension, Exclusions, ScanOptions};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const SCANNER: &str = "clamscan";
pub const UPDATER: [&str; 2] = ["sudo", "freshclam"];

pub type ScanId = u64;

static NEXT_SCAN_ID: AtomicU64 = AtomicU64::new(1);

// result of a finished scanner or updater run
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub code: Option<i32>,
}

impl Outcome {
    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.to_string(),
            code: None,
        }
    }

    // clamscan exits with 1 when it found something
    pub fn threats_found(&self) -> bool {
        self.code == Some(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ScanLine(ScanId, String),
    Detected(ScanId, Detection),
    ScanFinished(ScanId, Outcome),
    UpdateFinished(Outcome),
}

// a `<path>: <threat> FOUND` line from the scanner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Detection {
    pub path: PathBuf,
    pub threat: String,
}

// file names are not necessarily utf-8, so detections are parsed from
// the raw line to keep the path usable for quarantine
pub fn parse_detection(line: &[u8]) -> Option<Detection> {
    let rest = line.trim_ascii_end().strip_suffix(b" FOUND")?;
    let split = rest.windows(2).rposition(|w| w == b": ")?;
    let path = &rest[..split];
    let threat = rest[split + 2..].trim_ascii();
    if path.is_empty() || threat.is_empty() {
        return None;
    }
    Some(Detection {
        path: path_from_bytes(path),
        threat: String::from_utf8_lossy(threat).into_owned(),
    })
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

pub fn build_scan_command(
    options: &ScanOptions,
    exclusions: &Exclusions,
    path: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        format!("--scan-archive={}", yes_no(options.scan_archives)).into(),
        format!("--scan-pdf={}", yes_no(options.scan_pdf)).into(),
        format!("--scan-ole2={}", yes_no(options.scan_ole2)).into(),
        format!("--scan-html={}", yes_no(options.scan_html)).into(),
        format!("--scan-pe={}", yes_no(options.scan_pe)).into(),
        format!("--scan-elf={}", yes_no(options.scan_elf)).into(),
        format!("--detect-pua={}", yes_no(options.detect_pua)).into(),
    ];

    if !options.scan_hidden {
        args.push(r"--exclude-dir=^\.".into());
    }

    args.push(format!("--max-filesize={}M", options.max_file_size).into());
    args.push(format!("--max-dir-recursion={}", options.max_recursion).into());

    for dir in exclusions.paths.iter().filter(|p| !p.is_empty()) {
        args.push(format!("--exclude-dir=^{}", regex::escape(dir)).into());
    }
    for ext in exclusions.extensions.iter().map(|e| normalize_extension(e)) {
        if !ext.is_empty() {
            args.push(format!("--exclude={}$", regex::escape(&ext)).into());
        }
    }

    args.extend(["--recursive", "--infected", "--bell"].map(OsString::from));
    args.push(path.as_os_str().to_owned());
    args
}

// state shared between the ui and one scan worker
#[derive(Debug, Default)]
struct ScanHandle {
    running: AtomicBool,
    child: Mutex<Option<Child>>,
}

#[derive(Debug)]
pub struct ClamAv {
    // program and leading arguments for each tool
    scanner: Vec<String>,
    updater: Vec<String>,
    options: ScanOptions,
    exclusions: Exclusions,
    current: Option<(ScanId, Arc<ScanHandle>)>,
}

impl Default for ClamAv {
    fn default() -> Self {
        Self::new()
    }
}

impl ClamAv {
    pub fn new() -> Self {
        Self::with_commands(vec![SCANNER.into()], UPDATER.map(String::from).to_vec())
    }

    pub fn with_commands(scanner: Vec<String>, updater: Vec<String>) -> Self {
        Self {
            scanner,
            updater,
            options: ScanOptions::default(),
            exclusions: Exclusions::default(),
            current: None,
        }
    }

    pub fn set_scan_options(&mut self, options: ScanOptions, exclusions: Exclusions) {
        self.options = options;
        self.exclusions = exclusions;
    }

    pub fn scan_options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn is_installed(&self) -> bool {
        let program = match self.scanner.first() {
            Some(p) => p,
            None => return false,
        };
        if let Err(e) = which::which(program) {
            ::log::warn!("{} not found: {}", program, e);
            return false;
        }
        Command::new(program)
            .args(&self.scanner[1..])
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn is_scanning(&self) -> bool {
        self.current
            .as_ref()
            .map(|(_, h)| h.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn current_scan(&self) -> Option<ScanId> {
        self.current
            .as_ref()
            .filter(|(_, h)| h.running.load(Ordering::SeqCst))
            .map(|(id, _)| *id)
    }

    fn command(parts: &[String]) -> Result<Command, Error> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| Error::ProcessError("empty command".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    /// Starts scanning `path` on a background thread. Returns `None` if a
    /// scan is already running.
    pub fn scan_path<F>(&mut self, path: &Path, sink: F) -> Option<ScanId>
    where
        F: Fn(Event) + Send + 'static,
    {
        if self.is_scanning() {
            return None;
        }

        let id = NEXT_SCAN_ID.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(ScanHandle::default());
        handle.running.store(true, Ordering::SeqCst);
        self.current = Some((id, handle.clone()));

        let args = build_scan_command(&self.options, &self.exclusions, path);
        let cmd = Self::command(&self.scanner).map(|mut c| {
            c.args(args);
            c
        });

        ::log::info!("Starting scan {} of {}", id, path.display());

        std::thread::spawn(move || {
            let on_line = |line, detection: Option<Detection>| {
                sink(Event::ScanLine(id, line));
                if let Some(d) = detection {
                    sink(Event::Detected(id, d));
                }
            };
            let outcome = match cmd.and_then(|cmd| run_scan(cmd, &handle, on_line)) {
                Ok(outcome) => outcome,
                Err(e) => {
                    ::log::error!("Scan {} failed: {}", id, e);
                    Outcome::failed(e)
                }
            };
            handle.running.store(false, Ordering::SeqCst);
            ::log::info!("Scan {} finished with {:?}", id, outcome.code);
            sink(Event::ScanFinished(id, outcome));
        });

        Some(id)
    }

    /// Kills the running scan, if any. The worker still reports a
    /// finished event once the child has been reaped.
    pub fn stop(&mut self) {
        if let Some((id, handle)) = self.current.take() {
            handle.running.store(false, Ordering::SeqCst);
            let mut child = match handle.child.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(child) = child.as_mut() {
                if let Err(e) = child.kill() {
                    ::log::warn!("Could not stop scan {}: {}", id, e);
                } else {
                    ::log::info!("Stopped scan {}", id);
                }
            }
        }
    }

    /// Runs the database updater on a background thread.
    pub fn update_database<F>(&self, sink: F)
    where
        F: FnOnce(Event) + Send + 'static,
    {
        let cmd = Self::command(&self.updater);
        std::thread::spawn(move || {
            let outcome = match cmd.and_then(run_update) {
                Ok(o) => o,
                Err(e) => Outcome::failed(e),
            };
            if outcome.success {
                ::log::info!("Database update succeeded");
            } else {
                ::log::warn!("Database update failed: {}", outcome.error.trim());
            }
            sink(Event::UpdateFinished(outcome));
        });
    }
}

fn spawn_error(e: std::io::Error) -> Error {
    Error::ProcessError(e.to_string())
}

fn run_scan<F: Fn(String, Option<Detection>)>(
    mut cmd: Command,
    handle: &ScanHandle,
    on_line: F,
) -> Result<Outcome, Error> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // stderr is drained on its own thread so a chatty scanner can't
    // block on a full pipe while we read stdout
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stderr {
            if let Err(e) = s.read_to_end(&mut buf) {
                ::log::warn!("Error reading scanner errors: {}", e);
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    {
        let mut slot = match handle.child.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        // stopped before the child was published
        if !handle.running.load(Ordering::SeqCst) {
            let _ = child.kill();
        }
        *slot = Some(child);
    }

    let mut output_lines = Vec::new();
    if let Some(stdout) = stdout {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => (),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    ::log::warn!("Error reading scanner output: {}", e);
                    break;
                }
            }
            let raw = buf.trim_ascii();
            if raw.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(raw).into_owned();
            output_lines.push(line.clone());
            on_line(line, parse_detection(raw));
        }
    }

    let error = stderr_reader.join().unwrap_or_default();

    let child = match handle.child.lock() {
        Ok(mut c) => c.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    let status = match child {
        Some(mut c) => c.wait().map_err(spawn_error)?,
        None => return Err(Error::ProcessError("scanner process went missing".into())),
    };

    Ok(Outcome {
        success: status.success(),
        output: output_lines.join("\n"),
        error,
        code: status.code(),
    })
}

fn run_update(mut cmd: Command) -> Result<Outcome, Error> {
    let output = cmd.stdin(Stdio::null()).output().map_err(spawn_error)?;
    Ok(Outcome {
        success: output.status.success(),
        output: String::from_utf8_lossy(&output.stdout).into_owned(),
        error: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn args_of(options: &ScanOptions, exclusions: &Exclusions) -> Vec<String> {
        build_scan_command(options, exclusions, Path::new("/home/user"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_command() {
        let args = args_of(&ScanOptions::default(), &Exclusions { extensions: vec![], ..Default::default() });
        assert_eq!(
            args,
            vec![
                "--scan-archive=yes",
                "--scan-pdf=yes",
                "--scan-ole2=yes",
                "--scan-html=yes",
                "--scan-pe=yes",
                "--scan-elf=yes",
                "--detect-pua=no",
                r"--exclude-dir=^\.",
                "--max-filesize=20M",
                "--max-dir-recursion=15",
                "--recursive",
                "--infected",
                "--bell",
                "/home/user",
            ]
        );
    }

    #[test]
    fn toggles_and_limits() {
        let options = ScanOptions {
            scan_pdf: false,
            scan_elf: false,
            detect_pua: true,
            scan_hidden: true,
            max_file_size: 100,
            max_recursion: 3,
            ..Default::default()
        };
        let args = args_of(&options, &Exclusions::default());
        assert!(args.contains(&"--scan-pdf=no".to_string()));
        assert!(args.contains(&"--scan-elf=no".to_string()));
        assert!(args.contains(&"--scan-archive=yes".to_string()));
        assert!(args.contains(&"--detect-pua=yes".to_string()));
        assert!(!args.iter().any(|a| a == r"--exclude-dir=^\."));
        assert!(args.contains(&"--max-filesize=100M".to_string()));
        assert!(args.contains(&"--max-dir-recursion=3".to_string()));
        assert_eq!(args.last().unwrap(), "/home/user");
    }

    #[test]
    fn exclusions_become_patterns() {
        let exclusions = Exclusions {
            paths: vec!["/mnt/backup".into(), "".into()],
            extensions: vec![".tmp".into(), "bak".into()],
            processes: vec!["firefox".into()],
        };
        let args = args_of(&ScanOptions::default(), &exclusions);
        assert!(args.contains(&"--exclude-dir=^/mnt/backup".to_string()));
        assert!(args.contains(&r"--exclude=\.tmp$".to_string()));
        assert!(args.contains(&r"--exclude=\.bak$".to_string()));
        assert!(!args.iter().any(|a| a.contains("firefox")));
        assert_eq!(args.iter().filter(|a| a.starts_with("--exclude-dir")).count(), 2);
    }

    #[test]
    fn detection_lines() {
        assert_eq!(
            parse_detection(b"/tmp/eicar.com: Win.Test.EICAR_HDB-1 FOUND\n"),
            Some(Detection {
                path: "/tmp/eicar.com".into(),
                threat: "Win.Test.EICAR_HDB-1".into()
            })
        );
        assert_eq!(
            parse_detection(b"/tmp/a: b/c.txt: Eicar-Signature FOUND")
                .unwrap()
                .path,
            Path::new("/tmp/a: b/c.txt")
        );
        assert_eq!(parse_detection(b"/tmp/clean.txt: OK"), None);
        assert_eq!(parse_detection(b"----------- SCAN SUMMARY -----------"), None);
        assert_eq!(parse_detection(b": FOUND"), None);
    }

    #[cfg(unix)]
    #[test]
    fn detection_keeps_raw_path_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let d = parse_detection(b"/tmp/caf\xe9.exe: Eicar-Signature FOUND").unwrap();
        assert_eq!(d.path.as_os_str().as_bytes(), b"/tmp/caf\xe9.exe");
        assert_eq!(d.threat, "Eicar-Signature");
    }

    fn collect(rx: &mpsc::Receiver<Event>) -> (Vec<String>, Vec<Detection>, Outcome) {
        let mut lines = Vec::new();
        let mut detections = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                Event::ScanLine(_, l) => lines.push(l),
                Event::Detected(_, d) => detections.push(d),
                Event::ScanFinished(_, o) => return (lines, detections, o),
                e => panic!("unexpected event {:?}", e),
            }
        }
    }

    fn sh(script: &str) -> ClamAv {
        ClamAv::with_commands(
            vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
            vec![],
        )
    }

    #[cfg(unix)]
    #[test]
    fn scan_streams_lines() {
        let mut clamav = sh("printf 'first\\n\\nsecond\\n'; echo oops >&2; exit 1");
        let (tx, rx) = mpsc::channel();

        let id = clamav
            .scan_path(Path::new("/tmp"), move |e| tx.send(e).unwrap())
            .unwrap();

        let (lines, detections, outcome) = collect(&rx);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(detections.is_empty());
        assert_eq!(outcome.output, "first\nsecond");
        assert_eq!(outcome.error.trim(), "oops");
        assert!(!outcome.success);
        assert!(outcome.threats_found());
        assert!(id > 0);
    }

    #[cfg(unix)]
    #[test]
    fn invalid_utf8_output_does_not_end_the_scan() {
        let mut clamav = sh(concat!(
            "printf '/tmp/caf\\351.exe: Eicar-Signature FOUND\\n';",
            "printf '/tmp/b.exe: Eicar-Signature FOUND\\n';",
            "printf 'Done\\n';",
            "printf 'bad \\351 name\\n' >&2;",
            "exit 1"
        ));
        let (tx, rx) = mpsc::channel();
        clamav.scan_path(Path::new("/tmp"), move |e| tx.send(e).unwrap());

        let (lines, detections, outcome) = collect(&rx);
        assert_eq!(lines.len(), 3, "{:?}", lines);
        assert_eq!(lines[0], "/tmp/caf\u{FFFD}.exe: Eicar-Signature FOUND");
        assert_eq!(lines[2], "Done");
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].path, Path::new("/tmp/b.exe"));
        assert_eq!(outcome.error.trim(), "bad \u{FFFD} name");
        assert!(outcome.threats_found());
    }

    #[cfg(unix)]
    #[test]
    fn only_one_scan_at_a_time() {
        let mut clamav = ClamAv::with_commands(
            vec!["sh".into(), "-c".into(), "exec sleep 30".into(), "sh".into()],
            vec![],
        );
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();

        let id = clamav.scan_path(Path::new("/"), move |e| {
            let _ = tx.send(e);
        });
        assert!(id.is_some());
        assert!(clamav.is_scanning());
        assert_eq!(clamav.current_scan(), id);
        assert!(clamav
            .scan_path(Path::new("/"), move |e| {
                let _ = tx2.send(e);
            })
            .is_none());

        // give the worker a moment to spawn the child before stopping
        std::thread::sleep(Duration::from_millis(200));
        clamav.stop();
        assert!(!clamav.is_scanning());

        let (_, _, outcome) = collect(&rx);
        assert!(!outcome.success);
        assert!(!clamav.is_scanning());
    }

    #[test]
    fn launch_failure_is_reported() {
        let mut clamav =
            ClamAv::with_commands(vec!["/nonexistent/clamscan-binary".into()], vec![]);
        let (tx, rx) = mpsc::channel();
        clamav.scan_path(Path::new("/"), move |e| tx.send(e).unwrap());

        let (lines, _, outcome) = collect(&rx);
        assert!(lines.is_empty());
        assert!(!outcome.success);
        assert!(!outcome.error.is_empty());
        assert!(!clamav.is_installed());
    }

    #[cfg(unix)]
    #[test]
    fn update_reports_status() {
        for (program, expected) in [("true", true), ("false", false)] {
            let clamav = ClamAv::with_commands(vec![], vec![program.into()]);
            let (tx, rx) = mpsc::channel();
            clamav.update_database(move |e| tx.send(e).unwrap());
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                Event::UpdateFinished(o) => assert_eq!(o.success, expected),
                e => panic!("unexpected event {:?}", e),
            }
        }
    }

    #[test]
    fn empty_updater_fails() {
        let clamav = ClamAv::with_commands(vec![], vec![]);
        let (tx, rx) = mpsc::channel();
        clamav.update_database(move |e| tx.send(e).unwrap());
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            Event::UpdateFinished(o) => assert!(!o.success && o.code.is_none()),
            e => panic!("unexpected event {:?}", e),
        }
    }
}
