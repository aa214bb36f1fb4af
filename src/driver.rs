//! Multi-source runner. Each source runs as its own child process with a wall-clock limit;
//! the runner only sees exit status, captured output, and the files left in the output directory.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RULE: &str = "============================================================";

/// How one child run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Non-zero exit. None when the child was killed by a signal.
    Failed(Option<i32>),
    TimedOut(Duration),
    LaunchError(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "succeeded"),
            Outcome::Failed(Some(code)) => write!(f, "failed (exit code {})", code),
            Outcome::Failed(None) => write!(f, "failed (terminated by signal)"),
            Outcome::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            Outcome::LaunchError(reason) => write!(f, "could not be launched: {}", reason),
        }
    }
}

/// Result of running one source.
#[derive(Debug, Clone)]
pub struct SourceRun {
    pub name: String,
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Spawn `cmd` with captured output and wait at most `timeout`. The child is killed on timeout.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> (Outcome, String, String) {
    let mut child = match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return (Outcome::LaunchError(e.to_string()), String::new(), String::new()),
    };
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => break Outcome::Success,
            Ok(Some(status)) => break Outcome::Failed(status.code()),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                break Outcome::TimedOut(timeout);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Outcome::LaunchError(e.to_string());
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    (outcome, stdout, stderr)
}

/// Runs `<program> <base args...> run <source>` for each source.
#[derive(Debug, Clone)]
pub struct Driver {
    program: PathBuf,
    base_args: Vec<OsString>,
    timeout: Duration,
}

impl Driver {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout,
        }
    }

    /// Argument passed before the `run` subcommand (e.g. global flags).
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.base_args.push(arg.into());
        self
    }

    pub fn command_for(&self, source: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).arg("run").arg(source);
        cmd
    }

    pub fn run_source(&self, source: &str) -> SourceRun {
        log::debug!("Launching {} for {}", self.program.display(), source);
        let (outcome, stdout, stderr) = run_with_timeout(&mut self.command_for(source), self.timeout);
        SourceRun {
            name: source.to_string(),
            outcome,
            stdout,
            stderr,
        }
    }
}

/// `*.xml` files in `dir` with their sizes, sorted by file name. Missing dir yields an empty list.
pub fn list_feeds(dir: &Path) -> std::io::Result<Vec<(String, u64)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut feeds = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let meta = entry.metadata()?;
        if meta.is_file() {
            feeds.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
        }
    }
    feeds.sort();
    Ok(feeds)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Banner printed before a source's captured output.
pub fn format_header(source: &str) -> String {
    format!("\n{RULE}\nRunning: {source}\n{RULE}")
}

pub fn format_status(run: &SourceRun) -> String {
    let mark = if run.outcome.is_success() { "✓" } else { "✗" };
    format!("{} {} {}", mark, run.name, run.outcome)
}

/// Per-source status, the success count, and the feeds currently on disk.
pub fn format_summary(runs: &[SourceRun], feeds: &[(String, u64)]) -> String {
    let mut out = format!("\n{RULE}\nSummary\n{RULE}\n");
    for run in runs {
        let label = if run.outcome.is_success() { "OK    " } else { "FAILED" };
        out.push_str(&format!("{}: {}\n", label, run.name));
    }
    let ok = runs.iter().filter(|r| r.outcome.is_success()).count();
    out.push_str(&format!("\nTotal: {}/{} succeeded\n", ok, runs.len()));
    if !feeds.is_empty() {
        out.push_str(&format!("\nFeeds ({}):\n", feeds.len()));
        for (name, size) in feeds {
            out.push_str(&format!("  - {} ({} bytes)\n", name, group_thousands(*size)));
        }
    }
    out
}
