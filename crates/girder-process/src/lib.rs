//! Spawning and supervising external build tool processes.
//!
//! Gradle invocations are long-running, extremely chatty, and must be
//! cancellable at any point. `std::process::Command::output()` buffers all
//! stdout/stderr in memory and cannot be interrupted, so this crate provides:
//!
//! - bounded output capture (per stream),
//! - line-by-line streaming to an observer while the process runs, so
//!   progress and diagnostics reach the client in real time,
//! - cooperative cancellation that terminates the whole process tree
//!   (Gradle wrapper scripts spawn a JVM child that must not outlive us).

use std::{
    fmt,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

pub use tokio_util::sync::CancellationToken;

/// Which stream a captured line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Observer for process output lines, invoked from reader threads as lines
/// arrive. Implementations must be cheap; heavy work belongs elsewhere.
pub trait LineObserver: Send + Sync {
    fn line(&self, stream: OutputStream, line: &str);
}

/// Captured stdout/stderr, truncated to a maximum size per stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stream had more bytes than were retained.
    pub truncated: bool,
}

impl CapturedOutput {
    /// Join both streams, stdout first. Useful for marker scanning where the
    /// tool may print to either stream depending on version.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Options controlling one external invocation.
#[derive(Clone)]
pub struct LaunchOptions {
    /// Kill the process tree if it has not exited after this duration.
    /// `None` means no implicit timeout; build durations are unbounded.
    pub timeout: Option<Duration>,
    /// Maximum bytes retained per stream.
    pub max_bytes: usize,
    /// Cooperative cancellation. When triggered, the process tree is
    /// terminated and `cancelled` is set on the result.
    pub cancellation: Option<CancellationToken>,
    /// Grace period between SIGTERM and SIGKILL on Unix.
    pub kill_grace: Duration,
    /// Optional streaming observer for output lines.
    pub observer: Option<Arc<dyn LineObserver>>,
}

impl fmt::Debug for LaunchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchOptions")
            .field("timeout", &self.timeout)
            .field("max_bytes", &self.max_bytes)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            // 16MiB per stream keeps memory bounded while retaining enough
            // context to diagnose failed invocations.
            max_bytes: 16 * 1024 * 1024,
            cancellation: None,
            kill_grace: Duration::from_millis(250),
            observer: None,
        }
    }
}

/// A full invocation (cwd + program + args + extra environment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable debugging output, not a round-trippable shell snippet.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of a supervised invocation.
#[derive(Debug, Clone)]
pub struct LaunchResult {
    pub status: ExitStatus,
    pub output: CapturedOutput,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl LaunchResult {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.status.success()
    }
}

/// Run an invocation to completion under supervision.
///
/// Output lines are delivered to `opts.observer` as they arrive and are also
/// retained (bounded) for post-hoc inspection. The process `ExitStatus` is
/// always returned; timeout and cancellation are reported via flags rather
/// than errors so callers can distinguish them from tool failures.
pub fn launch(invocation: &Invocation, opts: LaunchOptions) -> io::Result<LaunchResult> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }

    // Put the child into its own process group on Unix so cancellation can
    // kill the entire tree (wrapper script + JVM + workers).
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and does not allocate.
            // This runs after `fork` in the child process.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target: "girder_process", invocation = %invocation, "spawning");
    let mut child = cmd.spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };

    let max_bytes = opts.max_bytes;
    let stdout_observer = opts.observer.clone();
    let stderr_observer = opts.observer.clone();
    let stdout_handle = thread::spawn(move || {
        read_lines_bounded(stdout, max_bytes, OutputStream::Stdout, stdout_observer)
    });
    let stderr_handle = thread::spawn(move || {
        read_lines_bounded(stderr, max_bytes, OutputStream::Stderr, stderr_observer)
    });

    let start = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;

    let status = if opts.timeout.is_some() || opts.cancellation.is_some() {
        let poll = Duration::from_millis(50);
        loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if let Some(token) = opts.cancellation.as_ref() {
                if token.is_cancelled() {
                    cancelled = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
            }

            if let Some(timeout) = opts.timeout {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
                thread::sleep(poll.min(timeout.saturating_sub(start.elapsed())));
            } else {
                thread::sleep(poll);
            }
        }
    } else {
        child.wait()?
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle, "stdout")??;
    let (stderr, stderr_truncated) = join_reader(stderr_handle, "stderr")??;

    Ok(LaunchResult {
        status,
        output: CapturedOutput {
            stdout,
            stderr,
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
        cancelled,
    })
}

fn terminate_process_tree(
    child: &mut std::process::Child,
    grace: Duration,
) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        // Negative pid targets the process group set via `setpgid(0, 0)`.
        unsafe {
            let _ = libc::kill(-pid, libc::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(25));
        }

        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(windows)]
    {
        let _ = grace;
        // `Child::kill()` only terminates the immediate process; `gradlew.bat`
        // spawns a JVM child that inherits the output handles and would keep
        // the reader threads blocked. `taskkill /T` takes the whole tree.
        let pid = child.id().to_string();
        let _ = Command::new("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let _ = child.kill();
        child.wait()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = grace;
        let _ = child.kill();
        child.wait()
    }
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<(String, bool)>>,
    stream: &'static str,
) -> io::Result<io::Result<(String, bool)>> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))
}

fn read_lines_bounded(
    reader: impl Read,
    max_bytes: usize,
    stream: OutputStream,
    observer: Option<Arc<dyn LineObserver>>,
) -> io::Result<(String, bool)> {
    let mut reader = BufReader::new(reader);
    let mut retained = String::new();
    let mut truncated = false;
    let mut line = String::new();

    loop {
        line.clear();
        // Invalid UTF-8 from the tool must not abort the read loop.
        let n = read_line_lossy(&mut reader, &mut line)?;
        if n == 0 {
            break;
        }

        if let Some(observer) = observer.as_deref() {
            observer.line(stream, line.trim_end_matches(['\r', '\n']));
        }

        if retained.len() < max_bytes {
            let remaining = max_bytes - retained.len();
            if line.len() <= remaining {
                retained.push_str(&line);
            } else {
                let mut cut = remaining;
                while cut > 0 && !line.is_char_boundary(cut) {
                    cut -= 1;
                }
                retained.push_str(&line[..cut]);
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }

    Ok((retained, truncated))
}

fn read_line_lossy(reader: &mut impl BufRead, line: &mut String) -> io::Result<usize> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n > 0 {
        line.push_str(&String::from_utf8_lossy(&buf));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        lines: Mutex<Vec<(OutputStream, String)>>,
    }

    impl LineObserver for RecordingObserver {
        fn line(&self, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push((stream, line.to_string()));
        }
    }

    #[test]
    fn bounded_reader_truncates_and_flags() {
        let input = "one\ntwo\nthree\n";
        let (retained, truncated) = read_lines_bounded(
            io::Cursor::new(input),
            8,
            OutputStream::Stdout,
            None,
        )
        .unwrap();
        assert_eq!(retained, "one\ntwo\n");
        assert!(truncated);
    }

    #[test]
    fn observer_sees_every_line_even_past_the_retention_cap() {
        let observer = Arc::new(RecordingObserver::default());
        let input = "alpha\nbeta\ngamma\n";
        let (_, truncated) = read_lines_bounded(
            io::Cursor::new(input),
            4,
            OutputStream::Stderr,
            Some(observer.clone() as Arc<dyn LineObserver>),
        )
        .unwrap();
        assert!(truncated);

        let lines = observer.lines.lock().unwrap();
        let texts: Vec<&str> = lines.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(texts, ["alpha", "beta", "gamma"]);
        assert!(lines.iter().all(|(s, _)| *s == OutputStream::Stderr));
    }

    #[test]
    fn lossy_line_reads_do_not_fail_on_invalid_utf8() {
        let input: &[u8] = b"ok\n\xff\xfe broken\n";
        let (retained, truncated) =
            read_lines_bounded(io::Cursor::new(input), 1024, OutputStream::Stdout, None).unwrap();
        assert!(!truncated);
        assert!(retained.starts_with("ok\n"));
        assert!(retained.contains("broken"));
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_terminates_a_sleeping_process() {
        let token = CancellationToken::new();
        let for_cancel = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            for_cancel.cancel();
        });

        let invocation = Invocation::new(
            Path::new("/"),
            Path::new("sh"),
            &["-c".to_string(), "sleep 30".to_string()],
        );
        let result = launch(
            &invocation,
            LaunchOptions {
                cancellation: Some(token),
                ..LaunchOptions::default()
            },
        )
        .unwrap();
        assert!(result.cancelled);
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_reported_separately_from_failure() {
        let invocation = Invocation::new(
            Path::new("/"),
            Path::new("sh"),
            &["-c".to_string(), "sleep 30".to_string()],
        );
        let result = launch(
            &invocation,
            LaunchOptions {
                timeout: Some(Duration::from_millis(100)),
                ..LaunchOptions::default()
            },
        )
        .unwrap();
        assert!(result.timed_out);
        assert!(!result.cancelled);
    }
}
