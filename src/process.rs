//! Process runner: spawn an external tool, capture both streams, enforce a
//! wall-clock limit.
//!
//! Two calling conventions are offered on top of [`ProcessRunner::run`]:
//!
//! - [`ProcessRunner::run_silent`] for compilation and translation stages. Any
//!   byte on stdout or stderr, or a nonzero exit, is an error carrying the full
//!   command line and both streams.
//! - [`ProcessRunner::run_observed`] for executing the program under test. Only
//!   the exit code matters; stream contents are captured but not judged.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::diagnostics::HarnessError;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// =============================================================================
// COMMAND LINES
// =============================================================================

/// A program plus its argument vector, kept around for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Renders the command line so it can be pasted into a shell.
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(self.program.as_os_str()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(s: &OsStr) -> String {
    let s = s.to_string_lossy();
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@".contains(c));
    if plain {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

// =============================================================================
// CHILD OUTPUT
// =============================================================================

/// Everything observed about one finished (or killed) child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `128 + signal` when the child was killed by a signal.
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn is_silent(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Synchronous child-process executor with an optional per-invocation timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs the command to completion, capturing both streams fully.
    ///
    /// A timeout is not an error at this level: the child is killed and the
    /// output comes back with `timed_out` set.
    pub fn run(&self, cmd: &CommandLine) -> Result<ProcessOutput, HarnessError> {
        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut command);
        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            command: cmd.to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_thread = thread::spawn(move || read_stream(stdout));
        let stderr_thread = thread::spawn(move || read_stream(stderr));

        let waited = self.wait(&mut child);
        // Anything the child left behind (a hung cc1, a forked test program)
        // still holds the pipes; the readers only finish once it is gone.
        kill_process_group(child.id());
        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();
        let (status, timed_out) = waited.map_err(|source| HarnessError::Spawn {
            command: cmd.to_string(),
            source,
        })?;

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt as _;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal: Option<i32> = None;

        let exit_code = match status.code() {
            Some(code) => code,
            None => signal.map(|s| 128 + s).unwrap_or(1),
        };

        Ok(ProcessOutput {
            exit_code,
            signal,
            timed_out,
            stdout,
            stderr,
        })
    }

    /// Runs a stage that must succeed without printing anything.
    pub fn run_silent(&self, cmd: &CommandLine) -> Result<(), HarnessError> {
        let output = self.run(cmd)?;
        if output.timed_out {
            return Err(self.timeout_error(cmd));
        }
        if !output.is_silent() || output.exit_code != 0 {
            return Err(HarnessError::NotSilent {
                command: cmd.to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    /// Runs the program under test and returns its exit code.
    pub fn run_observed(&self, cmd: &CommandLine) -> Result<i32, HarnessError> {
        let output = self.run(cmd)?;
        if output.timed_out {
            return Err(self.timeout_error(cmd));
        }
        Ok(output.exit_code)
    }

    fn timeout_error(&self, cmd: &CommandLine) -> HarnessError {
        HarnessError::Timeout {
            command: cmd.to_string(),
            limit: self.timeout.unwrap_or_default(),
        }
    }

    fn wait(&self, child: &mut Child) -> std::io::Result<(std::process::ExitStatus, bool)> {
        let Some(limit) = self.timeout else {
            return child.wait().map(|status| (status, false));
        };
        let deadline = Instant::now().checked_add(limit);

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status, false));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                kill_process_group(child.id());
                let _ = child.kill();
                let status = child.wait()?;
                return Ok((status, true));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Makes the child the leader of a new session, so the whole tree it spawns
/// can be killed with one signal.
fn own_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = command;
    }
}

/// SIGKILLs every process in the group led by `pid`. A group id stays
/// reserved while any member is alive, so this never reaches a stranger.
fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return;
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

fn read_stream<R: Read>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
