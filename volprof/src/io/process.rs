//! Helpers for running external tools with timeouts and bounded output.
//!
//! Every step of a profile run shells out (apt-get, git, make, nm, zip). The
//! [`CommandRunner`] trait is the single seam between the pipeline and the host,
//! so tests can substitute a scripted runner that never spawns processes.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// A fully described external command, independent of `std::process::Command`
/// so it can be recorded and compared in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    /// Overrides the runner's capture limit for commands whose stdout is the payload.
    pub capture_limit: Option<usize>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Build from an argv-style slice (`["apt-get", "install", "-y"]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        Ok(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = Some(bytes);
        self
    }

    /// Prefix with an elevation command (e.g. `sudo`). An empty prefix is a no-op.
    pub fn elevated(self, prefix: &[String]) -> Self {
        let Some((first, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args: Vec<String> = rest.to_vec();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: first.clone(),
            args,
            ..self
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal (including timeouts).
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// One-line description of why the command did not succeed.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let code = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr_text();
        let last_line = stderr.lines().rev().find(|line| !line.trim().is_empty());
        match last_line {
            Some(line) => format!("{code}: {}", line.trim()),
            None => code,
        }
    }
}

/// Abstraction over the host's process table and search path.
pub trait CommandRunner {
    /// Run the invocation to completion. `Err` means the process could not be
    /// spawned or waited on; a non-zero exit is reported through `CommandOutput`.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// True if `name` resolves on the search path.
    fn executable_exists(&self, name: &str) -> bool;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl SystemRunner {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %invocation))]
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        run_command_with_timeout(
            invocation.to_command(),
            invocation.stdin.as_deref(),
            self.timeout,
            invocation.capture_limit.unwrap_or(self.output_limit_bytes),
        )
        .with_context(|| format!("run {invocation}"))
    }

    fn executable_exists(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Run and require a zero exit status.
pub fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    invocation: &Invocation,
) -> Result<CommandOutput> {
    let output = runner.run(invocation)?;
    if !output.success() {
        warn!(command = %invocation, exit_code = ?output.exit_code, "command failed");
        return Err(anyhow!("{invocation} failed: {}", output.failure_summary()));
    }
    Ok(output)
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read and stdin is written on their own threads, so neither a child
/// that echoes its input (`tee`) nor one that never reads stdin can stall the
/// wait; the timeout covers the whole run. `output_limit_bytes` bounds what is
/// kept in memory.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let stdin_handle = match stdin {
        Some(input) => {
            let child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(child_stdin, &input)))
        }
        None => None,
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        let written = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("stdin writer thread panicked")),
        };
        // A killed child leaves the writer with an error that says nothing new.
        if !timed_out {
            written?;
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        debug!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Feed stdin, then close it by dropping the pipe.
fn write_stdin(mut sink: ChildStdin, input: &[u8]) -> Result<()> {
    match sink.write_all(input) {
        Ok(()) => Ok(()),
        // The child exited without consuming all input; its status tells the story.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!("child closed stdin early");
            Ok(())
        }
        Err(e) => Err(e).context("write stdin"),
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runner() -> SystemRunner {
        SystemRunner::new(Duration::from_secs(10), 1024)
    }

    #[test]
    fn elevated_prefixes_program() {
        let inv = Invocation::new("zip")
            .args(["-j", "out.zip"])
            .elevated(&["sudo".to_string(), "-n".to_string()]);
        assert_eq!(inv.program, "sudo");
        assert_eq!(inv.args, vec!["-n", "zip", "-j", "out.zip"]);
        assert_eq!(inv.to_string(), "sudo -n zip -j out.zip");
    }

    #[test]
    fn empty_elevation_is_noop() {
        let inv = Invocation::new("nm").arg("-n").elevated(&[]);
        assert_eq!(inv, Invocation::new("nm").arg("-n"));
    }

    #[test]
    fn from_argv_rejects_empty() {
        assert!(Invocation::from_argv(&[]).is_err());
        let inv = Invocation::from_argv(&["apt-get".to_string(), "update".to_string()])
            .expect("argv");
        assert_eq!(inv.program, "apt-get");
        assert_eq!(inv.args, vec!["update"]);
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = runner()
            .run(&Invocation::new("sh").args(["-c", "echo hello; exit 3"]))
            .expect("run");
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout_text().trim(), "hello");
        assert!(!out.success());
        assert_eq!(out.failure_summary(), "exit code 3");
    }

    #[test]
    fn pipes_large_stdin_through_echoing_child() {
        let input = vec![b'x'; 256 * 1024];
        let out = runner()
            .run(&Invocation::new("cat").stdin(input))
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout.len(), 1024);
        assert_eq!(out.stdout_truncated, 256 * 1024 - 1024);
    }

    #[test]
    fn invocation_limit_overrides_runner_limit() {
        let out = runner()
            .run(
                &Invocation::new("cat")
                    .stdin(vec![b'y'; 4096])
                    .capture_limit(8192),
            )
            .expect("run");
        assert_eq!(out.stdout.len(), 4096);
        assert_eq!(out.stdout_truncated, 0);
    }

    #[test]
    fn timeout_kills_child() {
        let runner = SystemRunner::new(Duration::from_millis(200), 1024);
        let out = runner
            .run(&Invocation::new("sleep").arg("5"))
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
        assert_eq!(out.failure_summary(), "timed out");
    }

    #[test]
    fn timeout_covers_unread_stdin() {
        let runner = SystemRunner::new(Duration::from_millis(200), 1024);
        let started = Instant::now();
        let out = runner
            .run(&Invocation::new("sleep").arg("3").stdin(vec![b'z'; 1024 * 1024]))
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn run_checked_reports_stderr_tail() {
        let err = run_checked(
            &runner(),
            &Invocation::new("sh").args(["-c", "echo boom >&2; exit 1"]),
        )
        .expect_err("should fail");
        assert!(err.to_string().contains("exit code 1: boom"));
    }

    #[test]
    fn executable_lookup_uses_search_path() {
        assert!(runner().executable_exists("sh"));
        assert!(!runner().executable_exists("definitely_not_a_real_command_12345"));
    }
}
