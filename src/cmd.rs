use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, trace};

/// How a child process failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExitFailure {
    /// The process exited normally with a non-zero code.
    #[error("exit status {0}")]
    Code(i32),
    /// The process could not be started, or was killed by a signal.
    #[error("{0}")]
    Abnormal(String),
}

impl ExitFailure {
    /// The exit code, when the process exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitFailure::Code(code) => Some(*code),
            ExitFailure::Abnormal(_) => None,
        }
    }
}

/// Runs external commands to completion on the calling thread.
///
/// `argv[0]` is the program, looked up on `PATH` by the implementation.
/// No retries happen at this layer.
pub trait ProcessRunner {
    /// Run with stdin, stdout and stderr connected to ours.
    fn run(&self, argv: &[String]) -> Result<(), ExitFailure>;

    /// Run with all stdio discarded.
    fn run_quiet(&self, argv: &[String]) -> Result<(), ExitFailure>;

    /// Run with `input` written to the child's stdin; stdout and stderr are ours.
    fn run_with_input(&self, argv: &[String], input: &[u8]) -> Result<(), ExitFailure>;
}

/// Build an owned argv from string slices.
pub fn argv<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    parts.iter().map(|p| p.as_ref().to_string()).collect()
}

/// `ProcessRunner` backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(argv: &[String]) -> Result<Command, ExitFailure> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExitFailure::Abnormal("empty command line".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<(), ExitFailure> {
        debug!(command = ?argv, "cmd:run");
        let mut cmd = Self::command(argv)?;
        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_failure(argv, &e))?;
        classify(argv, status)
    }

    fn run_quiet(&self, argv: &[String]) -> Result<(), ExitFailure> {
        trace!(command = ?argv, "cmd:run_quiet");
        let mut cmd = Self::command(argv)?;
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| spawn_failure(argv, &e))?;
        classify(argv, status)
    }

    fn run_with_input(&self, argv: &[String], input: &[u8]) -> Result<(), ExitFailure> {
        debug!(command = ?argv, input_len = input.len(), "cmd:run_with_input");
        let mut cmd = Self::command(argv)?;
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_failure(argv, &e))?;

        // Dropping the handle closes the pipe so the child sees EOF.
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(input)
        {
            // The child may exit before reading everything; its status decides.
            debug!(error = %e, "cmd:stdin write failed");
        }

        let status = child
            .wait()
            .map_err(|e| ExitFailure::Abnormal(format!("failed to wait for {}: {}", argv[0], e)))?;
        classify(argv, status)
    }
}

fn spawn_failure(argv: &[String], err: &std::io::Error) -> ExitFailure {
    ExitFailure::Abnormal(format!(
        "failed to execute command: {}: {}",
        argv.join(" "),
        err
    ))
}

fn classify(argv: &[String], status: ExitStatus) -> Result<(), ExitFailure> {
    if status.success() {
        trace!(command = ?argv, "cmd:success");
        return Ok(());
    }
    match status.code() {
        Some(code) => {
            debug!(command = ?argv, code, "cmd:failure");
            Err(ExitFailure::Code(code))
        }
        None => {
            debug!(command = ?argv, status = ?status, "cmd:terminated");
            Err(ExitFailure::Abnormal(format!(
                "{} terminated abnormally ({})",
                argv[0], status
            )))
        }
    }
}
