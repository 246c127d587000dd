use crate::config::RunConfig;
use crate::program::Program;
use std::fmt;
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

const ASAN_OPTIONS: (&str, &str) = ("ASAN_OPTIONS", "abort_on_error=1:detect_leaks=1:symbolize=1");
const UBSAN_OPTIONS: (&str, &str) = ("UBSAN_OPTIONS", "print_stacktrace=1");

/// Longest single sleep while waiting on the target.
const MAX_POLL_SLEEP: Duration = Duration::from_millis(25);

/// Engine-side failures while running the target. These abort the run;
/// anything the target itself does is an [`ExecutionResult`] instead.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to spawn target {target:?}: {source}")]
    Spawn {
        target: PathBuf,
        source: std::io::Error,
    },
    #[error("failed waiting for target: {0}")]
    Wait(std::io::Error),
    #[error("failed to kill timed-out target: {0}")]
    Kill(std::io::Error),
}

/// How one run of the target ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The process exit code; `128 + signal` when killed by a signal, the
    /// configured sentinel on timeout.
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            signal: None,
            timed_out: false,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            exit_code: 128 + signal,
            signal: Some(signal),
            timed_out: false,
        }
    }

    pub fn timeout(sentinel: i32) -> Self {
        Self {
            exit_code: sentinel,
            signal: None,
            timed_out: true,
        }
    }

    /// Terminated by a signal.
    pub fn crashed(&self) -> bool {
        self.signal.is_some()
    }

    fn from_status(status: ExitStatus) -> Self {
        match (status.signal(), status.code()) {
            (Some(signal), _) => Self::signaled(signal),
            (None, Some(code)) => Self::exited(code),
            (None, None) => Self::exited(-1),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = match self.signal {
            Some(s) => s.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "exit={} signal={} timed_out={}",
            self.exit_code, signal, self.timed_out
        )
    }
}

/// Bytes the target wrote while it ran.
#[derive(Debug, Default, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs a program against an input file and reports how the target ended.
pub trait Executor {
    fn execute(&mut self, program: &Program, input_path: &Path)
    -> Result<ExecutionResult, HarnessError>;
}

#[derive(Debug, Clone)]
pub struct CommandExecutorConfig {
    pub target: PathBuf,
    pub timeout: Duration,
    pub timeout_sentinel: i32,
    pub envs: Vec<(String, String)>,
}

impl CommandExecutorConfig {
    pub fn new(target: PathBuf, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            timeout_sentinel: crate::config::default_timeout_sentinel(),
            envs: Vec::new(),
        }
    }

    /// Harness settings for a run. Sanitizer builds get their runtime
    /// options unless the caller's environment already sets them.
    pub fn from_run_config(config: &RunConfig) -> Self {
        let mut envs = Vec::new();
        if config.asan {
            for (key, value) in [ASAN_OPTIONS, UBSAN_OPTIONS] {
                if std::env::var_os(key).is_none() {
                    envs.push((key.to_string(), value.to_string()));
                }
            }
        }
        Self {
            target: config.target.clone(),
            timeout: config.timeout(),
            timeout_sentinel: config.exit_codes.timeout_sentinel,
            envs,
        }
    }
}

/// Launches the target as `<target> --input <path> -- <tokens...>`.
pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    /// Like [`Executor::execute`], but also hands back what the target
    /// printed.
    pub fn run(
        &self,
        program: &Program,
        input_path: &Path,
    ) -> Result<(ExecutionResult, ProcessOutput), HarnessError> {
        let mut cmd = Command::new(&self.config.target);
        cmd.arg("--input")
            .arg(input_path)
            .arg("--")
            .args(program.tokens())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.config.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            target: self.config.target.clone(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = wait_with_timeout(&mut child, self.config.timeout);
        if waited.is_err() {
            let _ = child.kill();
            let _ = child.wait();
        }

        let output = ProcessOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        let result = match waited? {
            Some(status) => ExecutionResult::from_status(status),
            None => ExecutionResult::timeout(self.config.timeout_sentinel),
        };
        Ok((result, output))
    }
}

impl Executor for CommandExecutor {
    fn execute(
        &mut self,
        program: &Program,
        input_path: &Path,
    ) -> Result<ExecutionResult, HarnessError> {
        self.run(program, input_path).map(|(result, _)| result)
    }
}

trait Pipe: Read + Send + 'static {}
impl Pipe for ChildStdout {}
impl Pipe for ChildStderr {}

/// Reads a pipe to its end on a helper thread, so a chatty target never
/// stalls on a full pipe buffer.
fn drain<P: Pipe>(pipe: Option<P>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Waits for `child` for at most `timeout`. Returns `None` after killing and
/// reaping a child that ran out of time.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, HarnessError> {
    let start = Instant::now();
    let mut sleep = Duration::from_millis(1);

    loop {
        if let Some(status) = child.try_wait().map_err(HarnessError::Wait)? {
            return Ok(Some(status));
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            child.kill().map_err(HarnessError::Kill)?;
            child.wait().map_err(HarnessError::Wait)?;
            return Ok(None);
        }
        std::thread::sleep(sleep.min(timeout - elapsed));
        sleep = (sleep * 2).min(MAX_POLL_SLEEP);
    }
}
