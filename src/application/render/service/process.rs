use std::{
    ffi::OsString,
    io::ErrorKind,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{process::Command, time};
use tracing::warn;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Arguments as lossy UTF-8, for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Stderr followed by stdout, trimmed. TeX engines report errors on stdout.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stderr.to_string(),
            (true, false) => stdout.to_string(),
            (false, false) => format!("{stderr}\n{stdout}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executable not found: {0}")]
    NotFound(std::io::Error),
    #[error("failed to spawn process: {0}")]
    Spawn(std::io::Error),
    #[error("process exceeded {timeout:?} and was killed")]
    Timeout { timeout: Duration },
    #[error("failed to collect process output: {0}")]
    Io(std::io::Error),
}

/// Runs external processes. The pipeline only talks to this seam, so tests
/// can substitute a fake.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessOutput, LaunchError>;
}

/// [`ProcessLauncher`] backed by `tokio::process`.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait on
/// timeout terminates it. On unix it also leads its own process group, and a
/// timeout kills the whole group, including anything started through
/// `-shell-escape`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessOutput, LaunchError> {
        let started_at = Instant::now();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = spec.cwd.as_ref() {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                LaunchError::NotFound(err)
            } else {
                LaunchError::Spawn(err)
            }
        })?;
        let pid = child.id();

        match time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                exit_code: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(err)) => Err(LaunchError::Io(err)),
            Err(_elapsed) => {
                warn!(
                    target = "application::render::process",
                    op = "process::launch",
                    result = "timeout",
                    program = %spec.program.display(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "Process exceeded its timeout; killed"
                );
                #[cfg(unix)]
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                Err(LaunchError::Timeout {
                    timeout: spec.timeout,
                })
            }
        }
    }
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let outcome = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match outcome {
        Ok(status) if status.success() => {}
        // The group is already gone when every member exited on its own.
        Ok(_) => {}
        Err(err) => {
            warn!(
                target = "application::render::process",
                op = "process::kill_process_group",
                result = "error",
                pgid,
                error = %err,
                "Failed to signal process group"
            );
        }
    }
}
