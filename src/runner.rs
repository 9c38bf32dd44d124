//! Process step execution
//!
//! A [`StepRunner`] runs one shell line to completion, streaming its output
//! into the task's sink. The shell runner starts every step in its own
//! process group so cancellation can take down the whole tree it spawned.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::TaskSink;

/// Why a step did not succeed
#[derive(Error, Debug)]
pub enum StepError {
    #[error("failed to start shell")]
    Spawn(#[source] std::io::Error),

    #[error("failed while waiting for process")]
    Wait(#[source] std::io::Error),

    #[error("exited with status {code}")]
    Exited { code: i32 },

    #[error("terminated by signal {signal}")]
    Signaled { signal: i32 },

    #[error("canceled")]
    Canceled,
}

impl StepError {
    /// True when the step stopped because the run was canceled rather than
    /// because the command itself failed
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StepError::Canceled)
    }
}

/// One shell line of a task
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub task: &'a str,
    pub command: &'a str,
    pub env: &'a HashMap<String, String>,
}

/// Runs a single step, honouring the shared cancellation token
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        step: Step<'_>,
        cancel: &CancellationToken,
        sink: &dyn TaskSink,
    ) -> Result<(), StepError>;
}

/// Runs steps through the platform shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    flag: String,
    /// Time between the polite and the forced stop on cancellation
    grace: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        Self {
            shell: shell.to_string(),
            flag: flag.to_string(),
            grace: Duration::from_secs(5),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn command(&self, step: Step<'_>) -> Command {
        let mut command = Command::new(&self.shell);
        command
            .arg(&self.flag)
            .arg(step.command)
            .envs(step.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        command
    }

    /// SIGTERM the group, then SIGKILL whatever is left after the grace period
    async fn terminate(&self, child: &mut Child, task: &str) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                signal_group(pid, libc::SIGTERM);
                let exited = tokio::time::timeout(self.grace, child.wait()).await.is_ok();
                signal_group(pid, libc::SIGKILL);
                if exited {
                    return;
                }
            }
        }

        if let Err(e) = child.kill().await {
            warn!(task, error = %e, "failed to kill step process");
        }
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only delivers a signal; an empty group yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc != 0 {
        debug!(pgid, signal, "killpg: {}", std::io::Error::last_os_error());
    }
}

fn classify(status: ExitStatus) -> Result<(), StepError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(StepError::Exited { code });
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(StepError::Signaled { signal });
        }
    }

    Err(StepError::Exited { code: -1 })
}

/// Copy lines from a pipe into the sink until EOF
async fn forward<R>(pipe: Option<R>, mut emit: impl FnMut(&str))
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                emit(line.trim_end_matches(['\n', '\r']));
            }
        }
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(
        &self,
        step: Step<'_>,
        cancel: &CancellationToken,
        sink: &dyn TaskSink,
    ) -> Result<(), StepError> {
        if cancel.is_cancelled() {
            return Err(StepError::Canceled);
        }

        let mut child = self.command(step).spawn().map_err(StepError::Spawn)?;
        debug!(task = step.task, pid = child.id(), command = step.command, "step started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = {
            let completion = async {
                let (_, _, status) = tokio::join!(
                    forward(stdout, |line| sink.stdout(line)),
                    forward(stderr, |line| sink.stderr(line)),
                    child.wait(),
                );
                status
            };

            tokio::select! {
                status = completion => Some(status),
                _ = cancel.cancelled() => None,
            }
        };

        match finished {
            Some(Ok(status)) => {
                debug!(task = step.task, %status, "step exited");
                let result = classify(status);
                // A step killed from outside while the run is being torn down
                // counts as canceled, not failed.
                match result {
                    Err(StepError::Signaled { .. }) if cancel.is_cancelled() => {
                        Err(StepError::Canceled)
                    }
                    other => other,
                }
            }
            Some(Err(e)) => Err(StepError::Wait(e)),
            None => {
                info!(task = step.task, command = step.command, "canceling step");
                self.terminate(&mut child, step.task).await;
                Err(StepError::Canceled)
            }
        }
    }
}
