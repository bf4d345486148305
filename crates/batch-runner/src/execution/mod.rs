mod capture;
mod shell;

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use protocol::{duration_ms, ExecutionResult};
use system_utils::process::{force_terminate, isolate_child, KILL_GRACE};
use tokio::process::Child;
use tokio::time::{Instant, MissedTickBehavior};

use self::capture::{merged_pipe, OutputCapture, OutputPipe};

pub use self::shell::{escape_double_quotes, ShellConfig};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// `timeout` of `None` lets the command run until it exits.
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> ExecutionResult;
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub poll_interval: Duration,
    pub max_output_bytes: usize,
    pub kill_grace: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            kill_grace: KILL_GRACE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    shell: ShellConfig,
    settings: ExecutorSettings,
}

enum WaitEnd {
    Exited(ExitStatus),
    Expired,
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> ExecutionResult {
        if command.trim().is_empty() {
            return ExecutionResult::launch_failed("command is empty");
        }
        match self.supervise(command, timeout).await {
            Ok(result) => result,
            Err(err) => ExecutionResult::launch_failed(format!("{err:#}")),
        }
    }
}

impl ShellExecutor {
    pub fn new(shell: ShellConfig, settings: ExecutorSettings) -> Self {
        Self { shell, settings }
    }

    async fn supervise(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> anyhow::Result<ExecutionResult> {
        let command_line = self.shell.command_line(command);
        let (mut pipe, stdout_writer, stderr_writer) =
            merged_pipe().context("create output pipe")?;

        let mut cmd = self.shell.build(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(stdout_writer);
        cmd.stderr(stderr_writer);
        cmd.kill_on_drop(true);
        isolate_child(&mut cmd);
        let spawned = cmd.spawn();
        // Our copies of the write ends live in `cmd`; close them so the pipe can reach EOF.
        drop(cmd);
        let mut child = spawned.with_context(|| format!("spawn {command_line}"))?;
        tracing::debug!(
            command_line = %command_line,
            pid = ?child.id(),
            timeout_ms = ?timeout.map(duration_ms),
            "spawned command"
        );

        let mut capture = OutputCapture::new(self.settings.max_output_bytes);
        let end = match self
            .wait_for_exit(&mut child, &mut pipe, &mut capture, timeout)
            .await
        {
            Ok(end) => end,
            Err(err) => {
                if let Err(kill_err) = force_terminate(&mut child, self.settings.kill_grace).await
                {
                    tracing::error!(error = %kill_err, "failed to stop child after read error");
                }
                return Err(err);
            }
        };

        match end {
            WaitEnd::Exited(status) => {
                pipe.drain_into(&mut capture).context("read command output")?;
                if !pipe.is_closed() {
                    tracing::debug!(
                        command_line = %command_line,
                        "output pipe still held open by a descendant"
                    );
                }
                Ok(ExecutionResult::completed(capture.into_text(), status.code()))
            }
            WaitEnd::Expired => {
                let terminated = match force_terminate(&mut child, self.settings.kill_grace).await
                {
                    Ok(status) => {
                        tracing::debug!(
                            command_line = %command_line,
                            ?status,
                            "killed timed out command"
                        );
                        true
                    }
                    Err(err) => {
                        tracing::error!(
                            command_line = %command_line,
                            error = %err,
                            "timed out command survived kill"
                        );
                        false
                    }
                };
                if let Err(err) = pipe.drain_into(&mut capture) {
                    tracing::debug!(error = %err, "failed to read output after kill");
                }
                Ok(ExecutionResult::timed_out(capture.into_text(), terminated))
            }
        }
    }

    async fn wait_for_exit(
        &self,
        child: &mut Child,
        pipe: &mut OutputPipe,
        capture: &mut OutputCapture,
        timeout: Option<Duration>,
    ) -> anyhow::Result<WaitEnd> {
        let started_at = Instant::now();
        let period = self.settings.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            pipe.drain_into(capture).context("read command output")?;
            if let Some(status) = child.try_wait().context("wait on child")? {
                return Ok(WaitEnd::Exited(status));
            }
            if let Some(limit) = timeout {
                if started_at.elapsed() >= limit {
                    return Ok(WaitEnd::Expired);
                }
            }
        }
    }
}
