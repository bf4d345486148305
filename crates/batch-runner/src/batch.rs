use std::time::Duration;

use protocol::{duration_ms, BatchReport, ExecutionResult};
use tokio::time::Instant;

use crate::execution::CommandExecutor;

/// Per-command and whole-batch time limits. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBudget {
    pub per_command: Option<Duration>,
    pub total: Option<Duration>,
}

impl TimeBudget {
    pub fn new(per_command: Option<Duration>, total: Option<Duration>) -> Self {
        Self { per_command, total }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.total.map(|total| total.saturating_sub(elapsed))
    }

    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        self.remaining(elapsed)
            .is_some_and(|remaining| remaining.is_zero())
    }

    /// Timeout for a command starting `elapsed` into the batch: the smaller of
    /// the per-command limit and whatever the total budget has left.
    pub fn effective_timeout(&self, elapsed: Duration) -> Option<Duration> {
        match (self.per_command, self.remaining(elapsed)) {
            (Some(per_command), Some(remaining)) => Some(per_command.min(remaining)),
            (Some(per_command), None) => Some(per_command),
            (None, remaining) => remaining,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SkipPolicy {
    /// One skip entry for the command that could not start, then stop.
    #[default]
    StopAtFirst,
    /// A skip entry for that command and every command after it.
    MarkRemaining,
}

pub struct BatchRunner<E> {
    executor: E,
    budget: TimeBudget,
    skip_policy: SkipPolicy,
}

impl<E: CommandExecutor> BatchRunner<E> {
    pub fn new(executor: E, budget: TimeBudget) -> Self {
        Self {
            executor,
            budget,
            skip_policy: SkipPolicy::default(),
        }
    }

    pub fn with_skip_policy(mut self, skip_policy: SkipPolicy) -> Self {
        self.skip_policy = skip_policy;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn run<S: AsRef<str>>(&self, commands: &[S]) -> BatchReport {
        let started_at = Instant::now();
        let mut report = BatchReport::new();

        for (position, command) in commands.iter().enumerate() {
            let command = command.as_ref();
            let index = position + 1;
            let elapsed = started_at.elapsed();
            if self.budget.is_exhausted(elapsed) {
                tracing::warn!(
                    index,
                    elapsed_ms = duration_ms(elapsed),
                    remaining = commands.len() - position,
                    "total timeout exceeded, skipping remaining commands"
                );
                match self.skip_policy {
                    SkipPolicy::StopAtFirst => {
                        report.push_skipped(command);
                    }
                    SkipPolicy::MarkRemaining => {
                        for skipped in &commands[position..] {
                            report.push_skipped(skipped.as_ref());
                        }
                    }
                }
                break;
            }

            let timeout = self.budget.effective_timeout(elapsed);
            tracing::info!(
                index,
                command,
                timeout_ms = ?timeout.map(duration_ms),
                "running command"
            );
            let command_started = Instant::now();
            let result = self.executor.execute(command, timeout).await;
            let duration = command_started.elapsed();
            log_result(index, &result, duration);
            report.push_executed(command, result, timeout, duration);
        }

        report
    }
}

fn log_result(index: usize, result: &ExecutionResult, duration: Duration) {
    let duration_ms = duration_ms(duration);
    match result {
        ExecutionResult::Completed { exit_code, .. } => {
            tracing::info!(index, ?exit_code, duration_ms, "command completed");
        }
        ExecutionResult::TimedOut { terminated, .. } => {
            tracing::warn!(index, terminated, duration_ms, "command timed out");
        }
        ExecutionResult::LaunchFailed { reason } => {
            tracing::warn!(index, error = %reason, "command failed to launch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use protocol::EntryOutcome;
    use std::sync::Mutex;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    // Paused-clock timers resolve to whole milliseconds; allow for the rounding.
    fn assert_near(actual: Option<Duration>, expected_ms: u64) {
        let actual = actual.expect("bounded timeout");
        assert!(
            actual <= ms(expected_ms) && actual + ms(2) >= ms(expected_ms),
            "expected about {expected_ms}ms, got {actual:?}"
        );
    }

    /// Stands in for a real shell: `sleep N` takes N seconds, `missing` cannot
    /// launch, anything else echoes its argument instantly.
    #[derive(Default)]
    struct FakeExecutor {
        calls: Mutex<Vec<(String, Option<Duration>)>>,
    }

    impl FakeExecutor {
        fn timeouts(&self) -> Vec<Option<Duration>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, timeout)| *timeout)
                .collect()
        }

        fn commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(command, _)| command.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&self, command: &str, timeout: Option<Duration>) -> ExecutionResult {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), timeout));
            if command == "missing" {
                return ExecutionResult::launch_failed("spawn missing");
            }
            let run_time = command
                .strip_prefix("sleep ")
                .map(|secs| Duration::from_secs(secs.parse().unwrap()))
                .unwrap_or_default();
            match timeout {
                Some(limit) if run_time > limit => {
                    tokio::time::sleep(limit).await;
                    ExecutionResult::timed_out("", true)
                }
                _ => {
                    tokio::time::sleep(run_time).await;
                    let text = command.strip_prefix("echo ").unwrap_or("");
                    ExecutionResult::completed(format!("{text}\n"), Some(0))
                }
            }
        }
    }

    fn outcomes(report: &BatchReport) -> Vec<&str> {
        report
            .entries()
            .iter()
            .map(|entry| match &entry.outcome {
                EntryOutcome::Skipped => "skipped",
                EntryOutcome::Executed(ExecutionResult::Completed { .. }) => "completed",
                EntryOutcome::Executed(ExecutionResult::TimedOut { .. }) => "timed_out",
                EntryOutcome::Executed(ExecutionResult::LaunchFailed { .. }) => "launch_failed",
            })
            .collect()
    }

    #[test]
    fn effective_timeout_takes_the_tighter_limit() {
        let both = TimeBudget::new(Some(ms(3000)), Some(ms(8000)));
        assert_eq!(both.effective_timeout(ms(0)), Some(ms(3000)));
        assert_eq!(both.effective_timeout(ms(6000)), Some(ms(2000)));

        let total_only = TimeBudget::new(None, Some(ms(8000)));
        assert_eq!(total_only.effective_timeout(ms(2500)), Some(ms(5500)));

        let per_command_only = TimeBudget::new(Some(ms(3000)), None);
        assert_eq!(per_command_only.effective_timeout(ms(60_000)), Some(ms(3000)));

        assert_eq!(TimeBudget::unbounded().effective_timeout(ms(60_000)), None);
    }

    #[test]
    fn budget_is_exhausted_only_with_a_total_limit() {
        let budget = TimeBudget::new(Some(ms(100)), Some(ms(1000)));
        assert!(!budget.is_exhausted(ms(999)));
        assert!(budget.is_exhausted(ms(1000)));
        assert!(budget.is_exhausted(ms(5000)));
        assert_eq!(budget.remaining(ms(5000)), Some(Duration::ZERO));
        assert!(!TimeBudget::new(Some(ms(100)), None).is_exhausted(ms(5000)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list_gives_empty_report() {
        let runner = BatchRunner::new(FakeExecutor::default(), TimeBudget::unbounded());
        let commands: [&str; 0] = [];
        let report = runner.run(&commands).await;
        assert!(report.is_empty());
        assert!(runner.executor().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_runs_every_command_in_order() {
        let runner = BatchRunner::new(FakeExecutor::default(), TimeBudget::unbounded());
        let commands = ["echo A", "sleep 5", "echo B", "echo C"];
        let report = runner.run(&commands).await;

        assert_eq!(report.len(), commands.len());
        for (entry, command) in report.entries().iter().zip(commands) {
            assert_eq!(entry.command, command);
            assert_eq!(entry.timeout_ms, None);
        }
        assert_eq!(runner.executor().commands(), commands);
        assert_eq!(runner.executor().timeouts(), vec![None; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_command_eats_into_total_budget() {
        let budget = TimeBudget::new(Some(ms(3000)), Some(ms(8000)));
        let runner = BatchRunner::new(FakeExecutor::default(), budget);
        let report = runner.run(&["echo A", "sleep 10", "echo B"]).await;

        assert_eq!(outcomes(&report), vec!["completed", "timed_out", "completed"]);
        assert_eq!(report.entries()[0].result().and_then(|r| r.output()), Some("A\n"));
        assert_eq!(report.entries()[2].result().and_then(|r| r.output()), Some("B\n"));
        assert_eq!(
            runner.executor().timeouts(),
            vec![Some(ms(3000)), Some(ms(3000)), Some(ms(3000))]
        );
        assert!((3000..3005).contains(&report.entries()[1].duration_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn last_command_gets_what_is_left_of_total_budget() {
        let budget = TimeBudget::new(Some(ms(3000)), Some(ms(5000)));
        let runner = BatchRunner::new(FakeExecutor::default(), budget);
        runner.run(&["echo A", "sleep 10", "echo B"]).await;

        let timeouts = runner.executor().timeouts();
        assert_eq!(timeouts[..2], [Some(ms(3000)), Some(ms(3000))]);
        assert_near(timeouts[2], 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_command_past_total_budget() {
        let budget = TimeBudget::new(None, Some(ms(5000)));
        let runner = BatchRunner::new(FakeExecutor::default(), budget);
        let report = runner
            .run(&["sleep 3", "sleep 3", "echo C", "echo D"])
            .await;

        assert_eq!(outcomes(&report), vec!["completed", "timed_out", "skipped"]);
        assert_eq!(report.entries()[2].command, "echo C");
        let timeouts = runner.executor().timeouts();
        assert_eq!(timeouts.len(), 2);
        assert_eq!(timeouts[0], Some(ms(5000)));
        assert_near(timeouts[1], 2000);
        assert_eq!(
            report.to_string().lines().last(),
            Some(">> [Command #3] Skipped due to total timeout.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_total_budget_never_runs_a_command() {
        let budget = TimeBudget::new(Some(ms(3000)), Some(Duration::ZERO));
        let runner = BatchRunner::new(FakeExecutor::default(), budget);
        let report = runner.run(&["echo A", "echo B", "echo C"]).await;

        assert_eq!(outcomes(&report), vec!["skipped"]);
        assert!(runner.executor().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_remaining_skips_every_unstarted_command() {
        let budget = TimeBudget::new(None, Some(Duration::ZERO));
        let runner = BatchRunner::new(FakeExecutor::default(), budget)
            .with_skip_policy(SkipPolicy::MarkRemaining);
        let report = runner.run(&["echo A", "echo B", "echo C"]).await;

        assert_eq!(outcomes(&report), vec!["skipped"; 3]);
        let indexes: Vec<usize> = report.entries().iter().map(|entry| entry.index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert!(runner.executor().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_does_not_stop_the_batch() {
        let runner = BatchRunner::new(FakeExecutor::default(), TimeBudget::unbounded());
        let report = runner.run(&["missing", "echo B"]).await;

        assert_eq!(outcomes(&report), vec!["launch_failed", "completed"]);
        assert_eq!(runner.executor().commands(), vec!["missing", "echo B"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_real_commands_through_the_shell() {
        use crate::execution::ShellExecutor;

        let budget = TimeBudget::new(Some(ms(500)), Some(ms(5000)));
        let runner = BatchRunner::new(ShellExecutor::default(), budget);
        let report = runner.run(&["echo A", "sleep 10", "echo B"]).await;

        assert_eq!(outcomes(&report), vec!["completed", "timed_out", "completed"]);
        let text = report.to_string();
        assert!(text.starts_with(">> [Command #1]: echo A\nA\n"), "{text}");
        assert!(text.contains(">> [Command #2]: sleep 10\nTIMEOUT!\n"), "{text}");
        assert!(text.contains(">> [Command #3]: echo B\nB\n"), "{text}");
    }
}
