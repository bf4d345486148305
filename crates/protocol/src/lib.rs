use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod report;

pub use report::{BatchEntry, BatchReport, EntryOutcome};

pub const TIMEOUT_MARKER: &str = "TIMEOUT!";

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Completed {
        output: String,
        /// `None` when the child was ended by a signal.
        exit_code: Option<i32>,
    },
    TimedOut {
        #[serde(default)]
        partial_output: String,
        /// False when the child could not be reaped after the kill request.
        terminated: bool,
    },
    LaunchFailed { reason: String },
}

impl ExecutionResult {
    pub fn completed(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Completed {
            output: output.into(),
            exit_code,
        }
    }

    pub fn timed_out(partial_output: impl Into<String>, terminated: bool) -> Self {
        Self::TimedOut {
            partial_output: partial_output.into(),
            terminated,
        }
    }

    pub fn launch_failed(reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            reason: reason.into(),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Completed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { output, .. } => f.write_str(output),
            Self::TimedOut {
                terminated: true, ..
            } => f.write_str(TIMEOUT_MARKER),
            Self::TimedOut {
                terminated: false, ..
            } => write!(f, "{TIMEOUT_MARKER} (process did not exit after kill)"),
            Self::LaunchFailed { reason } => write!(f, "ERROR: {reason}"),
        }
    }
}
