use crate::{duration_ms, ExecutionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum EntryOutcome {
    Executed(ExecutionResult),
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchEntry {
    /// 1-based position in the submitted command list.
    pub index: usize,
    pub command: String,
    pub outcome: EntryOutcome,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl BatchEntry {
    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            EntryOutcome::Executed(result) => Some(result),
            EntryOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Skipped)
    }
}

/// Ordered record of a batch run. Entries are only ever appended, and each
/// entry's index is its position in the submitted list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_executed(
        &mut self,
        command: impl Into<String>,
        result: ExecutionResult,
        timeout: Option<Duration>,
        duration: Duration,
    ) -> &BatchEntry {
        self.push(BatchEntry {
            index: self.entries.len() + 1,
            command: command.into(),
            outcome: EntryOutcome::Executed(result),
            timeout_ms: timeout.map(duration_ms),
            duration_ms: duration_ms(duration),
        })
    }

    pub fn push_skipped(&mut self, command: impl Into<String>) -> &BatchEntry {
        self.push(BatchEntry {
            index: self.entries.len() + 1,
            command: command.into(),
            outcome: EntryOutcome::Skipped,
            timeout_ms: None,
            duration_ms: 0,
        })
    }

    fn push(&mut self, entry: BatchEntry) -> &BatchEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_skipped()).count()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.outcome {
                EntryOutcome::Executed(result) => {
                    writeln!(f, ">> [Command #{}]: {}", entry.index, entry.command)?;
                    writeln!(f, "{result}")?;
                }
                EntryOutcome::Skipped => {
                    writeln!(
                        f,
                        ">> [Command #{}] Skipped due to total timeout.",
                        entry.index
                    )?;
                }
            }
        }
        Ok(())
    }
}
