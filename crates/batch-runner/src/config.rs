use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::batch::{SkipPolicy, TimeBudget};
use crate::execution::{ExecutorSettings, ShellConfig, DEFAULT_MAX_OUTPUT_BYTES};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        validate_config(&config)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub timeout_per_command_ms: Option<u64>,
    #[serde(default)]
    pub total_timeout_ms: Option<u64>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
    #[serde(default)]
    pub mark_skipped: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_per_command_ms: None,
            total_timeout_ms: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_output_bytes: default_max_output_bytes(),
            mark_skipped: false,
        }
    }
}

impl LimitsConfig {
    pub fn budget(&self) -> TimeBudget {
        TimeBudget::new(
            self.timeout_per_command_ms.map(Duration::from_millis),
            self.total_timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_output_bytes: usize::try_from(self.max_output_bytes).unwrap_or(usize::MAX),
            ..ExecutorSettings::default()
        }
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        if self.mark_skipped {
            SkipPolicy::MarkRemaining
        } else {
            SkipPolicy::StopAtFirst
        }
    }
}

pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.limits.poll_interval_ms == 0 {
        anyhow::bail!("limits.poll_interval_ms must be greater than zero");
    }
    if config.shell.program.trim().is_empty() {
        anyhow::bail!("shell.program is empty");
    }
    Ok(())
}

/// Parses a command list file: one command per line, blank lines and `#` comments ignored.
pub fn parse_command_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_max_output_bytes() -> u64 {
    DEFAULT_MAX_OUTPUT_BYTES as u64
}
