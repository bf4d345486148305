use anyhow::Context;
use batch_runner::config::{parse_command_list, validate_config, Config};
use clap::Parser;
use protocol::duration_ms;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use crate::logging::LogOptions;

#[derive(Parser, Debug)]
#[command(
    name = "batch-runner",
    version,
    about = "Run shell commands one by one under per-command and total timeouts"
)]
pub(crate) struct Args {
    /// TOML file with commands, limits and the shell to use.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Command to run; repeat for several. Runs after the config file's commands.
    #[arg(short = 'c', long = "command")]
    pub(crate) commands: Vec<String>,
    /// File with one command per line, run after `--command` entries.
    #[arg(long)]
    pub(crate) commands_file: Option<PathBuf>,
    /// Limit for each command, e.g. `3s` or `500ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) per_command_timeout: Option<Duration>,
    /// Limit for the whole batch.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) total_timeout: Option<Duration>,
    /// Record a skip entry for every command left when the total timeout hits.
    #[arg(long, default_value_t = false)]
    pub(crate) mark_skipped: bool,
    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,
    /// Directory for `<batch-id>.report.json` records.
    #[arg(long)]
    pub(crate) report_dir: Option<PathBuf>,
    #[arg(long, default_value = "logs")]
    pub(crate) log_dir: PathBuf,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    /// Level for targets that `RUST_LOG` does not mention.
    #[arg(long, default_value = "info")]
    pub(crate) log_level: Level,
}

impl Args {
    pub(crate) fn log_options(&self) -> LogOptions {
        LogOptions {
            dir: self.log_dir.clone(),
            to_stderr: self.log_to_stderr,
            level: self.log_level,
        }
    }

    /// Loads the config file (if any) and layers the command line on top of it.
    pub(crate) fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        self.apply_to(&mut config)?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_to(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(timeout) = self.per_command_timeout {
            config.limits.timeout_per_command_ms = Some(duration_ms(timeout));
        }
        if let Some(timeout) = self.total_timeout {
            config.limits.total_timeout_ms = Some(duration_ms(timeout));
        }
        if self.mark_skipped {
            config.limits.mark_skipped = true;
        }
        config.commands.extend(self.commands.iter().cloned());
        if let Some(path) = &self.commands_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read commands file {}", path.display()))?;
            config.commands.extend(parse_command_list(&content));
        }
        Ok(())
    }
}
