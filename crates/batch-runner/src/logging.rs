use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "batch-runner.log";

#[derive(Debug, Clone)]
pub(crate) struct LogOptions {
    pub(crate) dir: PathBuf,
    pub(crate) to_stderr: bool,
    pub(crate) level: Level,
}

impl LogOptions {
    // `RUST_LOG` directives win; `level` covers everything they leave out.
    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy()
    }
}

pub(crate) fn init_tracing(options: &LogOptions) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&options.dir)
        .with_context(|| format!("failed to create log dir {}", options.dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&options.dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(false)
        .with_current_span(false);
    let stderr_layer = options.to_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(options.filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

