mod cli;
mod logging;

use crate::cli::Args;
use crate::logging::init_tracing;
use batch_runner::output::write_report_record;
use batch_runner::{BatchRunner, ShellExecutor};
use clap::Parser;
use protocol::duration_ms;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _file_guard = init_tracing(&args.log_options())?;

    let config = args.resolve_config()?;
    let batch_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        batch_id = %batch_id,
        commands = config.commands.len(),
        shell = %config.shell.program,
        "starting batch"
    );

    let executor = ShellExecutor::new(config.shell.clone(), config.limits.executor_settings());
    let runner = BatchRunner::new(executor, config.limits.budget())
        .with_skip_policy(config.limits.skip_policy());

    let started_at = Instant::now();
    let report = runner.run(config.commands.as_slice()).await;
    let duration = started_at.elapsed();
    tracing::info!(
        batch_id = %batch_id,
        entries = report.len(),
        skipped = report.skipped(),
        duration_ms = duration_ms(duration),
        "batch finished"
    );

    if let Some(report_dir) = &args.report_dir {
        if let Some(path) = write_report_record(report_dir, &batch_id, &report, duration).await {
            tracing::info!(path = %path.display(), "report record written");
        }
    }

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print!("{report}");
    }
    Ok(())
}
