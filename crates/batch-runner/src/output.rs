use protocol::{duration_ms, BatchReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize)]
struct ReportRecord<'a> {
    batch_id: &'a str,
    commands: usize,
    skipped: usize,
    duration_ms: u64,
    #[serde(flatten)]
    report: &'a BatchReport,
}

pub async fn write_report_record(
    output_dir: &Path,
    batch_id: &str,
    report: &BatchReport,
    duration: Duration,
) -> Option<PathBuf> {
    let record = ReportRecord {
        batch_id,
        commands: report.len(),
        skipped: report.skipped(),
        duration_ms: duration_ms(duration),
        report,
    };
    if let Err(err) = tokio::fs::create_dir_all(output_dir).await {
        tracing::warn!(error = %err, dir = %output_dir.display(), "failed to create report dir");
        return None;
    }
    let path = output_dir.join(format!("{batch_id}.report.json"));
    let payload = match serde_json::to_vec_pretty(&record) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode report record");
            return None;
        }
    };
    if let Err(err) = tokio::fs::write(&path, payload).await {
        tracing::warn!(error = %err, path = %path.display(), "failed to write report record");
        return None;
    }
    Some(path)
}
