use serde::Serialize;

use tds_eval::metrics::ModeMetrics;
use tds_eval::pipeline::BatchSummary;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub report_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub evaluator: String,
    pub ledger: LedgerFingerprint,
    pub rows_scored: usize,
    pub rows_changed_since_stored: usize,
    pub modes: Vec<ModeMetrics>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerFingerprint {
    pub path: String,
    pub format: String,
    pub sha256: Option<String>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub dataset_path: String,
    pub predictions_path: String,
    pub evaluator: String,
    pub ledger: LedgerFingerprint,
    pub batch: BatchSummary,
}
