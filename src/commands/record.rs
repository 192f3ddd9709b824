use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use tds_eval::dataset::{DatasetColumns, load_transactions};
use tds_eval::ledger::ResultLedger;
use tds_eval::pipeline::{ReplayClassifier, run_batch};
use tds_eval::util::{now_utc_string, utc_compact_string, write_json_pretty};

use crate::cli::RecordArgs;
use crate::commands::ledger_fingerprint;
use crate::model::RecordRunManifest;

pub fn run(args: RecordArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("record-{}", utc_compact_string(started_ts));
    let ledger_path = args.ledger.resolved_ledger_path();

    info!(
        run_id = %run_id,
        mode = %args.mode,
        evaluator = args.evaluator.as_str(),
        ledger = %ledger_path.display(),
        "starting record run"
    );

    let columns = DatasetColumns {
        section: args.section_column.clone(),
        ..DatasetColumns::default()
    };
    let mut transactions = load_transactions(&args.dataset, &columns)?;
    if let Some(limit) = args.limit {
        transactions.truncate(limit);
    }
    if transactions.is_empty() {
        bail!("no transactions found in {}", args.dataset.display());
    }

    let classifier = ReplayClassifier::from_path(&args.predictions)?;
    if classifier.len() < transactions.len() {
        warn!(
            predictions = classifier.len(),
            transactions = transactions.len(),
            "fewer predictions than transactions"
        );
    }

    let evaluator = args.evaluator.build();
    let ledger = ResultLedger::open(args.ledger.ledger_format.open(&ledger_path)?)?;
    let batch = run_batch(
        &classifier,
        evaluator.as_ref(),
        &ledger,
        &transactions,
        &args.mode,
    )?;
    let total_rows = batch.flush.total_rows;
    drop(ledger);

    let manifest = RecordRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        started_at,
        completed_at: now_utc_string(),
        dataset_path: args.dataset.display().to_string(),
        predictions_path: args.predictions.display().to_string(),
        evaluator: args.evaluator.as_str().to_string(),
        ledger: ledger_fingerprint(&args.ledger, total_rows)?,
        batch,
    };

    let manifest_path = args.ledger.reports_dir().join(format!("{run_id}.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote record run manifest");
    info!(
        processed = manifest.batch.processed,
        matched = manifest.batch.matched,
        total_tokens = manifest.batch.usage.total(),
        "record run completed"
    );
    Ok(())
}
