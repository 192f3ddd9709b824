use anyhow::Result;
use chrono::Utc;
use tracing::info;

use tds_eval::evaluate::SectionEvaluator;
use tds_eval::ledger::{ResultLedger, TransactionRecord, write_csv};
use tds_eval::metrics::summarize;
use tds_eval::util::{now_utc_string, utc_compact_string, write_json_pretty};

use crate::cli::ScoreArgs;
use crate::commands::ledger_fingerprint;
use crate::model::ScoreReport;

pub fn run(args: ScoreArgs) -> Result<()> {
    let run_id = format!("score-{}", utc_compact_string(Utc::now()));
    let ledger_path = args.ledger.resolved_ledger_path();

    info!(
        run_id = %run_id,
        evaluator = args.evaluator.as_str(),
        ledger = %ledger_path.display(),
        "scoring ledger"
    );

    let ledger = ResultLedger::open(args.ledger.ledger_format.open_existing(&ledger_path)?)?;
    let stored = ledger.records();
    let total_rows = stored.len();
    drop(ledger);

    let evaluator = args.evaluator.build();
    let selected = stored
        .into_iter()
        .filter(|record| args.modes.is_empty() || args.modes.contains(&record.mode))
        .collect::<Vec<TransactionRecord>>();
    let (rescored, rows_changed) = rescore(evaluator.as_ref(), selected);

    let modes = summarize(&rescored);
    for entry in &modes {
        info!(
            mode = %entry.mode,
            rows = entry.rows,
            true_positives = entry.true_positives,
            false_positives = entry.false_positives,
            precision = entry.precision,
            recall = entry.recall,
            accuracy = entry.accuracy,
            "mode metrics"
        );
    }

    if let Some(detail_path) = &args.detail_path {
        write_csv(detail_path, &rescored, &[])?;
        info!(path = %detail_path.display(), rows = rescored.len(), "wrote detailed section analysis");
    }

    let report = ScoreReport {
        report_version: 1,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        evaluator: args.evaluator.as_str().to_string(),
        ledger: ledger_fingerprint(&args.ledger, total_rows)?,
        rows_scored: rescored.len(),
        rows_changed_since_stored: rows_changed,
        modes,
        notes: vec![
            "false_negatives is fixed at 0, so recall is 100 for every mode with rows.".to_string(),
            "Rows whose ground truth mentions doubt or no findable section always match."
                .to_string(),
        ],
    };

    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| args.ledger.reports_dir().join(format!("{run_id}.json")));
    write_json_pretty(&report_path, &report)?;

    info!(path = %report_path.display(), "wrote score report");
    Ok(())
}

fn rescore(
    evaluator: &dyn SectionEvaluator,
    records: Vec<TransactionRecord>,
) -> (Vec<TransactionRecord>, usize) {
    let mut changed = 0_usize;
    let rescored = records
        .into_iter()
        .map(|mut record| {
            let previous = record.match_flag();
            let outcome = evaluator.evaluate(record.retrieved_section(), record.original_answer());
            if previous.is_some_and(|flag| flag != outcome.is_match) {
                changed += 1;
            }
            record.apply_outcome(&outcome);
            record
        })
        .collect();
    (rescored, changed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tds_eval::evaluate::{LegacySlotEvaluator, OverlapEvaluator};
    use tds_eval::ledger::columns::{MATCH, ORIGINAL_ANSWER, RETRIEVED_SECTION};

    use super::*;

    fn row(transaction_no: u64, predicted: &str, truth: &str, stored: Option<bool>) -> TransactionRecord {
        let mut record = TransactionRecord::new(transaction_no, "hybrid");
        record.fields.insert(RETRIEVED_SECTION.to_string(), json!(predicted));
        record.fields.insert(ORIGINAL_ANSWER.to_string(), json!(truth));
        if let Some(flag) = stored {
            record.fields.insert(MATCH.to_string(), json!(flag));
        }
        record
    }

    #[test]
    fn rescore_fills_in_unevaluated_rows() {
        let (rows, changed) = rescore(
            &OverlapEvaluator,
            vec![row(1, "Section 1: 194C", "194C", None), row(2, "194A", "194C", None)],
        );
        assert_eq!(changed, 0);
        assert_eq!(rows[0].match_flag(), Some(true));
        assert_eq!(rows[1].match_flag(), Some(false));
    }

    #[test]
    fn rescore_counts_rows_that_flip_under_a_stricter_evaluator() {
        let (rows, changed) = rescore(
            &LegacySlotEvaluator,
            vec![
                row(1, "Section 1: 194C", "194C", Some(true)),
                row(2, "It is 194C", "194C", Some(true)),
            ],
        );
        assert_eq!(changed, 1);
        assert_eq!(rows[1].match_flag(), Some(false));
    }
}
