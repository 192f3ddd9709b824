use anyhow::Result;
use tracing::{info, warn};

use tds_eval::ledger::ResultLedger;
use tds_eval::metrics::summarize;

use crate::cli::StatusArgs;

pub fn run(args: StatusArgs) -> Result<()> {
    let ledger_path = args.ledger.resolved_ledger_path();
    info!(cache_root = %args.ledger.cache_root.display(), "status requested");

    if !ledger_path.exists() {
        warn!(path = %ledger_path.display(), "ledger file missing");
        return Ok(());
    }

    let ledger = ResultLedger::open(args.ledger.ledger_format.open_existing(&ledger_path)?)?;
    let records = ledger.records();

    info!(
        path = %ledger_path.display(),
        format = args.ledger.ledger_format.as_str(),
        rows = records.len(),
        "ledger status"
    );

    for entry in summarize(&records) {
        info!(
            mode = %entry.mode,
            rows = entry.rows,
            evaluated = entry.evaluated,
            matched = entry.true_positives,
            "mode rows"
        );
    }

    Ok(())
}
