use anyhow::Result;

use crate::cli::LedgerArgs;
use crate::model::LedgerFingerprint;
use tds_eval::util::sha256_file;

pub mod extract;
pub mod record;
pub mod score;
pub mod status;

fn ledger_fingerprint(args: &LedgerArgs, total_rows: usize) -> Result<LedgerFingerprint> {
    let path = args.resolved_ledger_path();
    Ok(LedgerFingerprint {
        sha256: sha256_file(&path)?,
        path: path.display().to_string(),
        format: args.ledger_format.as_str().to_string(),
        total_rows,
    })
}
