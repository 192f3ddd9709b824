use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use tds_eval::evaluate::EvaluatorKind;
use tds_eval::ledger::LedgerFormat;

#[derive(Parser, Debug)]
#[command(
    name = "tds-eval",
    version,
    about = "Score TDS section predictions and keep a per-transaction result ledger"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Record(RecordArgs),
    Score(ScoreArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    #[arg(long, default_value = ".cache/tds-eval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub ledger_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LedgerFormat::Sqlite)]
    pub ledger_format: LedgerFormat,
}

impl LedgerArgs {
    pub fn resolved_ledger_path(&self) -> PathBuf {
        self.ledger_path.clone().unwrap_or_else(|| {
            self.cache_root
                .join(self.ledger_format.default_file_name())
        })
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.cache_root.join("reports")
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "Original Answer")]
    pub column: String,
}

impl ExtractArgs {
    pub fn resolved_output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| sibling_with_suffix(&self.input, "_sections"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long)]
    pub dataset: PathBuf,

    #[arg(long)]
    pub predictions: PathBuf,

    #[arg(long, default_value = "hybrid")]
    pub mode: String,

    #[arg(long, value_enum, default_value_t = EvaluatorKind::Overlap)]
    pub evaluator: EvaluatorKind,

    #[arg(long, default_value = "Section as required in TDS Return")]
    pub section_column: String,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[arg(long, value_enum, default_value_t = EvaluatorKind::Overlap)]
    pub evaluator: EvaluatorKind,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub detail_path: Option<PathBuf>,

    #[arg(long = "mode")]
    pub modes: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    path.with_file_name(format!("{stem}{suffix}.{extension}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn record_defaults_to_hybrid_sqlite_overlap() {
        let cli = Cli::parse_from([
            "tds-eval",
            "record",
            "--dataset",
            "data.csv",
            "--predictions",
            "preds.csv",
        ]);
        let Commands::Record(args) = cli.command else {
            panic!("expected record command");
        };
        assert_eq!(args.mode, "hybrid");
        assert_eq!(args.evaluator, EvaluatorKind::Overlap);
        assert_eq!(
            args.ledger.resolved_ledger_path(),
            PathBuf::from(".cache/tds-eval/transaction_results.sqlite")
        );
    }

    #[test]
    fn score_accepts_legacy_evaluator_and_csv_ledger() {
        let cli = Cli::parse_from([
            "tds-eval",
            "score",
            "--evaluator",
            "legacy-slots",
            "--ledger-format",
            "csv",
            "--mode",
            "hybrid",
            "--mode",
            "naive",
        ]);
        let Commands::Score(args) = cli.command else {
            panic!("expected score command");
        };
        assert_eq!(args.evaluator, EvaluatorKind::LegacySlots);
        assert_eq!(args.modes, vec!["hybrid", "naive"]);
        assert_eq!(
            args.ledger.resolved_ledger_path(),
            PathBuf::from(".cache/tds-eval/transaction_results.csv")
        );
    }

    #[test]
    fn extract_output_defaults_next_to_input() {
        let args = ExtractArgs {
            input: PathBuf::from("data/sample_100_transactions.csv"),
            output: None,
            column: "Original Answer".to_string(),
        };
        assert_eq!(
            args.resolved_output(),
            PathBuf::from("data/sample_100_transactions_sections.csv")
        );
    }
}
