use std::collections::HashMap;
use std::fs::File;
use std::ops::{Add, AddAssign};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::dataset::TransactionInput;
use crate::evaluate::SectionEvaluator;
use crate::ledger::columns::{self, ORIGINAL_ANSWER, RETRIEVED_SECTION, TRANSACTION_SUMMARY};
use crate::ledger::{FieldMap, FlushSummary, LedgerStore, ResultLedger, outcome_fields};
use crate::util::clean_cell_value;

const INPUT_TOKENS_COLUMN: &str = "Input Tokens";
const OUTPUT_TOKENS_COLUMN: &str = "Output Tokens";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: TokenUsage) {
        *self = *self + other;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    pub summary: Option<String>,
    pub retrieved_section: String,
    pub fields: FieldMap,
    pub usage: TokenUsage,
}

pub trait SectionClassifier {
    fn classify(&self, transaction: &TransactionInput) -> Result<Classification>;
}

#[derive(Debug, Default)]
pub struct ReplayClassifier {
    answers: HashMap<u64, Classification>,
}

impl ReplayClassifier {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open predictions {}", path.display()))?;
        let classifier = Self::from_reader(file)
            .with_context(|| format!("failed to load predictions {}", path.display()))?;
        info!(
            path = %path.display(),
            predictions = classifier.len(),
            "loaded replay predictions"
        );
        Ok(classifier)
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .context("failed to read header row")?
            .iter()
            .map(clean_cell_value)
            .collect::<Vec<String>>();

        let position = |name: &str| headers.iter().position(|header| header == name);
        let Some(number_index) = position(columns::TRANSACTION_NO) else {
            bail!("predictions need a '{}' column", columns::TRANSACTION_NO);
        };
        let Some(section_index) = position(RETRIEVED_SECTION) else {
            bail!("predictions need a '{RETRIEVED_SECTION}' column");
        };
        let input_tokens_index = position(INPUT_TOKENS_COLUMN);
        let output_tokens_index = position(OUTPUT_TOKENS_COLUMN);

        let mut answers = HashMap::<u64, Classification>::new();
        for (line, row) in csv_reader.records().enumerate() {
            let row = row.with_context(|| format!("failed to read predictions row {}", line + 2))?;
            let raw_number = row.get(number_index).unwrap_or_default().trim();
            let transaction_no = raw_number.parse::<u64>().with_context(|| {
                format!("invalid transaction number '{raw_number}' at row {}", line + 2)
            })?;

            let token_count = |index: Option<usize>| {
                index
                    .and_then(|index| row.get(index))
                    .and_then(|raw| raw.trim().parse::<u64>().ok())
                    .unwrap_or(0)
            };

            let mut fields = FieldMap::new();
            let mut summary = None;
            for (header, raw) in headers.iter().zip(row.iter()) {
                let value = clean_cell_value(raw);
                if value.is_empty() || !columns::is_persisted_field(header) {
                    continue;
                }
                match header.as_str() {
                    TRANSACTION_SUMMARY => summary = Some(value),
                    RETRIEVED_SECTION | ORIGINAL_ANSWER => {}
                    _ => {
                        if columns::find(header).is_some_and(|column| !column.derived) {
                            fields.insert(header.clone(), Value::String(value));
                        }
                    }
                }
            }

            let classification = Classification {
                summary,
                retrieved_section: row.get(section_index).unwrap_or_default().to_string(),
                fields,
                usage: TokenUsage::new(
                    token_count(input_tokens_index),
                    token_count(output_tokens_index),
                ),
            };
            if answers.insert(transaction_no, classification).is_some() {
                warn!(transaction_no, "duplicate prediction, keeping the later row");
            }
        }

        Ok(Self { answers })
    }

    pub fn insert(&mut self, transaction_no: u64, classification: Classification) {
        self.answers.insert(transaction_no, classification);
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl SectionClassifier for ReplayClassifier {
    fn classify(&self, transaction: &TransactionInput) -> Result<Classification> {
        match self.answers.get(&transaction.transaction_no) {
            Some(classification) => Ok(classification.clone()),
            None => bail!(
                "no recorded prediction for transaction {}",
                transaction.transaction_no
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    pub mode: String,
    pub processed: usize,
    pub matched: usize,
    pub usage: TokenUsage,
    pub flush: FlushSummary,
}

pub fn run_batch<S: LedgerStore>(
    classifier: &dyn SectionClassifier,
    evaluator: &dyn SectionEvaluator,
    ledger: &ResultLedger<S>,
    transactions: &[TransactionInput],
    mode: &str,
) -> Result<BatchSummary> {
    let mut usage = TokenUsage::default();
    let mut matched = 0_usize;

    for transaction in transactions {
        let classification = classifier.classify(transaction).with_context(|| {
            format!(
                "classification failed for transaction {}",
                transaction.transaction_no
            )
        })?;
        usage += classification.usage;

        let outcome = evaluator.evaluate(
            Some(classification.retrieved_section.as_str()),
            Some(transaction.ground_truth.as_str()),
        );
        if outcome.is_match {
            matched += 1;
        }

        let mut fields = classification.fields;
        if let Some(summary) = classification.summary {
            fields.insert(TRANSACTION_SUMMARY.to_string(), Value::String(summary));
        }
        fields.insert(
            RETRIEVED_SECTION.to_string(),
            Value::String(classification.retrieved_section),
        );
        fields.insert(
            ORIGINAL_ANSWER.to_string(),
            Value::String(transaction.ground_truth.clone()),
        );
        fields.extend(outcome_fields(&outcome));

        ledger.upsert(transaction.transaction_no, mode, fields)?;
    }

    let flush = ledger.flush()?;

    info!(
        mode = %mode,
        processed = transactions.len(),
        matched,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total_tokens = usage.total(),
        "batch recorded"
    );

    Ok(BatchSummary {
        mode: mode.to_string(),
        processed: transactions.len(),
        matched,
        usage,
        flush,
    })
}
