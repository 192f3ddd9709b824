
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Result, bail};
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::evaluate::MatchOutcome;

pub mod columns;
mod csv_store;
mod record;
mod sqlite_store;

pub use csv_store::{CsvStore, write_records as write_csv};
pub use record::{FieldMap, RecordKey, TransactionRecord, outcome_fields};
pub use sqlite_store::SqliteStore;

pub trait LedgerStore: Send {
    fn describe(&self) -> String;
    fn load(&mut self) -> Result<Vec<TransactionRecord>>;
    // Receives the whole table and must replace the stored contents atomically.
    fn persist(&mut self, records: &[TransactionRecord]) -> Result<()>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load(&mut self) -> Result<Vec<TransactionRecord>> {
        (**self).load()
    }

    fn persist(&mut self, records: &[TransactionRecord]) -> Result<()> {
        (**self).persist(records)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LedgerFormat {
    Sqlite,
    Csv,
}

impl LedgerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Csv => "csv",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Sqlite => "transaction_results.sqlite",
            Self::Csv => "transaction_results.csv",
        }
    }

    pub fn open(self, path: &Path) -> Result<Box<dyn LedgerStore>> {
        let store: Box<dyn LedgerStore> = match self {
            Self::Sqlite => Box::new(SqliteStore::open(path)?),
            Self::Csv => Box::new(CsvStore::new(path)),
        };
        Ok(store)
    }

    pub fn open_existing(self, path: &Path) -> Result<Box<dyn LedgerStore>> {
        if !path.exists() {
            bail!("ledger {} does not exist", path.display());
        }
        let store: Box<dyn LedgerStore> = match self {
            Self::Sqlite => Box::new(SqliteStore::open_existing(path)?),
            Self::Csv => Box::new(CsvStore::new(path)),
        };
        Ok(store)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FlushSummary {
    pub appended_rows: usize,
    pub total_rows: usize,
}

struct LedgerState<S> {
    store: S,
    snapshot: Vec<TransactionRecord>,
    buffer: Vec<TransactionRecord>,
    positions: HashMap<RecordKey, usize>,
}

pub struct ResultLedger<S: LedgerStore> {
    state: Mutex<LedgerState<S>>,
}

impl<S: LedgerStore> ResultLedger<S> {
    pub fn open(mut store: S) -> Result<Self> {
        let snapshot = store.load()?;
        info!(
            store = %store.describe(),
            snapshot_rows = snapshot.len(),
            "opened result ledger"
        );

        Ok(Self {
            state: Mutex::new(LedgerState {
                store,
                snapshot,
                buffer: Vec::new(),
                positions: HashMap::new(),
            }),
        })
    }

    pub fn upsert(
        &self,
        transaction_no: u64,
        mode: &str,
        mut fields: FieldMap,
    ) -> Result<UpsertOutcome> {
        if transaction_no == 0 {
            bail!("transaction numbers start at 1 (mode {mode})");
        }
        if mode.trim().is_empty() {
            bail!("mode must not be empty (transaction {transaction_no})");
        }

        for key_column in [columns::TRANSACTION_NO, columns::MODE] {
            if fields.remove(key_column).is_some() {
                warn!(
                    transaction_no,
                    mode = %mode,
                    column = key_column,
                    "key column supplied as a field, using the explicit key instead"
                );
            }
        }

        let unstored = fields
            .keys()
            .filter(|name| !columns::is_persisted_field(name))
            .cloned()
            .collect::<Vec<String>>();
        if !unstored.is_empty() {
            warn!(
                transaction_no,
                mode = %mode,
                fields = ?unstored,
                "fields have no ledger column and will not be persisted"
            );
        }

        let key = RecordKey::new(transaction_no, mode);
        let mut state = self.state.lock();

        let existing = state.positions.get(&key).copied();
        if let Some(position) = existing {
            state.buffer[position].merge_fields(fields);
            debug!(transaction_no, mode = %mode, "updated ledger row");
            return Ok(UpsertOutcome::Updated);
        }

        let mut record = TransactionRecord::new(transaction_no, mode);
        record.merge_fields(fields);
        let position = state.buffer.len();
        state.buffer.push(record);
        state.positions.insert(key, position);
        debug!(transaction_no, mode = %mode, "added ledger row");
        Ok(UpsertOutcome::Inserted)
    }

    pub fn record_outcome(
        &self,
        transaction_no: u64,
        mode: &str,
        outcome: &MatchOutcome,
    ) -> Result<UpsertOutcome> {
        self.upsert(transaction_no, mode, outcome_fields(outcome))
    }

    pub fn flush(&self) -> Result<FlushSummary> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let appended_rows = state.buffer.len();
        let mut combined = Vec::with_capacity(state.snapshot.len() + appended_rows);
        combined.extend(state.snapshot.iter().cloned());
        combined.extend(state.buffer.iter().map(stored_form));

        state.store.persist(&combined)?;

        state.snapshot = combined;
        state.buffer.clear();
        state.positions.clear();

        let summary = FlushSummary {
            appended_rows,
            total_rows: state.snapshot.len(),
        };
        info!(
            store = %state.store.describe(),
            appended_rows = summary.appended_rows,
            total_rows = summary.total_rows,
            "flushed result ledger"
        );
        Ok(summary)
    }

    pub fn close(self) -> Result<Option<FlushSummary>> {
        if self.state.lock().buffer.is_empty() {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    pub fn buffered(&self) -> Vec<TransactionRecord> {
        self.state.lock().buffer.clone()
    }

    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.state.lock().snapshot.clone()
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        let state = self.state.lock();
        state
            .snapshot
            .iter()
            .chain(state.buffer.iter())
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &RecordKey) -> Option<TransactionRecord> {
        let state = self.state.lock();
        state
            .positions
            .get(key)
            .map(|&position| state.buffer[position].clone())
    }

    pub fn describe(&self) -> String {
        self.state.lock().store.describe()
    }
}

// Session rows as the store will hold them: fields without a ledger column are dropped.
fn stored_form(record: &TransactionRecord) -> TransactionRecord {
    let mut stored = record.clone();
    stored
        .fields
        .retain(|name, _| columns::is_persisted_field(name));
    stored
}
