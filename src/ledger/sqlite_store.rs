use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use tracing::info;

use crate::util::{ensure_parent_directory, now_utc_string};

use super::LedgerStore;
use super::columns::{COLUMNS, ColumnKind, decode_field, encode_cell};
use super::record::TransactionRecord;

const LEDGER_SCHEMA_VERSION: &str = "1";

pub struct SqliteStore {
    connection: Connection,
    label: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open ledger database {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            label: path.display().to_string(),
        })
    }

    // Opens a ledger that must already exist, without creating the file or touching its schema.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open ledger database {}", path.display()))?;

        let has_table = connection
            .query_row(
                "SELECT EXISTS(
                   SELECT 1 FROM sqlite_master
                   WHERE type = 'table' AND name = 'transaction_results'
                 )",
                [],
                |row| row.get::<_, bool>(0),
            )
            .with_context(|| format!("failed to inspect ledger database {}", path.display()))?;
        if !has_table {
            bail!("{} is not a result ledger database", path.display());
        }

        Ok(Self {
            connection,
            label: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory ledger database")?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            label: ":memory:".to_string(),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn load(&mut self) -> Result<Vec<TransactionRecord>> {
        let select = format!(
            "SELECT {} FROM transaction_results ORDER BY row_seq ASC",
            column_list()
        );
        let mut statement = self
            .connection
            .prepare(&select)
            .context("failed to prepare ledger load")?;

        let mut rows = statement.query([])?;
        let mut out = Vec::<TransactionRecord>::new();

        while let Some(row) = rows.next()? {
            let mut record = TransactionRecord::new(0, String::new());
            for (index, column) in COLUMNS.iter().enumerate() {
                match column.kind {
                    ColumnKind::TransactionNo => {
                        record.transaction_no = row.get::<_, i64>(index)? as u64;
                    }
                    ColumnKind::Mode => {
                        record.mode = row.get(index)?;
                    }
                    ColumnKind::Flag => {
                        if let Some(flag) = row.get::<_, Option<i64>>(index)? {
                            record
                                .fields
                                .insert(column.header.to_string(), (flag != 0).into());
                        }
                    }
                    ColumnKind::Text | ColumnKind::SectionList => {
                        let raw = row.get::<_, Option<String>>(index)?;
                        if let Some(value) = raw.as_deref().and_then(|raw| decode_field(column, raw))
                        {
                            record.fields.insert(column.header.to_string(), value);
                        }
                    }
                }
            }
            out.push(record);
        }

        info!(store = %self.label, rows = out.len(), "loaded ledger rows from sqlite");
        Ok(out)
    }

    fn persist(&mut self, records: &[TransactionRecord]) -> Result<()> {
        let transaction = self
            .connection
            .transaction()
            .context("failed to begin ledger transaction")?;

        transaction
            .execute("DELETE FROM transaction_results", [])
            .context("failed to clear ledger table")?;

        {
            let placeholders = (1..=COLUMNS.len() + 1)
                .map(|index| format!("?{index}"))
                .collect::<Vec<String>>()
                .join(", ");
            let insert = format!(
                "INSERT INTO transaction_results(row_seq, {}) VALUES({placeholders})",
                column_list()
            );
            let mut statement = transaction
                .prepare(&insert)
                .context("failed to prepare ledger insert")?;

            for (seq, record) in records.iter().enumerate() {
                let mut values = Vec::<SqlValue>::with_capacity(COLUMNS.len() + 1);
                values.push(SqlValue::Integer(seq as i64));
                for column in &COLUMNS {
                    values.push(sql_value(record, column.kind, encode_cell(record, column)));
                }
                statement
                    .execute(params_from_iter(values.iter()))
                    .with_context(|| {
                        format!(
                            "failed to insert ledger row {}/{}",
                            record.transaction_no, record.mode
                        )
                    })?;
            }
        }

        transaction.execute(
            "INSERT INTO metadata(key, value) VALUES('ledger_updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [now_utc_string()],
        )?;

        transaction
            .commit()
            .context("failed to commit ledger transaction")?;
        Ok(())
    }
}

fn sql_value(record: &TransactionRecord, kind: ColumnKind, cell: Option<String>) -> SqlValue {
    match kind {
        ColumnKind::TransactionNo => SqlValue::Integer(record.transaction_no as i64),
        ColumnKind::Flag => match record.match_flag() {
            Some(flag) => SqlValue::Integer(i64::from(flag)),
            None => SqlValue::Null,
        },
        _ => cell.map(SqlValue::Text).unwrap_or(SqlValue::Null),
    }
}

fn column_list() -> String {
    COLUMNS
        .iter()
        .map(|column| column.sql_name)
        .collect::<Vec<&str>>()
        .join(", ")
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transaction_results (
              row_seq INTEGER PRIMARY KEY,
              transaction_no INTEGER NOT NULL,
              transaction_summary TEXT,
              high_level_keywords TEXT,
              low_level_keywords TEXT,
              entities_retrieved TEXT,
              relations_retrieved TEXT,
              chunks_retrieved TEXT,
              final_prompt TEXT,
              mode TEXT NOT NULL,
              retrieved_section TEXT,
              original_answer TEXT,
              retrieved_sections_list TEXT,
              original_sections_list TEXT,
              is_match INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_transaction_results_key
              ON transaction_results(transaction_no, mode);
            ",
        )
        .context("failed to initialize ledger schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('ledger_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [LEDGER_SCHEMA_VERSION],
    )?;

    Ok(())
}
