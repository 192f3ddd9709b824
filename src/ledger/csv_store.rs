use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::info;

use crate::util::ensure_parent_directory;

use super::LedgerStore;
use super::columns::{self, ColumnKind, decode_field, encode_cell, has_derived_fields, value_text};
use super::record::TransactionRecord;

pub struct CsvStore {
    path: PathBuf,
    extra_columns: Vec<String>,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extra_columns: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for CsvStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&mut self) -> Result<Vec<TransactionRecord>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no ledger file yet, starting empty");
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("failed to open ledger {}", self.path.display()))?;
        let (records, extra_columns) = read_records(file, &self.path)?;
        if !extra_columns.is_empty() {
            info!(
                path = %self.path.display(),
                columns = ?extra_columns,
                "keeping extra ledger columns"
            );
        }
        self.extra_columns = extra_columns;

        info!(path = %self.path.display(), rows = records.len(), "loaded ledger rows from csv");
        Ok(records)
    }

    fn persist(&mut self, records: &[TransactionRecord]) -> Result<()> {
        let staging = self.staging_path();

        write_records(&staging, records, &self.extra_columns)?;
        fs::rename(&staging, &self.path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                staging.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}

// Returns the rows and the names of columns outside the fixed layout, in file order.
// Cells of those columns are kept as text fields under their header name.
pub fn read_records(
    reader: impl std::io::Read,
    origin: &Path,
) -> Result<(Vec<TransactionRecord>, Vec<String>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .with_context(|| format!("failed to read ledger header: {}", origin.display()))?
        .clone();

    let layout = headers
        .iter()
        .map(|name| columns::find(name.trim()))
        .collect::<Vec<_>>();

    let mut extra_columns = Vec::<String>::new();
    for (name, column) in headers.iter().zip(layout.iter()) {
        if column.is_none() && !extra_columns.iter().any(|seen| seen == name) {
            extra_columns.push(name.to_string());
        }
    }

    let has_key = |kind: ColumnKind| layout.iter().flatten().any(|column| column.kind == kind);
    if !has_key(ColumnKind::TransactionNo) || !has_key(ColumnKind::Mode) {
        bail!(
            "ledger {} must contain '{}' and '{}' columns",
            origin.display(),
            columns::TRANSACTION_NO,
            columns::MODE
        );
    }

    let mut out = Vec::<TransactionRecord>::new();
    for (line, row) in csv_reader.records().enumerate() {
        let row = row.with_context(|| {
            format!("failed to read ledger row {} in {}", line + 2, origin.display())
        })?;

        let mut record = TransactionRecord::new(0, String::new());
        for ((raw, name), column) in row.iter().zip(headers.iter()).zip(layout.iter()) {
            let Some(column) = column else {
                if !raw.is_empty() {
                    record
                        .fields
                        .entry(name.to_string())
                        .or_insert_with(|| Value::String(raw.to_string()));
                }
                continue;
            };
            match column.kind {
                ColumnKind::TransactionNo => {
                    record.transaction_no = parse_transaction_no(raw).with_context(|| {
                        format!(
                            "invalid transaction number '{raw}' at row {} in {}",
                            line + 2,
                            origin.display()
                        )
                    })?;
                }
                ColumnKind::Mode => record.mode = raw.trim().to_string(),
                _ => {
                    if let Some(value) = decode_field(column, raw) {
                        record.fields.insert(column.header.to_string(), value);
                    }
                }
            }
        }
        out.push(record);
    }

    Ok((out, extra_columns))
}

pub fn write_records(
    path: &Path,
    records: &[TransactionRecord],
    extra_columns: &[String],
) -> Result<()> {
    ensure_parent_directory(path)?;
    let include_derived = records.iter().any(has_derived_fields);
    let mut header: Vec<&str> = columns::header(include_derived);
    header.extend(extra_columns.iter().map(String::as_str));

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create ledger file {}", path.display()))?;
    writer
        .write_record(&header)
        .with_context(|| format!("failed to write ledger header {}", path.display()))?;

    for record in records {
        let cells = header
            .iter()
            .map(|name| match columns::find(name) {
                Some(column) => encode_cell(record, column),
                None => record.fields.get(*name).and_then(value_text),
            })
            .map(Option::unwrap_or_default)
            .collect::<Vec<String>>();
        writer.write_record(&cells).with_context(|| {
            format!(
                "failed to write ledger row {}/{} to {}",
                record.transaction_no,
                record.mode,
                path.display()
            )
        })?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush ledger file {}", path.display()))?;
    Ok(())
}

fn parse_transaction_no(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Ok(value);
    }

    let float = trimmed
        .parse::<f64>()
        .context("not a number")?;
    if float.fract() != 0.0 || float < 0.0 {
        bail!("not a whole number");
    }
    Ok(float as u64)
}
