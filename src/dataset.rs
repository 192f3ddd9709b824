use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::taxonomy::{SectionSet, normalize, render_sections};
use crate::util::{clean_cell_value, ensure_parent_directory};

pub const ORIGINAL_SECTIONS_COLUMN: &str = "Original Sections List";

#[derive(Clone, Debug)]
pub struct DatasetColumns {
    pub serial: String,
    pub po_description: String,
    pub line_description: String,
    pub gl_description: String,
    pub invoice_description: String,
    pub section: String,
}

impl Default for DatasetColumns {
    fn default() -> Self {
        Self {
            serial: "Sr No".to_string(),
            po_description: "PO Line Item Description".to_string(),
            line_description: "Line Description".to_string(),
            gl_description: "Expense GL Description".to_string(),
            invoice_description: "Invoice Description".to_string(),
            section: "Section as required in TDS Return".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionInput {
    pub transaction_no: u64,
    pub serial: String,
    pub po_description: String,
    pub line_description: String,
    pub gl_description: String,
    pub invoice_description: String,
    pub ground_truth: String,
}

impl TransactionInput {
    pub fn ground_truth_sections(&self) -> SectionSet {
        normalize(&self.ground_truth)
    }
}

pub fn load_transactions(path: &Path, columns: &DatasetColumns) -> Result<Vec<TransactionInput>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open dataset {}", path.display()))?;
    let transactions = read_transactions(file, columns)
        .with_context(|| format!("failed to load dataset {}", path.display()))?;

    info!(
        path = %path.display(),
        transactions = transactions.len(),
        "loaded labelled transactions"
    );
    Ok(transactions)
}

pub fn read_transactions(
    reader: impl std::io::Read,
    columns: &DatasetColumns,
) -> Result<Vec<TransactionInput>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers().context("failed to read header row")?.clone();

    let section_index = column_index(&headers, &columns.section)
        .with_context(|| format!("missing ground-truth column '{}'", columns.section))?;
    let optional = |name: &str| {
        let index = column_index(&headers, name);
        if index.is_none() {
            warn!(column = name, "dataset column missing, treating cells as empty");
        }
        index
    };
    let serial_index = optional(&columns.serial);
    let po_index = optional(&columns.po_description);
    let line_index = optional(&columns.line_description);
    let gl_index = optional(&columns.gl_description);
    let invoice_index = optional(&columns.invoice_description);

    let mut out = Vec::<TransactionInput>::new();
    for (position, row) in csv_reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to read dataset row {}", position + 2))?;
        let cell = |index: Option<usize>| {
            index
                .and_then(|index| row.get(index))
                .map(clean_cell_value)
                .unwrap_or_default()
        };

        out.push(TransactionInput {
            transaction_no: position as u64 + 1,
            serial: cell(serial_index),
            po_description: cell(po_index),
            line_description: cell(line_index),
            gl_description: cell(gl_index),
            invoice_description: cell(invoice_index),
            ground_truth: cell(Some(section_index)),
        });
    }

    Ok(out)
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AnnotationSummary {
    pub rows: usize,
    pub rows_with_sections: usize,
}

pub fn annotate_sections(input: &Path, output: &Path, column: &str) -> Result<AnnotationSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("failed to open {}", input.display()))?;

    let mut headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of {}", input.display()))?
        .clone();
    let Some(source_index) = column_index(&headers, column) else {
        bail!("column '{column}' not found in {}", input.display());
    };
    if column_index(&headers, ORIGINAL_SECTIONS_COLUMN).is_some() {
        bail!(
            "{} already has a '{ORIGINAL_SECTIONS_COLUMN}' column",
            input.display()
        );
    }
    headers.push_field(ORIGINAL_SECTIONS_COLUMN);

    ensure_parent_directory(output)?;
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    writer
        .write_record(&headers)
        .with_context(|| format!("failed to write header row to {}", output.display()))?;

    let mut summary = AnnotationSummary::default();
    for (position, row) in reader.records().enumerate() {
        let mut row = row.with_context(|| {
            format!("failed to read row {} of {}", position + 2, input.display())
        })?;
        let sections = row.get(source_index).map(normalize).unwrap_or_default();

        summary.rows += 1;
        if !sections.is_empty() {
            summary.rows_with_sections += 1;
        }

        row.push_field(&render_sections(&sections));
        writer
            .write_record(&row)
            .with_context(|| format!("failed to write row {} to {}", position + 2, output.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;
    Ok(summary)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| clean_cell_value(header) == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{SectionCode, SectionSet};

    const SHEET: &str = "Sr No,PO Line Item Description,Line Description,Expense GL Description,Invoice Description,Section as required in TDS Return\n\
        101,Transport of goods\u{a0},Freight,Freight Outward,INV-1, 194C \n\
        102,Laptops,,IT Hardware,INV-2,No TDS\n";

    #[test]
    fn read_transactions_cleans_cells_and_numbers_rows() {
        let transactions = read_transactions(SHEET.as_bytes(), &DatasetColumns::default())
            .expect("sheet should parse");

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].transaction_no, 1);
        assert_eq!(transactions[0].serial, "101");
        assert_eq!(transactions[0].po_description, "Transport of goods");
        assert_eq!(transactions[0].ground_truth, "194C");
        assert_eq!(transactions[1].transaction_no, 2);
        assert_eq!(transactions[1].line_description, "");
        assert_eq!(
            transactions[1].ground_truth_sections(),
            [SectionCode::NoTds].into_iter().collect::<SectionSet>()
        );
    }

    #[test]
    fn read_transactions_requires_the_ground_truth_column() {
        let error = read_transactions("Sr No,Line Description\n1,Rent\n".as_bytes(), &DatasetColumns::default())
            .expect_err("missing section column should fail");
        assert!(
            error.to_string().contains("Section as required in TDS Return"),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn annotate_sections_appends_normalized_column() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let input = dir.path().join("labels.csv");
        let output = dir.path().join("out").join("labels_with_sections.csv");
        std::fs::write(
            &input,
            "Transaction No,Original Answer\n1,194 C or 194-Q\n2,doubt\n",
        )
        .expect("fixture should be written");

        let summary = annotate_sections(&input, &output, "Original Answer")
            .expect("annotation should succeed");
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.rows_with_sections, 1);

        let written = std::fs::read_to_string(&output).expect("output should exist");
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Transaction No,Original Answer,Original Sections List");
        assert_eq!(lines[1], "1,194 C or 194-Q,\"194C, 194Q\"");
        assert_eq!(lines[2], "2,doubt,");
    }

    #[test]
    fn annotate_sections_rejects_unknown_column() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let input = dir.path().join("labels.csv");
        std::fs::write(&input, "A,B\n1,2\n").expect("fixture should be written");

        let error = annotate_sections(&input, &dir.path().join("out.csv"), "Original Answer")
            .expect_err("unknown column should fail");
        assert!(error.to_string().contains("Original Answer"), "unexpected error: {error}");
    }
}
