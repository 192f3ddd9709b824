use serde_json::Value;

use super::record::TransactionRecord;

pub const TRANSACTION_NO: &str = "Transaction No";
pub const TRANSACTION_SUMMARY: &str = "Transaction summary";
pub const HIGH_LEVEL_KEYWORDS: &str = "High-Level Keywords";
pub const LOW_LEVEL_KEYWORDS: &str = "Low-Level Keywords";
pub const ENTITIES_RETRIEVED: &str = "Entities Retrieved";
pub const RELATIONS_RETRIEVED: &str = "Relations Retrieved";
pub const CHUNKS_RETRIEVED: &str = "Chunks Retrieved";
pub const FINAL_PROMPT: &str = "Final Prompt";
pub const MODE: &str = "Mode";
pub const RETRIEVED_SECTION: &str = "Retrieved Section";
pub const ORIGINAL_ANSWER: &str = "Original Answer";
pub const RETRIEVED_SECTIONS_LIST: &str = "Retrieved Sections List";
pub const ORIGINAL_SECTIONS_LIST: &str = "Original Sections List";
pub const MATCH: &str = "Match";

const LIST_SEPARATOR: &str = ", ";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    TransactionNo,
    Mode,
    Text,
    SectionList,
    Flag,
}

#[derive(Copy, Clone, Debug)]
pub struct Column {
    pub header: &'static str,
    pub sql_name: &'static str,
    pub kind: ColumnKind,
    pub derived: bool,
}

const fn column(header: &'static str, sql_name: &'static str, kind: ColumnKind) -> Column {
    Column {
        header,
        sql_name,
        kind,
        derived: false,
    }
}

const fn derived(header: &'static str, sql_name: &'static str, kind: ColumnKind) -> Column {
    Column {
        header,
        sql_name,
        kind,
        derived: true,
    }
}

pub const COLUMNS: [Column; 14] = [
    column(TRANSACTION_NO, "transaction_no", ColumnKind::TransactionNo),
    column(TRANSACTION_SUMMARY, "transaction_summary", ColumnKind::Text),
    column(HIGH_LEVEL_KEYWORDS, "high_level_keywords", ColumnKind::Text),
    column(LOW_LEVEL_KEYWORDS, "low_level_keywords", ColumnKind::Text),
    column(ENTITIES_RETRIEVED, "entities_retrieved", ColumnKind::Text),
    column(RELATIONS_RETRIEVED, "relations_retrieved", ColumnKind::Text),
    column(CHUNKS_RETRIEVED, "chunks_retrieved", ColumnKind::Text),
    column(FINAL_PROMPT, "final_prompt", ColumnKind::Text),
    column(MODE, "mode", ColumnKind::Mode),
    column(RETRIEVED_SECTION, "retrieved_section", ColumnKind::Text),
    column(ORIGINAL_ANSWER, "original_answer", ColumnKind::Text),
    derived(
        RETRIEVED_SECTIONS_LIST,
        "retrieved_sections_list",
        ColumnKind::SectionList,
    ),
    derived(
        ORIGINAL_SECTIONS_LIST,
        "original_sections_list",
        ColumnKind::SectionList,
    ),
    derived(MATCH, "is_match", ColumnKind::Flag),
];

pub fn find(header: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|column| column.header == header)
}

pub fn is_persisted_field(name: &str) -> bool {
    find(name).is_some_and(|column| {
        !matches!(column.kind, ColumnKind::TransactionNo | ColumnKind::Mode)
    })
}

pub fn header(include_derived: bool) -> Vec<&'static str> {
    COLUMNS
        .iter()
        .filter(|column| include_derived || !column.derived)
        .map(|column| column.header)
        .collect()
}

pub fn has_derived_fields(record: &TransactionRecord) -> bool {
    COLUMNS
        .iter()
        .filter(|column| column.derived)
        .any(|column| record.fields.contains_key(column.header))
}

pub fn encode_cell(record: &TransactionRecord, column: &Column) -> Option<String> {
    match column.kind {
        ColumnKind::TransactionNo => Some(record.transaction_no.to_string()),
        ColumnKind::Mode => Some(record.mode.clone()),
        _ => record.fields.get(column.header).and_then(value_text),
    }
}

pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<String>>()
                .join(LIST_SEPARATOR),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

pub fn decode_field(column: &Column, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match column.kind {
        ColumnKind::SectionList => Some(Value::Array(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        ColumnKind::Flag => parse_flag(trimmed).map(Value::Bool),
        _ => Some(Value::String(raw.to_string())),
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
