use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluate::MatchOutcome;
use crate::taxonomy::sections_to_value;

use super::columns::{MATCH, ORIGINAL_ANSWER, ORIGINAL_SECTIONS_LIST, RETRIEVED_SECTION, RETRIEVED_SECTIONS_LIST};

pub type FieldMap = BTreeMap<String, Value>;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordKey {
    pub transaction_no: u64,
    pub mode: String,
}

impl RecordKey {
    pub fn new(transaction_no: u64, mode: impl Into<String>) -> Self {
        Self {
            transaction_no,
            mode: mode.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transaction_no, self.mode)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_no: u64,
    pub mode: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl TransactionRecord {
    pub fn new(transaction_no: u64, mode: impl Into<String>) -> Self {
        Self {
            transaction_no,
            mode: mode.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.transaction_no, self.mode.clone())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn retrieved_section(&self) -> Option<&str> {
        self.text(RETRIEVED_SECTION)
    }

    pub fn original_answer(&self) -> Option<&str> {
        self.text(ORIGINAL_ANSWER)
    }

    pub fn match_flag(&self) -> Option<bool> {
        self.fields.get(MATCH).and_then(Value::as_bool)
    }

    pub fn merge_fields(&mut self, fields: FieldMap) {
        self.fields.extend(fields);
    }

    pub fn apply_outcome(&mut self, outcome: &MatchOutcome) {
        self.fields.extend(outcome_fields(outcome));
    }
}

pub fn outcome_fields(outcome: &MatchOutcome) -> FieldMap {
    FieldMap::from([
        (
            RETRIEVED_SECTIONS_LIST.to_string(),
            sections_to_value(&outcome.predicted),
        ),
        (
            ORIGINAL_SECTIONS_LIST.to_string(),
            sections_to_value(&outcome.ground_truth),
        ),
        (MATCH.to_string(), Value::Bool(outcome.is_match)),
    ])
}
