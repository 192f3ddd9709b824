use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NO_TDS_TOKEN: &str = "NOTDS";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum SectionCode {
    #[serde(rename = "194C")]
    S194C,
    #[serde(rename = "194JA")]
    S194JA,
    #[serde(rename = "194JB")]
    S194JB,
    #[serde(rename = "194Q")]
    S194Q,
    #[serde(rename = "194A")]
    S194A,
    #[serde(rename = "194IA")]
    S194IA,
    #[serde(rename = "194IB")]
    S194IB,
    #[serde(rename = "194H")]
    S194H,
    #[serde(rename = "No TDS")]
    NoTds,
}

impl SectionCode {
    pub const ALL: [SectionCode; 9] = [
        Self::S194C,
        Self::S194JA,
        Self::S194JB,
        Self::S194Q,
        Self::S194A,
        Self::S194IA,
        Self::S194IB,
        Self::S194H,
        Self::NoTds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S194C => "194C",
            Self::S194JA => "194JA",
            Self::S194JB => "194JB",
            Self::S194Q => "194Q",
            Self::S194A => "194A",
            Self::S194IA => "194IA",
            Self::S194IB => "194IB",
            Self::S194H => "194H",
            Self::NoTds => "No TDS",
        }
    }

    pub fn collapsed_token(self) -> &'static str {
        match self {
            Self::NoTds => NO_TDS_TOKEN,
            other => other.as_str(),
        }
    }
}

impl fmt::Display for SectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionCode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let collapsed = collapse(value);
        match SectionCode::ALL
            .into_iter()
            .find(|code| code.collapsed_token() == collapsed)
        {
            Some(code) => Ok(code),
            None => bail!("unknown TDS section: {value}"),
        }
    }
}

pub type SectionSet = BTreeSet<SectionCode>;

pub fn collapse(text: &str) -> String {
    text.chars()
        .filter(|character| character.is_ascii_alphanumeric())
        .map(|character| character.to_ascii_uppercase())
        .collect()
}

pub fn normalize(text: &str) -> SectionSet {
    let collapsed = collapse(text);
    if collapsed.is_empty() {
        return SectionSet::new();
    }

    SectionCode::ALL
        .into_iter()
        .filter(|code| collapsed.contains(code.collapsed_token()))
        .collect()
}

pub fn normalize_value(value: &Value) -> SectionSet {
    match value {
        Value::String(text) => normalize(text),
        _ => SectionSet::new(),
    }
}

pub fn normalize_opt(text: Option<&str>) -> SectionSet {
    text.map(normalize).unwrap_or_default()
}

pub fn render_sections(sections: &SectionSet) -> String {
    sections
        .iter()
        .map(|code| code.as_str())
        .collect::<Vec<&str>>()
        .join(", ")
}

pub fn sections_to_value(sections: &SectionSet) -> Value {
    Value::Array(
        sections
            .iter()
            .map(|code| Value::String(code.as_str().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(codes: &[SectionCode]) -> SectionSet {
        codes.iter().copied().collect()
    }

    #[test]
    fn every_code_survives_spacing_and_case_variants() {
        for code in SectionCode::ALL {
            let spaced = format!("Section {}", code.as_str());
            assert!(
                normalize(&spaced).contains(&code),
                "missing {code} in {spaced}"
            );

            let squashed = format!("section{}", code.as_str().to_lowercase());
            assert!(
                normalize(&squashed).contains(&code),
                "missing {code} in {squashed}"
            );
        }
    }

    #[test]
    fn punctuation_inside_a_code_is_ignored() {
        assert_eq!(normalize("Section 194-C"), set(&[SectionCode::S194C]));
        assert_eq!(normalize("194 c."), set(&[SectionCode::S194C]));
        assert_eq!(normalize("u/s 194 J(b)"), set(&[SectionCode::S194JB]));
    }

    #[test]
    fn no_tds_spellings_map_to_the_same_code() {
        assert_eq!(normalize("no tds"), set(&[SectionCode::NoTds]));
        assert_eq!(normalize("NO-TDS"), set(&[SectionCode::NoTds]));
        assert_eq!(normalize("No TDS applicable"), set(&[SectionCode::NoTds]));
    }

    #[test]
    fn multiple_sections_are_all_reported() {
        let sections = normalize("Section 1: 194C, Section 2: 194Q");
        assert_eq!(sections, set(&[SectionCode::S194C, SectionCode::S194Q]));
        assert_eq!(render_sections(&sections), "194C, 194Q");
    }

    #[test]
    fn unrecognized_and_non_text_inputs_are_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize("professional fees").is_empty());
        assert!(normalize_opt(None).is_empty());
        assert!(normalize_value(&Value::Null).is_empty());
        assert!(normalize_value(&serde_json::json!(194)).is_empty());
        assert!(normalize_value(&serde_json::json!(["194C"])).is_empty());
        assert_eq!(
            normalize_value(&serde_json::json!("194H")),
            set(&[SectionCode::S194H])
        );
    }

    #[test]
    fn taxonomy_tokens_do_not_contain_each_other() {
        for outer in SectionCode::ALL {
            for inner in SectionCode::ALL {
                if outer == inner {
                    continue;
                }
                assert!(
                    !outer.collapsed_token().contains(inner.collapsed_token()),
                    "{inner} would spuriously match inside {outer}"
                );
            }
        }
    }

    #[test]
    fn section_codes_parse_from_loose_spellings() {
        assert_eq!("194-ja".parse::<SectionCode>().ok(), Some(SectionCode::S194JA));
        assert_eq!("no tds".parse::<SectionCode>().ok(), Some(SectionCode::NoTds));
        assert!("194I".parse::<SectionCode>().is_err());
    }
}
