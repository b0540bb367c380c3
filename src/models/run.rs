//! Run reports and batch input.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of one keyword run, returned to every caller of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub keyword: String,
    pub attraction_id: String,
    pub success: bool,
    pub note_count: usize,
    pub relevant_count: usize,
    pub processed_count: usize,
    pub search_file: Option<String>,
    pub analyzed_file: Option<String>,
    pub detail_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(keyword: impl Into<String>, attraction_id: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            attraction_id: attraction_id.into(),
            ..Self::default()
        }
    }
}

/// A run report annotated with timing, as persisted by the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(flatten)]
    pub report: RunReport,
    pub process_time: String,
    pub duration: String,
}

/// One attraction to process in a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttractionEntry {
    pub keyword: String,
    pub id: String,
}

/// Batch input file:
///
/// ```toml
/// [[attractions]]
/// keyword = "West Lake"
/// id = 1001
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct AttractionList {
    #[serde(default)]
    pub attractions: Vec<RawAttraction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttraction {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub id: Option<toml::Value>,
}

impl AttractionList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Valid entries, plus a description of each rejected row.
    pub fn entries(&self) -> (Vec<AttractionEntry>, Vec<String>) {
        let mut entries = Vec::new();
        let mut rejected = Vec::new();

        for (index, raw) in self.attractions.iter().enumerate() {
            let keyword = raw.keyword.as_deref().map(str::trim).unwrap_or("");
            let id = raw.id.as_ref().and_then(normalize_id);

            match id {
                Some(id) if !keyword.is_empty() => entries.push(AttractionEntry {
                    keyword: keyword.to_string(),
                    id,
                }),
                _ => rejected.push(format!(
                    "row {} is missing a keyword or id: {:?}",
                    index + 1,
                    raw
                )),
            }
        }

        (entries, rejected)
    }
}

/// Render an id as an integer-looking string where possible ("1001.0" -> "1001").
fn normalize_id(value: &toml::Value) -> Option<String> {
    let id = match value {
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) if f.is_finite() => format!("{}", f.trunc() as i64),
        toml::Value::String(s) => {
            let s = s.trim();
            match s.split_once('.') {
                Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole.to_string(),
                _ => s.to_string(),
            }
        }
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}
