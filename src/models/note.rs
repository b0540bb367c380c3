//! Note rows produced by search and relevance classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-note enrichment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    /// Detail fetched from the platform in this run
    Success,
    /// Detail reused from the persisted detail store
    Cached,
    /// Detail fetch failed; no record was created
    Failed,
    /// Skipped because enrichment stopped early on stale content
    Unnecessary,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Success => "success",
            CrawlStatus::Cached => "cached",
            CrawlStatus::Failed => "failed",
            CrawlStatus::Unnecessary => "unnecessary",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note found by keyword search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Platform note identifier
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// `normal` or `video`
    #[serde(default)]
    pub note_type: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub user_id: String,

    /// Like counter as displayed by the platform (may be abbreviated, e.g. "1.2万")
    #[serde(default)]
    pub like_count: String,

    /// `xsec_token` required to open the note detail page
    #[serde(default)]
    pub token: String,

    /// Keyword the note was searched under
    #[serde(default)]
    pub keyword: String,

    #[serde(default)]
    pub attraction_id: String,

    #[serde(default)]
    pub url: String,

    /// Publish time in epoch milliseconds, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_status: Option<CrawlStatus>,
}

impl Note {
    /// Text sent to the classifier for this note.
    pub fn analysis_text(&self) -> String {
        format!("标题: {}", self.title.trim())
    }

    /// Whether the note carries the identifiers needed for a detail fetch.
    pub fn has_fetch_keys(&self) -> bool {
        !self.id.trim().is_empty() && !self.token.trim().is_empty()
    }
}

/// Relevance verdict for a single text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub relevance_score: f64,
    pub explanation: String,
}

impl ClassificationResult {
    /// Build a result, clamping the score into 0..=100.
    pub fn new(relevance_score: f64, explanation: impl Into<String>) -> Self {
        let relevance_score = if relevance_score.is_finite() {
            relevance_score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            relevance_score,
            explanation: explanation.into(),
        }
    }

    /// Zero score with no explanation; used for failures and padding.
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when the result carries no information at all.
    pub fn is_blank(&self) -> bool {
        self.relevance_score == 0.0 && self.explanation.trim().is_empty()
    }
}

/// Relevance predicate shared by every classified row.
pub fn is_relevant(score: f64, threshold: f64) -> bool {
    score >= threshold
}

/// A note with its relevance classification attached.
///
/// `is_relevant` is only ever derived from the score, either at construction
/// or through [`ClassifiedNote::apply_threshold`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedNote {
    #[serde(flatten)]
    pub note: Note,
    relevance_score: f64,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    is_relevant: bool,
}

impl ClassifiedNote {
    pub fn new(note: Note, result: ClassificationResult, threshold: f64) -> Self {
        Self {
            note,
            is_relevant: is_relevant(result.relevance_score, threshold),
            relevance_score: result.relevance_score,
            explanation: result.explanation,
        }
    }

    pub fn id(&self) -> &str {
        &self.note.id
    }

    pub fn relevance_score(&self) -> f64 {
        self.relevance_score
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn is_relevant(&self) -> bool {
        self.is_relevant
    }

    /// Re-derive the relevance flag for a (possibly different) threshold.
    pub fn apply_threshold(&mut self, threshold: f64) {
        self.is_relevant = is_relevant(self.relevance_score, threshold);
    }
}
