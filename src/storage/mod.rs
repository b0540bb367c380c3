//! Storage abstractions for crawl datasets.
//!
//! Every pipeline stage persists its own snapshot keyed by the run id
//! (the attraction id), so any stage can be re-run from disk.
//!
//! ## Directory Structure
//!
//! ```text
//! {data_dir}/
//! ├── {id}.json             # Raw search results
//! ├── {id}_analyzed.json    # Classified rows + recorded keyword
//! ├── {id}_filtered.json    # Relevant subset from analysis
//! ├── {id}_relevant.json    # Relevant subset with crawl status
//! └── {id}_details.json     # Detail store (append/merge only)
//! {results_dir}/
//! ├── batch_results_{YYYYMMDD}.json
//! └── attraction_stats_{YYYYMMDD}.json
//! {error_dir}/
//! └── {note_id}_{kind}_{timestamp}.txt
//! ```

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AttractionStats, BatchRecord, ClassifiedNote, DetailRecord, Note};

// Re-export for convenience
pub use local::LocalStorage;

/// Classified dataset with the keyword it was analysed for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedData {
    pub keyword: String,
    /// ISO 8601 timestamp of last update
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub rows: Vec<ClassifiedNote>,
}

impl ClassifiedData {
    pub fn new(keyword: impl Into<String>, rows: Vec<ClassifiedNote>) -> Self {
        Self {
            keyword: keyword.into(),
            updated_at: Utc::now(),
            count: rows.len(),
            rows,
        }
    }
}

/// Files written for one classification pass.
#[derive(Debug, Clone)]
pub struct ClassifiedPaths {
    /// Full classified dataset
    pub analyzed: PathBuf,
    /// `is_relevant` subset
    pub filtered: PathBuf,
}

/// Trait for dataset storage backends.
#[async_trait]
pub trait DatasetStorage: Send + Sync {
    /// Persist raw search results.
    async fn write_raw(&self, run_id: &str, notes: &[Note]) -> Result<PathBuf>;

    /// Load raw search results; empty when none were persisted.
    async fn load_raw(&self, run_id: &str) -> Result<Vec<Note>>;

    /// Most recently updated classified dataset recorded for `keyword`.
    async fn find_classified(&self, keyword: &str) -> Result<Option<ClassifiedData>>;

    /// Every classified dataset, paired with its run id.
    async fn classified_datasets(&self) -> Result<Vec<(String, ClassifiedData)>>;

    /// Persist the full classified dataset and its relevant subset.
    async fn write_classified(
        &self,
        run_id: &str,
        keyword: &str,
        rows: &[ClassifiedNote],
    ) -> Result<ClassifiedPaths>;

    async fn load_classified(&self, run_id: &str) -> Result<Option<ClassifiedData>>;

    /// Rewrite the relevant subset with crawl-status markings.
    async fn write_relevant(&self, run_id: &str, rows: &[ClassifiedNote]) -> Result<PathBuf>;

    /// Load the detail store; empty when none exists.
    async fn load_details(&self, run_id: &str) -> Result<Vec<DetailRecord>>;

    /// Merge records into the detail store by id (incoming wins) and return
    /// the resulting store size.
    async fn append_details(&self, run_id: &str, records: &[DetailRecord]) -> Result<usize>;

    fn details_path(&self, run_id: &str) -> PathBuf;

    /// Keep a malformed response payload for offline inspection.
    async fn save_error_payload(&self, note_id: &str, kind: &str, raw: &str) -> Result<PathBuf>;

    /// Replace the cumulative batch results for a day.
    async fn write_batch_results(&self, date: &str, records: &[BatchRecord]) -> Result<PathBuf>;

    async fn write_attraction_stats(&self, date: &str, stats: &[AttractionStats]) -> Result<PathBuf>;
}
