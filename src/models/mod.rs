// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! Search rows and their classification live in `note`, enriched detail in
//! `detail`, run outcomes and batch input in `run`,
//! per-attraction score summaries in `stats`.

mod config;
mod detail;
mod note;
mod run;
mod stats;

// Re-export all public types
pub use config::{
    BatchConfig, ClassifierConfig, Config, EnrichmentConfig, LoggingConfig, PathsConfig,
    PlatformConfig, SearchConfig,
};
pub use detail::DetailRecord;
pub use note::{ClassificationResult, ClassifiedNote, CrawlStatus, Note, is_relevant};
pub use run::{AttractionEntry, AttractionList, BatchRecord, RawAttraction, RunReport};
pub use stats::AttractionStats;
