//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - Relevance classification (`RelevanceClassifier`, `ArkClient`)
//! - Batch scheduling (`BatchScheduler`)
//! - Cache-aware analysis (`RelevanceAnalyzer`)
//! - Platform access (`NoteSource`, `HttpNoteSource`, `CachingNoteSource`)
//! - Detail retrieval (`DetailFetcher`)

pub mod classifier;
mod detail;
pub mod prompts;
mod relevance;
mod scheduler;
pub mod source;

pub use classifier::{ArkClient, CompletionService, RelevanceClassifier};
pub use detail::DetailFetcher;
pub use relevance::{AnalysisOutcome, RelevanceAnalyzer, merge_classified};
pub use scheduler::BatchScheduler;
pub use source::{
    AuthContext, CachingNoteSource, DetailCache, HttpNoteSource, MemoryCache, NoteSource,
    SearchPage,
};
