//! Pipeline entry points for crawler operations.
//!
//! - `NoteSearcher`: paginated keyword search
//! - `Enricher`: cache-aware detail enrichment with early stop
//! - `AttractionPipeline`: search, classify and enrich one attraction
//! - `BatchRunner`: drive the pipeline over many attractions
//! - `StatsReporter`: per-attraction relevance statistics

mod batch;
mod enrich;
mod orchestrator;
mod search;
mod stats;

pub use batch::BatchRunner;
pub use enrich::{Enricher, EnrichmentSummary};
pub use orchestrator::AttractionPipeline;
pub use search::NoteSearcher;
pub use stats::{StatsReporter, attraction_stats};
