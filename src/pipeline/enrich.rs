// src/pipeline/enrich.rs

//! Detail enrichment loop.
//!
//! Walks the relevant notes newest first. Each note is resolved from the
//! persisted detail store when possible, otherwise fetched. Records are
//! appended to the store every `batch_size` notes, and the loop stops once
//! `stale_limit` consecutive notes predate the cutoff. A failed increment
//! stays pending and is retried by the next flush; only the final flush
//! after the loop can fail the pass.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ClassifiedNote, CrawlStatus, DetailRecord, EnrichmentConfig};
use crate::services::{AuthContext, DetailFetcher};
use crate::storage::DatasetStorage;
use crate::utils::log::Logger;

/// Counters for one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSummary {
    /// Notes fetched from the platform in this pass
    pub fetched: usize,
    /// Notes resolved from the detail store
    pub cached: usize,
    pub failed: usize,
    /// Notes without id or token
    pub skipped: usize,
    /// Notes left unprocessed by the early stop
    pub unnecessary: usize,
    pub stopped_early: bool,
    /// Detail store size after the pass
    pub store_size: usize,
    pub detail_file: PathBuf,
}

/// Mutable state shared between the loop and the final flush.
struct LoopState {
    items: Vec<ClassifiedNote>,
    pending: Vec<DetailRecord>,
    consecutive_stale: usize,
    summary: EnrichmentSummary,
}

/// Cache-aware, incrementally persisted detail enrichment.
#[derive(Clone)]
pub struct Enricher {
    fetcher: DetailFetcher,
    storage: Arc<dyn DatasetStorage>,
    config: EnrichmentConfig,
    logger: Logger,
}

impl Enricher {
    pub fn new(
        fetcher: DetailFetcher,
        storage: Arc<dyn DatasetStorage>,
        config: EnrichmentConfig,
        logger: Logger,
    ) -> Self {
        Self {
            fetcher,
            storage,
            config,
            logger,
        }
    }

    /// Enrich `relevant` for run `run_id`.
    pub async fn enrich(
        &self,
        run_id: &str,
        relevant: Vec<ClassifiedNote>,
        auth: &AuthContext,
    ) -> Result<EnrichmentSummary> {
        let existing: HashMap<String, DetailRecord> = self
            .storage
            .load_details(run_id)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut items = relevant;
        items.sort_by(|a, b| newest_first(a.note.published_at, b.note.published_at));
        self.storage.write_relevant(run_id, &items).await?;

        self.logger.info(&format!(
            "Enriching {} relevant notes ({} already in detail store)",
            items.len(),
            existing.len()
        ));

        let mut state = LoopState {
            items,
            pending: Vec::new(),
            consecutive_stale: 0,
            summary: EnrichmentSummary {
                store_size: existing.len(),
                detail_file: self.storage.details_path(run_id),
                ..EnrichmentSummary::default()
            },
        };

        self.process(run_id, &existing, &mut state, auth).await;
        let flushed = self.flush(run_id, &mut state).await;
        let marked = self.storage.write_relevant(run_id, &state.items).await;

        flushed?;
        marked?;

        let summary = state.summary;
        self.logger.summary(
            "Enrichment",
            &[
                ("fetched", summary.fetched.to_string()),
                ("cached", summary.cached.to_string()),
                ("failed", summary.failed.to_string()),
                ("skipped", summary.skipped.to_string()),
                ("unnecessary", summary.unnecessary.to_string()),
                ("detail store", summary.store_size.to_string()),
            ],
        );
        Ok(summary)
    }

    async fn process(
        &self,
        run_id: &str,
        existing: &HashMap<String, DetailRecord>,
        state: &mut LoopState,
        auth: &AuthContext,
    ) {
        let total = state.items.len();
        let cutoff = self.config.cutoff_millis();

        for index in 0..total {
            let item = state.items[index].clone();
            let id = item.id().to_string();

            if !item.note.has_fetch_keys() {
                self.logger
                    .warn(&format!("Note {} has no id or token, skipping", index + 1));
                state.summary.skipped += 1;
                continue;
            }

            let published_at = match existing.get(&id) {
                Some(stored) => {
                    let mut record = stored.clone();
                    record.backfill(&item);
                    record.crawl_status = Some(CrawlStatus::Cached);
                    let published_at = record.published_at;
                    mark(state, index, CrawlStatus::Cached, published_at);
                    state.pending.push(record);
                    state.summary.cached += 1;
                    self.logger
                        .debug(&format!("[{}/{}] {} cached", index + 1, total, id));
                    published_at
                }
                None => match self.fetcher.fetch(&item.note, auth).await {
                    Ok(mut record) => {
                        record.backfill(&item);
                        record.crawl_status = Some(CrawlStatus::Success);
                        let published_at = record.published_at;
                        mark(state, index, CrawlStatus::Success, published_at);
                        state.pending.push(record);
                        state.summary.fetched += 1;
                        self.logger
                            .sub_item(&format!("[{}/{}] {} fetched", index + 1, total, id));
                        published_at
                    }
                    Err(e) => {
                        self.logger
                            .warn(&format!("[{}/{}] {} failed: {}", index + 1, total, id, e));
                        mark(state, index, CrawlStatus::Failed, None);
                        state.summary.failed += 1;
                        item.note.published_at
                    }
                },
            };

            if state.pending.len() >= self.config.batch_size.max(1) {
                self.try_flush(run_id, state).await;
            }

            if let Some(ts) = published_at {
                if ts < cutoff {
                    state.consecutive_stale += 1;
                    self.logger.info(&format!(
                        "Note {} predates cutoff, consecutive stale: {}",
                        id, state.consecutive_stale
                    ));
                } else {
                    state.consecutive_stale = 0;
                }
            }

            if state.consecutive_stale >= self.config.stale_limit.max(1) {
                let remaining = &mut state.items[index + 1..];
                for rest in remaining.iter_mut() {
                    rest.note.crawl_status = Some(CrawlStatus::Unnecessary);
                }
                state.summary.unnecessary = remaining.len();
                state.summary.stopped_early = true;
                self.logger.warn(&format!(
                    "{} consecutive stale notes, marking {} remaining as unnecessary",
                    state.consecutive_stale,
                    remaining.len()
                ));
                self.try_flush(run_id, state).await;
                if let Err(e) = self.storage.write_relevant(run_id, &state.items).await {
                    self.logger
                        .error(&format!("Could not save crawl status markings: {}", e));
                }
                break;
            }

            if index + 1 < total {
                tokio::time::sleep(self.config.request_delay()).await;
            }
        }
    }

    /// Flush inside the loop; on failure the records stay pending for the next flush.
    async fn try_flush(&self, run_id: &str, state: &mut LoopState) {
        if let Err(e) = self.flush(run_id, state).await {
            self.logger.error(&format!(
                "Could not save {} detail records, keeping them pending: {}",
                state.pending.len(),
                e
            ));
        }
    }

    async fn flush(&self, run_id: &str, state: &mut LoopState) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let size = self.storage.append_details(run_id, &state.pending).await?;
        self.logger.info(&format!(
            "Saved {} detail records (store size {})",
            state.pending.len(),
            size
        ));
        state.pending.clear();
        state.summary.store_size = size;
        Ok(())
    }
}

/// Record a note's outcome and its resolved publish time.
fn mark(state: &mut LoopState, index: usize, status: CrawlStatus, published_at: Option<i64>) {
    let note = &mut state.items[index].note;
    note.crawl_status = Some(status);
    if published_at.is_some() {
        note.published_at = published_at;
    }
}

/// Descending by publish time, unknown times last.
fn newest_first(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
