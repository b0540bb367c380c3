// src/pipeline/orchestrator.rs

//! Search → classify → enrich for one attraction.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, RunReport};
use crate::services::{
    AuthContext, CompletionService, DetailFetcher, NoteSource, RelevanceAnalyzer,
    RelevanceClassifier,
};
use crate::storage::DatasetStorage;
use crate::utils::log::Logger;

use super::enrich::Enricher;
use super::search::NoteSearcher;

const TOTAL_STEPS: usize = 3;

/// Full pipeline for one (keyword, attraction id) pair.
#[derive(Clone)]
pub struct AttractionPipeline {
    searcher: NoteSearcher,
    analyzer: RelevanceAnalyzer,
    enricher: Enricher,
    storage: Arc<dyn DatasetStorage>,
    logger: Logger,
}

impl AttractionPipeline {
    pub fn new(
        config: &Config,
        source: Arc<dyn NoteSource>,
        completion: Arc<dyn CompletionService>,
        storage: Arc<dyn DatasetStorage>,
        logger: Logger,
    ) -> Self {
        let searcher = NoteSearcher::new(
            source.clone(),
            config.search.clone(),
            config.platform.explore_url.clone(),
            logger.clone(),
        );
        let classifier = RelevanceClassifier::new(completion, &config.classifier, logger.clone());
        let analyzer = RelevanceAnalyzer::new(
            classifier,
            storage.clone(),
            &config.classifier,
            logger.clone(),
        );
        let fetcher = DetailFetcher::new(source, storage.clone(), logger.clone());
        let enricher = Enricher::new(
            fetcher,
            storage.clone(),
            config.enrichment.clone(),
            logger.clone(),
        );

        Self {
            searcher,
            analyzer,
            enricher,
            storage,
            logger,
        }
    }

    /// Run every stage. Failures are reported in the returned [`RunReport`].
    pub async fn run(&self, keyword: &str, attraction_id: &str, auth: &AuthContext) -> RunReport {
        self.logger
            .header(&format!("Attraction '{}' ({})", keyword, attraction_id));

        let mut report = RunReport::new(keyword, attraction_id);
        match self.run_stages(&mut report, auth).await {
            Ok(()) => {
                report.success = true;
                self.logger.success(&format!("Finished '{}'", keyword));
            }
            Err(e) => {
                self.logger
                    .error(&format!("Run for '{}' failed: {}", keyword, e));
                report.error = Some(e.to_string());
            }
        }

        self.logger.summary(
            keyword,
            &[
                ("notes", report.note_count.to_string()),
                ("relevant", report.relevant_count.to_string()),
                ("processed", report.processed_count.to_string()),
                ("success", report.success.to_string()),
            ],
        );
        report
    }

    async fn run_stages(&self, report: &mut RunReport, auth: &AuthContext) -> Result<()> {
        let keyword = report.keyword.clone();
        let run_id = report.attraction_id.clone();

        self.logger.step(1, TOTAL_STEPS, "Search");
        let notes = self.searcher.search_all(&keyword, &run_id, auth).await;
        report.note_count = notes.len();
        if notes.is_empty() {
            return Err(AppError::validation(format!("no notes found for '{}'", keyword)));
        }
        let raw = self.storage.write_raw(&run_id, &notes).await?;
        report.search_file = Some(raw.display().to_string());

        self.logger.step(2, TOTAL_STEPS, "Relevance analysis");
        let analysis = self.analyzer.analyze(&run_id, &notes, &keyword).await?;
        report.analyzed_file = Some(analysis.paths.analyzed.display().to_string());
        let relevant = analysis.relevant();
        report.relevant_count = relevant.len();

        self.logger.step(3, TOTAL_STEPS, "Detail enrichment");
        if relevant.is_empty() {
            self.logger
                .warn(&format!("No relevant notes for '{}', skipping enrichment", keyword));
            report.processed_count = self.storage.load_details(&run_id).await?.len();
            if report.processed_count > 0 {
                report.detail_file = Some(self.storage.details_path(&run_id).display().to_string());
            }
            return Ok(());
        }

        let summary = self.enricher.enrich(&run_id, relevant, auth).await?;
        report.processed_count = summary.store_size;
        report.detail_file = Some(summary.detail_file.display().to_string());
        Ok(())
    }
}
