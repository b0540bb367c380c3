// src/services/relevance.rs

//! Cache-aware relevance analysis.
//!
//! Rows already classified for the same keyword in an earlier run are reused
//! and only unseen notes reach the classifier. The merged dataset is then
//! persisted as the run's `_analyzed` and `_filtered` views.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ClassifiedNote, ClassifierConfig, Note};
use crate::services::classifier::RelevanceClassifier;
use crate::services::scheduler::BatchScheduler;
use crate::storage::{ClassifiedPaths, DatasetStorage};
use crate::utils::log::Logger;

/// Result of one analysis pass.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Merged classified rows, as persisted
    pub rows: Vec<ClassifiedNote>,
    pub paths: ClassifiedPaths,
    /// Rows sent to the classifier in this pass
    pub classified_count: usize,
    /// Rows reused from a prior dataset
    pub cached_count: usize,
}

impl AnalysisOutcome {
    pub fn relevant(&self) -> Vec<ClassifiedNote> {
        self.rows.iter().filter(|r| r.is_relevant()).cloned().collect()
    }
}

/// Relevance analyzer with keyword-level result reuse.
#[derive(Clone)]
pub struct RelevanceAnalyzer {
    classifier: RelevanceClassifier,
    scheduler: BatchScheduler,
    storage: Arc<dyn DatasetStorage>,
    threshold: f64,
    logger: Logger,
}

impl RelevanceAnalyzer {
    pub fn new(
        classifier: RelevanceClassifier,
        storage: Arc<dyn DatasetStorage>,
        config: &ClassifierConfig,
        logger: Logger,
    ) -> Self {
        Self {
            classifier,
            scheduler: BatchScheduler::new(config.batch_size, config.max_concurrent, logger.clone()),
            storage,
            threshold: config.threshold,
            logger,
        }
    }

    pub async fn analyze(&self, run_id: &str, notes: &[Note], keyword: &str) -> Result<AnalysisOutcome> {
        let cached = self.cached_rows(keyword).await;
        let known: HashSet<&str> = cached.iter().map(|r| r.id()).collect();

        let mut seen = HashSet::new();
        let fresh_notes: Vec<&Note> = notes
            .iter()
            .filter(|n| !known.contains(n.id.as_str()))
            .filter(|n| seen.insert(n.id.as_str()))
            .collect();

        let cached_count = cached.len();
        let classified_count = fresh_notes.len();

        let rows = if fresh_notes.is_empty() {
            self.logger.info(&format!(
                "All {} notes already classified for '{}', skipping classification",
                notes.len(),
                keyword
            ));
            cached
        } else {
            self.logger.info(&format!(
                "Classifying {} new notes ({} reused) for '{}'",
                classified_count, cached_count, keyword
            ));
            let texts: Vec<String> = fresh_notes.iter().map(|n| n.analysis_text()).collect();
            let results = self
                .scheduler
                .analyze_all(&self.classifier, &texts, keyword)
                .await;

            let fresh = fresh_notes
                .into_iter()
                .zip(results)
                .map(|(note, result)| ClassifiedNote::new(note.clone(), result, self.threshold))
                .collect();
            merge_classified(cached, fresh)
        };

        let paths = self.storage.write_classified(run_id, keyword, &rows).await?;
        let relevant = rows.iter().filter(|r| r.is_relevant()).count();
        self.logger.success(&format!(
            "Analysis saved: {} rows, {} relevant ({})",
            rows.len(),
            relevant,
            paths.analyzed.display()
        ));

        Ok(AnalysisOutcome {
            rows,
            paths,
            classified_count,
            cached_count,
        })
    }

    /// Prior rows for `keyword`, re-thresholded; lookup failures mean no cache.
    async fn cached_rows(&self, keyword: &str) -> Vec<ClassifiedNote> {
        match self.storage.find_classified(keyword).await {
            Ok(Some(data)) => {
                self.logger.info(&format!(
                    "Found {} previously classified rows for '{}'",
                    data.rows.len(),
                    keyword
                ));
                data.rows
                    .into_iter()
                    .map(|mut row| {
                        row.apply_threshold(self.threshold);
                        row
                    })
                    .collect()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                self.logger
                    .warn(&format!("Classification cache lookup failed: {}", e));
                Vec::new()
            }
        }
    }
}

/// Concatenate `cached` and `fresh`, keeping only the last row for each id.
pub fn merge_classified(cached: Vec<ClassifiedNote>, fresh: Vec<ClassifiedNote>) -> Vec<ClassifiedNote> {
    let combined: Vec<ClassifiedNote> = cached.into_iter().chain(fresh).collect();
    let last: HashMap<String, usize> = combined
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id().to_string(), i))
        .collect();

    combined
        .into_iter()
        .enumerate()
        .filter(|(i, r)| last.get(r.id()) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassificationResult;
    use crate::storage::LocalStorage;
    use crate::testing::MockCompletion;
    use tempfile::TempDir;

    fn row(id: &str, score: f64) -> ClassifiedNote {
        let note = Note {
            id: id.into(),
            ..Note::default()
        };
        ClassifiedNote::new(note, ClassificationResult::new(score, "x"), 25.0)
    }

    fn note(id: &str, title: &str) -> Note {
        Note {
            id: id.into(),
            title: title.into(),
            token: "t".into(),
            ..Note::default()
        }
    }

    fn analyzer(mock: Arc<MockCompletion>, storage: Arc<LocalStorage>, threshold: f64) -> RelevanceAnalyzer {
        let config = ClassifierConfig {
            retry_delay_secs: 0,
            threshold,
            ..ClassifierConfig::default()
        };
        let classifier = RelevanceClassifier::new(mock, &config, Logger::silent());
        RelevanceAnalyzer::new(classifier, storage, &config, Logger::silent())
    }

    #[test]
    fn test_merge_newest_wins() {
        let merged = merge_classified(vec![row("x", 10.0), row("y", 50.0)], vec![row("x", 90.0)]);
        assert_eq!(merged.len(), 2);
        let x = merged.iter().find(|r| r.id() == "x").unwrap();
        assert_eq!(x.relevance_score(), 90.0);
        assert!(x.is_relevant());
    }

    #[tokio::test]
    async fn test_only_new_notes_are_classified() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        storage
            .write_classified("old", "西湖", &[row("a", 80.0)])
            .await
            .unwrap();

        let mock = Arc::new(MockCompletion::scripted(vec![Ok(
            r#"[{"relevance":"40%","explanation":"ok"}]"#.into(),
        )]));
        let outcome = analyzer(mock.clone(), storage.clone(), 25.0)
            .analyze("1001", &[note("a", "A"), note("b", "B")], "西湖")
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 1);
        assert!(mock.prompts()[0].contains("1. 标题: B"));
        assert!(!mock.prompts()[0].contains("标题: A"));
        assert_eq!(outcome.cached_count, 1);
        assert_eq!(outcome.classified_count, 1);
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.paths.filtered.exists());
    }

    #[tokio::test]
    async fn test_cached_rows_are_rethresholded() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        storage
            .write_classified("old", "西湖", &[row("a", 30.0)])
            .await
            .unwrap();

        let mock = Arc::new(MockCompletion::scripted(vec![]));
        let outcome = analyzer(mock.clone(), storage, 50.0)
            .analyze("1001", &[note("a", "A")], "西湖")
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 0);
        assert!(!outcome.rows[0].is_relevant());
        assert!(outcome.relevant().is_empty());
    }

    #[tokio::test]
    async fn test_other_keyword_cache_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        storage
            .write_classified("old", "灵隐寺", &[row("a", 80.0)])
            .await
            .unwrap();

        let mock = Arc::new(MockCompletion::echo_scores(70.0));
        let outcome = analyzer(mock.clone(), storage, 25.0)
            .analyze("1001", &[note("a", "A")], "西湖")
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 1);
        assert_eq!(outcome.rows[0].relevance_score(), 70.0);
    }
}
