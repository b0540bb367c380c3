//! Batch partitioning and bounded-concurrency classification.

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::models::ClassificationResult;
use crate::services::classifier::RelevanceClassifier;
use crate::utils::log::Logger;

/// Splits texts into fixed-size batches and classifies them with at most
/// `concurrency` requests in flight.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    concurrency: usize,
    logger: Logger,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, concurrency: usize, logger: Logger) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            logger,
        }
    }

    /// Classify every text; output has the same length and order as `texts`.
    pub async fn analyze_all(
        &self,
        classifier: &RelevanceClassifier,
        texts: &[String],
        keyword: &str,
    ) -> Vec<ClassificationResult> {
        if texts.is_empty() {
            return Vec::new();
        }

        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        self.logger.info(&format!(
            "Classifying {} texts in {} batches (concurrency {})",
            texts.len(),
            batches.len(),
            self.concurrency
        ));

        let semaphore = Semaphore::new(self.concurrency);
        let tasks = batches.into_iter().map(|batch| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let mut results = classifier.classify(batch, keyword).await;
                results.resize(batch.len(), ClassificationResult::zero());
                results
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }
}
