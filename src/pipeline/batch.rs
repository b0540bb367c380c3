//! Multi-attraction batch runs with cumulative result snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::models::{AttractionEntry, BatchRecord};
use crate::services::AuthContext;
use crate::storage::DatasetStorage;
use crate::utils::format_duration;
use crate::utils::log::Logger;

use super::orchestrator::AttractionPipeline;

/// Runs the pipeline over many attractions, saving results after each one.
pub struct BatchRunner {
    pipeline: AttractionPipeline,
    storage: Arc<dyn DatasetStorage>,
    item_delay: Duration,
    logger: Logger,
}

impl BatchRunner {
    pub fn new(
        pipeline: AttractionPipeline,
        storage: Arc<dyn DatasetStorage>,
        item_delay: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            pipeline,
            storage,
            item_delay,
            logger,
        }
    }

    pub async fn run(&self, entries: &[AttractionEntry], auth: &AuthContext) -> Vec<BatchRecord> {
        let date = Local::now().format("%Y%m%d").to_string();
        let total = entries.len();
        let mut records = Vec::with_capacity(total);

        self.logger
            .header(&format!("Batch run: {} attractions", total));

        for (index, entry) in entries.iter().enumerate() {
            self.logger.step(
                index + 1,
                total,
                &format!("{} ({})", entry.keyword, entry.id),
            );

            let started = Instant::now();
            let process_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let report = self.pipeline.run(&entry.keyword, &entry.id, auth).await;

            records.push(BatchRecord {
                report,
                process_time,
                duration: format_duration(started.elapsed()),
            });

            match self.storage.write_batch_results(&date, &records).await {
                Ok(path) => self
                    .logger
                    .sub_item(&format!("Batch results saved to {}", path.display())),
                Err(e) => self
                    .logger
                    .error(&format!("Could not save batch results: {}", e)),
            }

            if index + 1 < total && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        let succeeded = records.iter().filter(|r| r.report.success).count();
        self.logger.summary(
            "Batch",
            &[
                ("attractions", total.to_string()),
                ("succeeded", succeeded.to_string()),
                ("failed", (total - succeeded).to_string()),
            ],
        );
        records
    }
}
