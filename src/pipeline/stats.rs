// src/pipeline/stats.rs

//! Relevance statistics across every classified attraction dataset.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::error::Result;
use crate::models::AttractionStats;
use crate::storage::{ClassifiedData, DatasetStorage};
use crate::utils::log::Logger;

/// Summarise each dataset's scores, sorted by row count (largest first) and
/// ranked by mean score.
pub fn attraction_stats(datasets: &[(String, ClassifiedData)]) -> Vec<AttractionStats> {
    let mut stats: Vec<AttractionStats> = datasets
        .iter()
        .filter_map(|(run_id, data)| {
            let scores: Vec<f64> = data.rows.iter().map(|r| r.relevance_score()).collect();
            AttractionStats::from_scores(run_id.as_str(), data.keyword.as_str(), &scores)
        })
        .collect();

    let means: Vec<f64> = stats.iter().map(|s| s.mean).collect();
    for entry in &mut stats {
        entry.mean_rank = 1 + means.iter().filter(|m| **m > entry.mean).count();
    }

    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.attraction_id.cmp(&b.attraction_id))
    });
    stats
}

/// Builds and persists the statistics report.
pub struct StatsReporter {
    storage: Arc<dyn DatasetStorage>,
    logger: Logger,
}

impl StatsReporter {
    pub fn new(storage: Arc<dyn DatasetStorage>, logger: Logger) -> Self {
        Self { storage, logger }
    }

    pub async fn run(&self) -> Result<(Vec<AttractionStats>, PathBuf)> {
        let datasets = self.storage.classified_datasets().await?;
        self.logger
            .info(&format!("Summarising {} classified datasets", datasets.len()));

        let stats = attraction_stats(&datasets);
        for entry in &stats {
            self.logger.sub_item(&format!(
                "{} ({}): {} rows, mean {:.1}, rank {}, planned {}",
                entry.attraction_id,
                entry.keyword,
                entry.count,
                entry.mean,
                entry.mean_rank,
                entry.planned_volume
            ));
        }

        let date = Local::now().format("%Y%m%d").to_string();
        let path = self.storage.write_attraction_stats(&date, &stats).await?;

        self.logger.summary(
            "Attraction statistics",
            &[
                ("attractions", stats.len().to_string()),
                ("rows", stats.iter().map(|s| s.count).sum::<usize>().to_string()),
                (
                    "planned volume",
                    stats.iter().map(|s| s.planned_volume).sum::<u64>().to_string(),
                ),
                ("file", path.display().to_string()),
            ],
        );
        Ok((stats, path))
    }
}
