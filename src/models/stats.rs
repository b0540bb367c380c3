//! Per-attraction relevance statistics.

use serde::{Deserialize, Serialize};

/// Relevance score summary for one attraction's classified dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractionStats {
    pub attraction_id: String,
    pub keyword: String,
    /// Classified rows
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    /// Sample standard deviation; absent below two rows
    pub std_dev: Option<f64>,
    /// 1-based rank by mean, ties share the best rank
    pub mean_rank: usize,
    /// Notes worth a full crawl: `count * mean / 10`, rounded half to even
    pub planned_volume: u64,
}

impl AttractionStats {
    /// Summarise `scores`; `None` when there are none. `mean_rank` is left at 0.
    pub fn from_scores(
        attraction_id: impl Into<String>,
        keyword: impl Into<String>,
        scores: &[f64],
    ) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };
        let std_dev = (count > 1).then(|| {
            let variance =
                sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });

        Some(Self {
            attraction_id: attraction_id.into(),
            keyword: keyword.into(),
            count,
            mean,
            median,
            max: sorted[count - 1],
            min: sorted[0],
            std_dev,
            mean_rank: 0,
            planned_volume: (count as f64 * mean / 10.0).round_ties_even() as u64,
        })
    }
}
