//! Local filesystem storage implementation.
//!
//! All dataset writes are atomic (temp file, then rename) so an interrupted
//! run never leaves a truncated JSON file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{
    AttractionStats, BatchRecord, ClassifiedNote, DetailRecord, Note, PathsConfig,
};
use crate::storage::{ClassifiedData, ClassifiedPaths, DatasetStorage};
use crate::utils::log::Logger;

const ANALYZED_SUFFIX: &str = "_analyzed.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    data_dir: PathBuf,
    results_dir: PathBuf,
    error_dir: PathBuf,
    logger: Logger,
}

impl LocalStorage {
    /// Create a LocalStorage with `data/`, `results/` and `error/` under one root.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root = root_dir.into();
        Self {
            data_dir: root.join("data"),
            results_dir: root.join("results"),
            error_dir: root.join("error"),
            logger: Logger::silent(),
        }
    }

    /// Create a LocalStorage from configured paths.
    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            data_dir: paths.data_dir.clone(),
            results_dir: paths.results_dir.clone(),
            error_dir: paths.error_dir.clone(),
            logger: Logger::silent(),
        }
    }

    /// Report skipped or unreadable datasets through `logger`.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Dataset path for a run id and suffix, rejecting ids that escape the data dir.
    fn dataset_path(&self, run_id: &str, suffix: &str) -> Result<PathBuf> {
        let run_id = run_id.trim();
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.contains("..") {
            return Err(AppError::validation(format!("invalid run id '{}'", run_id)));
        }
        Ok(self.data_dir.join(format!("{}{}", run_id, suffix)))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Self::write_bytes(path, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match Self::read_bytes(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every `*_analyzed.json` file in the data directory.
    async fn analyzed_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_analyzed = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ANALYZED_SUFFIX));
            if is_analyzed {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every readable classified dataset with the run id its file is named after.
    async fn readable_classified(&self) -> Result<Vec<(String, ClassifiedData)>> {
        let mut datasets = Vec::new();
        for path in self.analyzed_files().await? {
            let run_id = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(ANALYZED_SUFFIX))
                .unwrap_or_default()
                .to_string();
            match Self::read_json::<ClassifiedData>(&path).await {
                Ok(Some(data)) => datasets.push((run_id, data)),
                Ok(None) => {}
                Err(e) => self.logger.warn(&format!(
                    "Skipping unreadable dataset {}: {}",
                    path.display(),
                    e
                )),
            }
        }
        Ok(datasets)
    }
}

#[async_trait]
impl DatasetStorage for LocalStorage {
    async fn write_raw(&self, run_id: &str, notes: &[Note]) -> Result<PathBuf> {
        let path = self.dataset_path(run_id, ".json")?;
        Self::write_json(&path, notes).await?;
        Ok(path)
    }

    async fn load_raw(&self, run_id: &str) -> Result<Vec<Note>> {
        let path = self.dataset_path(run_id, ".json")?;
        Ok(Self::read_json(&path).await?.unwrap_or_default())
    }

    async fn find_classified(&self, keyword: &str) -> Result<Option<ClassifiedData>> {
        let mut best: Option<ClassifiedData> = None;

        for (_, data) in self.readable_classified().await? {
            if data.keyword != keyword {
                continue;
            }
            if best.as_ref().is_none_or(|b| data.updated_at > b.updated_at) {
                best = Some(data);
            }
        }

        Ok(best)
    }

    async fn classified_datasets(&self) -> Result<Vec<(String, ClassifiedData)>> {
        self.readable_classified().await
    }

    async fn write_classified(
        &self,
        run_id: &str,
        keyword: &str,
        rows: &[ClassifiedNote],
    ) -> Result<ClassifiedPaths> {
        let analyzed = self.dataset_path(run_id, ANALYZED_SUFFIX)?;
        let filtered = self.dataset_path(run_id, "_filtered.json")?;

        Self::write_json(&analyzed, &ClassifiedData::new(keyword, rows.to_vec())).await?;

        let relevant: Vec<&ClassifiedNote> = rows.iter().filter(|r| r.is_relevant()).collect();
        Self::write_json(&filtered, &relevant).await?;

        Ok(ClassifiedPaths { analyzed, filtered })
    }

    async fn load_classified(&self, run_id: &str) -> Result<Option<ClassifiedData>> {
        let path = self.dataset_path(run_id, ANALYZED_SUFFIX)?;
        Self::read_json(&path).await
    }

    async fn write_relevant(&self, run_id: &str, rows: &[ClassifiedNote]) -> Result<PathBuf> {
        let path = self.dataset_path(run_id, "_relevant.json")?;
        Self::write_json(&path, rows).await?;
        Ok(path)
    }

    async fn load_details(&self, run_id: &str) -> Result<Vec<DetailRecord>> {
        let path = self.dataset_path(run_id, "_details.json")?;
        Ok(Self::read_json(&path).await?.unwrap_or_default())
    }

    async fn append_details(&self, run_id: &str, records: &[DetailRecord]) -> Result<usize> {
        let path = self.dataset_path(run_id, "_details.json")?;
        let mut store: Vec<DetailRecord> = Self::read_json(&path).await?.unwrap_or_default();

        let mut positions: HashMap<String, usize> = store
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        for record in records {
            match positions.get(&record.id) {
                Some(&i) => store[i] = record.clone(),
                None => {
                    positions.insert(record.id.clone(), store.len());
                    store.push(record.clone());
                }
            }
        }

        Self::write_json(&path, &store).await?;
        Ok(store.len())
    }

    fn details_path(&self, run_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}_details.json", run_id.trim()))
    }

    async fn save_error_payload(&self, note_id: &str, kind: &str, raw: &str) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let safe_id: String = note_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = self
            .error_dir
            .join(format!("{}_{}_{}.txt", safe_id, kind, stamp));
        Self::write_bytes(&path, raw.as_bytes()).await?;
        Ok(path)
    }

    async fn write_batch_results(&self, date: &str, records: &[BatchRecord]) -> Result<PathBuf> {
        let path = self
            .results_dir
            .join(format!("batch_results_{}.json", date));
        Self::write_json(&path, records).await?;
        Ok(path)
    }

    async fn write_attraction_stats(&self, date: &str, stats: &[AttractionStats]) -> Result<PathBuf> {
        let path = self
            .results_dir
            .join(format!("attraction_stats_{}.json", date));
        Self::write_json(&path, stats).await?;
        Ok(path)
    }
}
