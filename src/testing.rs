//! Test doubles for the classification service, the note source and storage.
//!
//! The mocks record calls so tests can assert on how often the external
//! collaborators were reached.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{AttractionStats, BatchRecord, ClassifiedNote, DetailRecord, Note};
use crate::services::classifier::CompletionService;
use crate::services::source::{AuthContext, NoteSource, SearchPage};
use crate::storage::{ClassifiedData, ClassifiedPaths, DatasetStorage};

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;
type Latency = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Texts listed as `N. text` lines in a user prompt.
pub fn numbered_texts(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| {
            let (number, text) = line.split_once(". ")?;
            number
                .chars()
                .all(|c| c.is_ascii_digit())
                .then(|| text.to_string())
                .filter(|_| !number.is_empty())
        })
        .collect()
}

/// Scripted or computed chat-completion responses.
pub struct MockCompletion {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    responder: Option<Responder>,
    latency: Option<Latency>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCompletion {
    fn build(script: Vec<std::result::Result<String, String>>, responder: Option<Responder>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            responder,
            latency: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replay responses in order; `Err` entries become transport failures.
    pub fn scripted(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self::build(responses, None)
    }

    /// Compute each response from the user prompt.
    pub fn responder(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::build(Vec::new(), Some(Box::new(f)))
    }

    /// Answer every listed text with the same score.
    pub fn echo_scores(score: f64) -> Self {
        Self::responder(move |prompt| {
            let items: Vec<String> = numbered_texts(prompt)
                .iter()
                .map(|_| format!(r#"{{"relevance":"{}%","explanation":"mock"}}"#, score))
                .collect();
            format!("[{}]", items.join(","))
        })
    }

    /// Delay each call by an amount derived from the user prompt.
    pub fn with_latency(mut self, f: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Some(Box::new(f));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user_prompt.to_string());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(user_prompt)).await;
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let response = match (scripted, &self.responder) {
            (Some(Ok(content)), _) => Ok(content),
            (Some(Err(message)), _) => Err(AppError::classification(message)),
            (None, Some(responder)) => Ok(responder(user_prompt)),
            (None, None) => Err(AppError::classification("no scripted response left")),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// In-memory note source with per-page results and per-note payloads.
#[derive(Default)]
pub struct MockNoteSource {
    pages: HashMap<u32, SearchPage>,
    page_failures: Mutex<HashMap<u32, usize>>,
    details: RwLock<HashMap<String, Value>>,
    failing_details: HashSet<String>,
    hang_after: Option<usize>,
    search_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl MockNoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: u32, items: Vec<Note>, has_more: bool) -> Self {
        self.pages.insert(page, SearchPage { items, has_more });
        self
    }

    /// Fail `page` this many times before serving it.
    pub fn failing_page(self, page: u32, times: usize) -> Self {
        if let Ok(mut failures) = self.page_failures.lock() {
            failures.insert(page, times);
        }
        self
    }

    pub fn with_detail(self, id: &str, payload: Value) -> Self {
        if let Ok(mut details) = self.details.write() {
            details.insert(id.to_string(), payload);
        }
        self
    }

    pub fn failing_detail(mut self, id: &str) -> Self {
        self.failing_details.insert(id.to_string());
        self
    }

    /// Never complete detail fetches after the first `n`.
    pub fn hang_after(mut self, n: usize) -> Self {
        self.hang_after = Some(n);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteSource for MockNoteSource {
    async fn search(
        &self,
        keyword: &str,
        page: u32,
        _search_id: &str,
        _auth: &AuthContext,
    ) -> Result<SearchPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if let Ok(mut failures) = self.page_failures.lock() {
            if let Some(remaining) = failures.get_mut(&page).filter(|r| **r > 0) {
                *remaining -= 1;
                return Err(AppError::search(keyword, page, "mock failure"));
            }
        }

        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }

    async fn fetch_detail(&self, id: &str, _token: &str, _auth: &AuthContext) -> Result<Value> {
        let call = self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_after.is_some_and(|n| call >= n) {
            std::future::pending::<()>().await;
        }

        if self.failing_details.contains(id) {
            return Err(AppError::fetch(id, "mock failure"));
        }

        self.details
            .read()
            .ok()
            .and_then(|d| d.get(id).cloned())
            .ok_or_else(|| AppError::fetch(id, "no mock detail"))
    }
}

/// Storage wrapper whose first `n` detail appends fail with an I/O error.
pub struct FlakyStorage {
    inner: Arc<dyn DatasetStorage>,
    append_failures: AtomicUsize,
    append_calls: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn DatasetStorage>) -> Self {
        Self {
            inner,
            append_failures: AtomicUsize::new(0),
            append_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_appends(self, n: usize) -> Self {
        self.append_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetStorage for FlakyStorage {
    async fn write_raw(&self, run_id: &str, notes: &[Note]) -> Result<PathBuf> {
        self.inner.write_raw(run_id, notes).await
    }

    async fn load_raw(&self, run_id: &str) -> Result<Vec<Note>> {
        self.inner.load_raw(run_id).await
    }

    async fn find_classified(&self, keyword: &str) -> Result<Option<ClassifiedData>> {
        self.inner.find_classified(keyword).await
    }

    async fn classified_datasets(&self) -> Result<Vec<(String, ClassifiedData)>> {
        self.inner.classified_datasets().await
    }

    async fn write_classified(
        &self,
        run_id: &str,
        keyword: &str,
        rows: &[ClassifiedNote],
    ) -> Result<ClassifiedPaths> {
        self.inner.write_classified(run_id, keyword, rows).await
    }

    async fn load_classified(&self, run_id: &str) -> Result<Option<ClassifiedData>> {
        self.inner.load_classified(run_id).await
    }

    async fn write_relevant(&self, run_id: &str, rows: &[ClassifiedNote]) -> Result<PathBuf> {
        self.inner.write_relevant(run_id, rows).await
    }

    async fn load_details(&self, run_id: &str) -> Result<Vec<DetailRecord>> {
        self.inner.load_details(run_id).await
    }

    async fn append_details(&self, run_id: &str, records: &[DetailRecord]) -> Result<usize> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .append_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Io(std::io::Error::other("mock append failure")));
        }
        self.inner.append_details(run_id, records).await
    }

    fn details_path(&self, run_id: &str) -> PathBuf {
        self.inner.details_path(run_id)
    }

    async fn save_error_payload(&self, note_id: &str, kind: &str, raw: &str) -> Result<PathBuf> {
        self.inner.save_error_payload(note_id, kind, raw).await
    }

    async fn write_batch_results(&self, date: &str, records: &[BatchRecord]) -> Result<PathBuf> {
        self.inner.write_batch_results(date, records).await
    }

    async fn write_attraction_stats(&self, date: &str, stats: &[AttractionStats]) -> Result<PathBuf> {
        self.inner.write_attraction_stats(date, stats).await
    }
}
