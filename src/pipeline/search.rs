// src/pipeline/search.rs

//! Paginated keyword search with retry and deduplication.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Note, SearchConfig};
use crate::services::{AuthContext, NoteSource, SearchPage};
use crate::utils::log::Logger;
use crate::utils::{explore_url, search_id};

/// Drives search pagination for one keyword.
#[derive(Clone)]
pub struct NoteSearcher {
    source: Arc<dyn NoteSource>,
    config: SearchConfig,
    explore_base: String,
    logger: Logger,
}

impl NoteSearcher {
    pub fn new(
        source: Arc<dyn NoteSource>,
        config: SearchConfig,
        explore_base: impl Into<String>,
        logger: Logger,
    ) -> Self {
        Self {
            source,
            config,
            explore_base: explore_base.into(),
            logger,
        }
    }

    /// Collect notes for `keyword` across pages, stamped with the keyword,
    /// attraction id and explore URL. Failed pages are skipped.
    pub async fn search_all(&self, keyword: &str, attraction_id: &str, auth: &AuthContext) -> Vec<Note> {
        let search_id = search_id();
        self.logger.info(&format!(
            "Searching '{}' (attraction {}), search_id {}",
            keyword, attraction_id, search_id
        ));

        let mut notes = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=self.config.max_pages {
            let Some(result) = self.fetch_page(keyword, page, &search_id, auth).await else {
                self.logger
                    .warn(&format!("Page {} for '{}' failed, skipping", page, keyword));
                continue;
            };

            let found = result.items.len();
            for mut note in result.items {
                if note.id.trim().is_empty() || !seen.insert(note.id.clone()) {
                    continue;
                }
                note.keyword = keyword.to_string();
                note.attraction_id = attraction_id.to_string();
                note.url = explore_url(&self.explore_base, &note.id, &note.token);
                notes.push(note);
            }
            self.logger
                .sub_item(&format!("Page {}: {} notes", page, found));

            if !result.has_more {
                self.logger
                    .info(&format!("No more results for '{}' after page {}", keyword, page));
                break;
            }
        }

        self.logger.info(&format!(
            "Search for '{}' found {} unique notes",
            keyword,
            notes.len()
        ));
        notes
    }

    async fn fetch_page(
        &self,
        keyword: &str,
        page: u32,
        search_id: &str,
        auth: &AuthContext,
    ) -> Option<SearchPage> {
        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.source.search(keyword, page, search_id, auth).await {
                Ok(found) => return Some(found),
                Err(e) => {
                    self.logger.warn(&format!(
                        "Search attempt {}/{} failed: {}",
                        attempt, attempts, e
                    ));
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff(attempt)).await;
                    }
                }
            }
        }
        None
    }
}
