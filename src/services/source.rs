// src/services/source.rs

//! Platform note source: keyword search and note detail retrieval.
//!
//! [`NoteSource`] is the transport seam. [`HttpNoteSource`] talks to the
//! platform directly (request signing is out of scope; signature headers
//! can be supplied through `platform.headers`). [`CachingNoteSource`] wraps
//! any source with a [`DetailCache`].

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::COOKIE;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{Note, PlatformConfig, SearchConfig};
use crate::utils::cookie_pairs;
use crate::utils::http::create_platform_client;

/// Session credentials for platform requests.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pairs: Vec<(String, String)>,
}

impl AuthContext {
    /// Parse a raw cookie string (`a=1; b=2`).
    pub fn from_cookie(cookie: &str) -> Self {
        Self {
            pairs: cookie_pairs(cookie),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Normalised `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One page of keyword search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<Note>,
    pub has_more: bool,
}

/// Trait for platform transports.
#[async_trait]
pub trait NoteSource: Send + Sync {
    /// Fetch one page (1-based) of search results.
    async fn search(
        &self,
        keyword: &str,
        page: u32,
        search_id: &str,
        auth: &AuthContext,
    ) -> Result<SearchPage>;

    /// Fetch the detail payload (`{"note": {...}}`) for a note.
    async fn fetch_detail(&self, id: &str, token: &str, auth: &AuthContext) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model_type: String,
    #[serde(default)]
    xsec_token: String,
    #[serde(default)]
    note_card: NoteCard,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteCard {
    display_title: String,
    #[serde(rename = "type")]
    note_type: String,
    user: CardUser,
    interact_info: CardInteract,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CardUser {
    nickname: String,
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CardInteract {
    liked_count: Value,
}

impl SearchItem {
    fn into_note(self) -> Note {
        let like_count = match self.note_card.interact_info.liked_count {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let note_type = if self.note_card.note_type.is_empty() {
            "normal".to_string()
        } else {
            self.note_card.note_type
        };

        Note {
            id: self.id,
            title: self.note_card.display_title,
            note_type,
            author: self.note_card.user.nickname,
            user_id: self.note_card.user.user_id,
            like_count,
            token: self.xsec_token,
            ..Note::default()
        }
    }
}

/// Direct HTTP transport for the platform web API.
#[derive(Clone)]
pub struct HttpNoteSource {
    client: reqwest::Client,
    search_url: String,
    explore_url: String,
    page_size: u32,
    sort: String,
}

impl HttpNoteSource {
    pub fn new(platform: &PlatformConfig, search: &SearchConfig) -> Result<Self> {
        Ok(Self::with_client(create_platform_client(platform)?, platform, search))
    }

    pub fn with_client(client: reqwest::Client, platform: &PlatformConfig, search: &SearchConfig) -> Self {
        Self {
            client,
            search_url: platform.search_url.clone(),
            explore_url: platform.explore_url.clone(),
            page_size: search.page_size,
            sort: search.sort.clone(),
        }
    }

    fn note_url(&self, id: &str) -> String {
        format!("{}/{}", self.explore_url.trim_end_matches('/'), id)
    }
}

#[async_trait]
impl NoteSource for HttpNoteSource {
    async fn search(
        &self,
        keyword: &str,
        page: u32,
        search_id: &str,
        auth: &AuthContext,
    ) -> Result<SearchPage> {
        let body = json!({
            "keyword": keyword,
            "page": page,
            "page_size": self.page_size,
            "search_id": search_id,
            "sort": self.sort,
            "note_type": 0,
            "image_formats": ["jpg", "webp", "avif"],
        });

        let response = self
            .client
            .post(&self.search_url)
            .header(COOKIE, auth.cookie_header())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::search(keyword, page, format!("HTTP {}", status)));
        }

        let parsed: SearchResponse = response.json().await?;
        if !parsed.success {
            let msg = parsed.msg.unwrap_or_else(|| "unsuccessful response".into());
            return Err(AppError::search(keyword, page, msg));
        }

        let data = parsed.data.unwrap_or_default();
        Ok(SearchPage {
            items: data
                .items
                .into_iter()
                .filter(|item| item.model_type == "note")
                .map(SearchItem::into_note)
                .collect(),
            has_more: data.has_more,
        })
    }

    async fn fetch_detail(&self, id: &str, token: &str, auth: &AuthContext) -> Result<Value> {
        let response = self
            .client
            .get(self.note_url(id))
            .query(&[("xsec_source", "pc_feed"), ("xsec_token", token)])
            .header(COOKIE, auth.cookie_header())
            .send()
            .await
            .map_err(|e| AppError::fetch(id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(id, format!("HTTP {}", status)));
        }

        let html = response.text().await.map_err(|e| AppError::fetch(id, e))?;
        let state = extract_initial_state(&html)?;

        state
            .get("note")
            .and_then(|n| n.get("noteDetailMap"))
            .and_then(|m| m.get(id))
            .cloned()
            .ok_or_else(|| AppError::fetch(id, "note not present in page state"))
    }
}

static UNDEFINED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bundefined\b").ok());

/// Extract the `window.__INITIAL_STATE__` object embedded in a note page.
pub fn extract_initial_state(html: &str) -> Result<Value> {
    const MARKER: &str = "window.__INITIAL_STATE__";

    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| AppError::validation(format!("invalid selector: {:?}", e)))?;

    let script = document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains(MARKER))
        .ok_or_else(|| {
            AppError::malformed("invalid_structure", "no initial state script", html)
        })?;

    let raw = script
        .split_once(MARKER)
        .and_then(|(_, rest)| rest.trim_start().strip_prefix('='))
        .map(|rest| rest.trim().trim_end_matches(';').trim())
        .unwrap_or_default();

    let normalized = match UNDEFINED.as_ref() {
        Some(re) => re.replace_all(raw, "null").into_owned(),
        None => raw.to_string(),
    };

    serde_json::from_str(&normalized)
        .map_err(|e| AppError::malformed("json_decode_error", e, script.as_str()))
}

/// Fetch-level cache for detail payloads.
pub trait DetailCache: Send + Sync {
    fn get(&self, id: &str) -> Option<Value>;
    fn put(&self, id: &str, payload: Value);
}

/// Process-lifetime in-memory [`DetailCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DetailCache for MemoryCache {
    fn get(&self, id: &str) -> Option<Value> {
        self.entries.read().ok()?.get(id).cloned()
    }

    fn put(&self, id: &str, payload: Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id.to_string(), payload);
        }
    }
}

/// Wraps a source so repeated detail fetches are served from a cache.
///
/// Only payloads carrying a `note` object are cached.
pub struct CachingNoteSource {
    inner: Arc<dyn NoteSource>,
    cache: Arc<dyn DetailCache>,
}

impl CachingNoteSource {
    pub fn new(inner: Arc<dyn NoteSource>, cache: Arc<dyn DetailCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl NoteSource for CachingNoteSource {
    async fn search(
        &self,
        keyword: &str,
        page: u32,
        search_id: &str,
        auth: &AuthContext,
    ) -> Result<SearchPage> {
        self.inner.search(keyword, page, search_id, auth).await
    }

    async fn fetch_detail(&self, id: &str, token: &str, auth: &AuthContext) -> Result<Value> {
        if let Some(hit) = self.cache.get(id) {
            return Ok(hit);
        }

        let payload = self.inner.fetch_detail(id, token, auth).await?;
        if payload.get("note").is_some_and(Value::is_object) {
            self.cache.put(id, payload.clone());
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNoteSource;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpNoteSource {
        let platform = PlatformConfig {
            search_url: format!("{}/api/sns/web/v1/search/notes", server.uri()),
            explore_url: format!("{}/explore/", server.uri()),
            ..PlatformConfig::default()
        };
        HttpNoteSource::with_client(reqwest::Client::new(), &platform, &SearchConfig::default())
    }

    #[test]
    fn test_auth_context_parses_cookie() {
        let auth = AuthContext::from_cookie("a1=x; web_session=y");
        assert_eq!(auth.get("web_session"), Some("y"));
        assert_eq!(auth.cookie_header(), "a1=x; web_session=y");
        assert!(AuthContext::from_cookie("").is_empty());
    }

    #[test]
    fn test_extract_initial_state() {
        let html = r#"<html><body>
            <script>var other = 1;</script>
            <script>window.__INITIAL_STATE__={"note":{"noteDetailMap":{"n1":{"note":{"title":"t","video":undefined}}}}};</script>
        </body></html>"#;

        let state = extract_initial_state(html).unwrap();
        assert_eq!(state["note"]["noteDetailMap"]["n1"]["note"]["title"], "t");
        assert!(state["note"]["noteDetailMap"]["n1"]["note"]["video"].is_null());
    }

    #[test]
    fn test_extract_initial_state_missing_script() {
        let err = extract_initial_state("<html><body>login required</body></html>").unwrap_err();
        assert!(matches!(err, AppError::Malformed { kind: "invalid_structure", .. }));
    }

    #[tokio::test]
    async fn test_http_search_maps_note_cards() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sns/web/v1/search/notes"))
            .and(header("cookie", "a1=x"))
            .and(body_partial_json(json!({"keyword": "西湖", "page": 2, "sort": "time_descending"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "has_more": true,
                    "items": [
                        {
                            "id": "n1",
                            "model_type": "note",
                            "xsec_token": "tok1",
                            "note_card": {
                                "display_title": "西湖一日游",
                                "type": "video",
                                "user": { "nickname": "小王", "user_id": "u1" },
                                "interact_info": { "liked_count": "1.2万" }
                            }
                        },
                        { "id": "q1", "model_type": "hot_query" }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let page = source
            .search("西湖", 2, "sid", &AuthContext::from_cookie("a1=x"))
            .await
            .unwrap();

        assert!(page.has_more);
        assert_eq!(page.items.len(), 1);
        let note = &page.items[0];
        assert_eq!(note.id, "n1");
        assert_eq!(note.note_type, "video");
        assert_eq!(note.like_count, "1.2万");
        assert_eq!(note.token, "tok1");
    }

    #[tokio::test]
    async fn test_http_search_unsuccessful_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "msg": "login"})),
            )
            .mount(&server)
            .await;

        let err = source_for(&server)
            .search("西湖", 1, "sid", &AuthContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Search { page: 1, .. }));
    }

    #[tokio::test]
    async fn test_http_fetch_detail_reads_page_state() {
        let server = MockServer::start().await;
        let html = r#"<script>window.__INITIAL_STATE__ = {"note":{"noteDetailMap":{"n1":{"note":{"noteId":"n1"}}}}}</script>"#;
        Mock::given(method("GET"))
            .and(path("/explore/n1"))
            .and(query_param("xsec_source", "pc_feed"))
            .and(query_param("xsec_token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let payload = source_for(&server)
            .fetch_detail("n1", "tok", &AuthContext::default())
            .await
            .unwrap();
        assert_eq!(payload["note"]["noteId"], "n1");
    }

    #[tokio::test]
    async fn test_caching_source_serves_repeat_fetches() {
        let inner = Arc::new(
            MockNoteSource::new()
                .with_detail("n1", json!({"note": {"noteId": "n1"}}))
                .with_detail("bad", json!({"code": -1})),
        );
        let cache = Arc::new(MemoryCache::new());
        let source = CachingNoteSource::new(inner.clone(), cache.clone());
        let auth = AuthContext::default();

        source.fetch_detail("n1", "t", &auth).await.unwrap();
        source.fetch_detail("n1", "t", &auth).await.unwrap();
        assert_eq!(inner.detail_calls(), 1);

        source.fetch_detail("bad", "t", &auth).await.unwrap();
        source.fetch_detail("bad", "t", &auth).await.unwrap();
        assert_eq!(inner.detail_calls(), 3);
        assert_eq!(cache.len(), 1);
    }
}
