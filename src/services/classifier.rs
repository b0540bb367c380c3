// src/services/classifier.rs

//! Relevance classification against an OpenAI-compatible chat-completion service.
//!
//! [`CompletionService`] is the single-call seam (system + user prompt in,
//! raw text out). [`RelevanceClassifier`] builds the prompts, retries, and
//! turns whatever text comes back into exactly one [`ClassificationResult`]
//! per input.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ClassificationResult, ClassifierConfig};
use crate::services::prompts::{RELEVANCE_SYSTEM_PROMPT, relevance_user_prompt};
use crate::utils::http::create_api_client;
use crate::utils::log::Logger;
use crate::utils::truncate;

/// A single chat-completion call.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion client for the Ark (Volcano Engine) endpoint.
#[derive(Clone)]
pub struct ArkClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ArkClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build a client, reading the key and model from the configured env vars.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = read_env(&config.api_key_env)?;
        let model = read_env(&config.model_env)?;
        Ok(Self::new(
            create_api_client(config)?,
            &config.base_url,
            api_key,
            model,
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn read_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::config(format!("{} not set", name)))
}

#[async_trait]
impl CompletionService for ArkClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::classification(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .find(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::classification("completion has no content"))
    }
}

/// Batch relevance classifier with retry.
#[derive(Clone)]
pub struct RelevanceClassifier {
    service: Arc<dyn CompletionService>,
    max_retries: u32,
    retry_delay: Duration,
    logger: Logger,
}

impl RelevanceClassifier {
    pub fn new(service: Arc<dyn CompletionService>, config: &ClassifierConfig, logger: Logger) -> Self {
        Self {
            service,
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            logger,
        }
    }

    /// Classify `texts` for `keyword`, returning one result per text in order.
    ///
    /// Never fails: exhausted retries yield zero results.
    pub async fn classify(&self, texts: &[String], keyword: &str) -> Vec<ClassificationResult> {
        if texts.is_empty() || keyword.trim().is_empty() {
            return zeros(texts.len());
        }

        let user_prompt = relevance_user_prompt(texts, keyword);
        self.logger.debug(&format!(
            "Classifying {} texts for '{}'",
            texts.len(),
            keyword
        ));

        for attempt in 1..=self.max_retries {
            match self.service.complete(RELEVANCE_SYSTEM_PROMPT, &user_prompt).await {
                Ok(content) => {
                    self.logger
                        .debug(&format!("Completion: {}", truncate(&content, 500)));
                    let results = parse_response(&content, texts.len());

                    if should_retry(&results) && attempt < self.max_retries {
                        self.logger.warn(&format!(
                            "All-zero classification, retrying ({}/{})",
                            attempt + 1,
                            self.max_retries
                        ));
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    return results;
                }
                Err(e) => {
                    self.logger.error(&format!(
                        "Classification request failed ({}/{}): {}",
                        attempt, self.max_retries, e
                    ));
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        self.logger
            .warn("Classification retries exhausted, returning zero results");
        zeros(texts.len())
    }
}

fn zeros(n: usize) -> Vec<ClassificationResult> {
    vec![ClassificationResult::zero(); n]
}

/// Every score zero and every explanation empty.
///
/// Treated as transient, which also retries batches that are genuinely
/// irrelevant.
fn should_retry(results: &[ClassificationResult]) -> bool {
    results.iter().all(ClassificationResult::is_blank)
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    relevance: Value,
    #[serde(default)]
    explanation: Value,
}

/// Parse completion text into exactly `expected` results.
///
/// Tries a JSON array first (code fences allowed), then the numbered
/// `N. 相关性: P% 解释: ...` text layout.
pub fn parse_response(content: &str, expected: usize) -> Vec<ClassificationResult> {
    let mut results = parse_json(content).unwrap_or_else(|| parse_text(content));
    results.resize(expected, ClassificationResult::zero());
    results
}

fn parse_json(content: &str) -> Option<Vec<ClassificationResult>> {
    let body = strip_code_fence(content);
    let items: Vec<Value> = serde_json::from_str(body).ok().or_else(|| {
        let start = body.find('[')?;
        let end = body.rfind(']')?;
        serde_json::from_str(body.get(start..=end)?).ok()
    })?;

    Some(
        items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value::<RawVerdict>(item).ok())
            .map(|v| {
                let explanation = match v.explanation {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                ClassificationResult::new(parse_relevance(&v.relevance), explanation)
            })
            .collect(),
    )
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}

static ENTRY_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+)\.\s*(?:相关性|relevance)\s*[:：]\s*(\d+(?:\.\d+)?)\s*%\s*(?:解释|explanation)\s*[:：]\s*",
    )
    .ok()
});

/// Explanation runs from one header to the next.
fn parse_text(content: &str) -> Vec<ClassificationResult> {
    let Some(header) = ENTRY_HEADER.as_ref() else {
        return Vec::new();
    };

    let matches: Vec<(usize, usize, f64)> = header
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let score = caps.get(2)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), score))
        })
        .collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, &(_, end, score))| {
            let stop = matches.get(i + 1).map_or(content.len(), |next| next.0);
            ClassificationResult::new(score, content[end..stop].trim())
        })
        .collect()
}

/// `"85%"` and bare numbers (or numeric strings) become scores; anything else is 0.
pub fn parse_relevance(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompletion;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            retry_delay_secs: 0,
            ..ClassifierConfig::default()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_relevance() {
        assert_eq!(parse_relevance(&json!("85%")), 85.0);
        assert_eq!(parse_relevance(&json!(42)), 42.0);
        assert_eq!(parse_relevance(&json!("12.5")), 12.5);
        assert_eq!(parse_relevance(&json!("high")), 0.0);
        assert_eq!(parse_relevance(&json!(null)), 0.0);
    }

    #[test]
    fn test_parse_json_pads_and_truncates() {
        let content = r#"[{"relevance":"90%","explanation":"a"}]"#;
        let padded = parse_response(content, 3);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[0].relevance_score, 90.0);
        assert!(padded[2].is_blank());

        let content = r#"[{"relevance":"1%"},{"relevance":"2%"},{"relevance":"3%"}]"#;
        let truncated = parse_response(content, 2);
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[1].relevance_score, 2.0);
    }

    #[test]
    fn test_parse_json_inside_code_fence() {
        let content = "```json\n[{\"relevance\":\"70%\",\"explanation\":\"景点\"}]\n```";
        let results = parse_response(content, 1);
        assert_eq!(results[0].relevance_score, 70.0);
        assert_eq!(results[0].explanation, "景点");
    }

    #[test]
    fn test_parse_text_fallback() {
        let content = "1. 相关性: 85% 解释: 提到长城\n2. 相关性：10% 解释：天气\n";
        let results = parse_response(content, 2);
        assert_eq!(results[0].relevance_score, 85.0);
        assert_eq!(results[0].explanation, "提到长城");
        assert_eq!(results[1].relevance_score, 10.0);
        assert_eq!(results[1].explanation, "天气");
    }

    #[test]
    fn test_unparseable_is_all_zero() {
        let results = parse_response("I cannot help with that", 2);
        assert!(results.iter().all(ClassificationResult::is_blank));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let mock = Arc::new(MockCompletion::echo_scores(50.0));
        let classifier = RelevanceClassifier::new(mock.clone(), &config(), Logger::silent());

        assert!(classifier.classify(&[], "旅游").await.is_empty());
        let results = classifier.classify(&texts(&["a"]), "").await;
        assert!(results[0].is_blank());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_transport_failure_then_succeeds() {
        let mock = Arc::new(MockCompletion::scripted(vec![
            Err("connection reset".into()),
            Ok(r#"[{"relevance":"60%","explanation":"ok"}]"#.into()),
        ]));
        let classifier = RelevanceClassifier::new(mock.clone(), &config(), Logger::silent());

        let results = classifier.classify(&texts(&["x"]), "旅游").await;
        assert_eq!(results[0].relevance_score, 60.0);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_all_zero_result_is_retried() {
        let mock = Arc::new(MockCompletion::scripted(vec![
            Ok(r#"[{"relevance":"0%","explanation":""}]"#.into()),
            Ok(r#"[{"relevance":"0%","explanation":""}]"#.into()),
            Ok(r#"[{"relevance":"0%","explanation":""}]"#.into()),
        ]));
        let classifier = RelevanceClassifier::new(mock.clone(), &config(), Logger::silent());

        let results = classifier.classify(&texts(&["x"]), "旅游").await;
        assert!(results[0].is_blank());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_zeros() {
        let mock = Arc::new(MockCompletion::scripted(vec![
            Err("boom".into()),
            Err("boom".into()),
            Err("boom".into()),
        ]));
        let classifier = RelevanceClassifier::new(mock.clone(), &config(), Logger::silent());

        let results = classifier.classify(&texts(&["x", "y"]), "旅游").await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(ClassificationResult::is_blank));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_ark_client_posts_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "[]" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ArkClient::new(
            reqwest::Client::new(),
            format!("{}/api/v3/", server.uri()),
            "secret",
            "ep-1",
        );
        let content = client.complete("system", "user").await.unwrap();
        assert_eq!(content, "[]");
    }

    #[tokio::test]
    async fn test_ark_client_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = ArkClient::new(reqwest::Client::new(), server.uri(), "k", "m");
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AppError::Classification(_)));
        assert!(err.to_string().contains("429"));
    }
}
