// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Classification service returned an error status or could not be reached
    #[error("Classification error: {0}")]
    Classification(String),

    /// Keyword search failed for a page
    #[error("Search error for '{keyword}' page {page}: {message}")]
    Search {
        keyword: String,
        page: u32,
        message: String,
    },

    /// Note detail could not be fetched
    #[error("Fetch error for note {id}: {message}")]
    Fetch { id: String, message: String },

    /// A response arrived but did not have the expected shape
    #[error("Malformed response ({kind}): {message}")]
    Malformed {
        kind: &'static str,
        message: String,
        raw: String,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a classification service error.
    pub fn classification(message: impl fmt::Display) -> Self {
        Self::Classification(message.to_string())
    }

    /// Create a search error for a keyword/page.
    pub fn search(keyword: impl Into<String>, page: u32, message: impl fmt::Display) -> Self {
        Self::Search {
            keyword: keyword.into(),
            page,
            message: message.to_string(),
        }
    }

    /// Create a detail fetch error.
    pub fn fetch(id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-response error that keeps the raw payload.
    pub fn malformed(kind: &'static str, message: impl fmt::Display, raw: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            message: message.to_string(),
            raw: raw.into(),
        }
    }
}
