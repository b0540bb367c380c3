//! Note detail records and the platform payload they are parsed from.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ClassifiedNote, CrawlStatus};

/// Enriched detail for a relevant note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<i64>,
    pub ip_location: String,
    pub liked_count: String,
    pub collected_count: String,
    pub comment_count: String,
    pub share_count: String,
    pub note_type: String,
    pub author_id: String,
    pub author_nickname: String,
    pub author_avatar: String,
    pub last_update_time: Option<i64>,
    pub topics: Vec<String>,

    /// The classified search row this detail was enriched from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ClassifiedNote>,

    pub crawl_status: Option<CrawlStatus>,
}

impl DetailRecord {
    /// Parse a detail payload (`{"note": {...}}`) returned by the note source.
    ///
    /// Non-object payloads and payloads without a `note` object are rejected
    /// with [`AppError::Malformed`] carrying the raw payload.
    pub fn from_payload(requested_id: &str, payload: &Value) -> Result<Self> {
        let Some(object) = payload.as_object() else {
            return Err(AppError::malformed(
                "invalid_structure",
                format!("detail for {requested_id} is not an object"),
                payload.to_string(),
            ));
        };
        let Some(note) = object.get("note").filter(|n| n.is_object()) else {
            return Err(AppError::malformed(
                "invalid_structure",
                format!("detail for {requested_id} has no note object"),
                payload.to_string(),
            ));
        };

        let raw: RawNote = serde_json::from_value(note.clone()).map_err(|e| {
            AppError::malformed("json_decode_error", e, payload.to_string())
        })?;

        let id = if raw.note_id.is_empty() {
            requested_id.to_string()
        } else {
            raw.note_id
        };

        Ok(Self {
            id,
            title: raw.title,
            content: raw.desc,
            published_at: raw.time,
            ip_location: raw.ip_location,
            liked_count: raw.interact_info.liked_count,
            collected_count: raw.interact_info.collected_count,
            comment_count: raw.interact_info.comment_count,
            share_count: raw.interact_info.share_count,
            note_type: raw.note_type,
            author_id: raw.user.user_id,
            author_nickname: raw.user.nickname,
            author_avatar: raw.user.avatar,
            last_update_time: raw.last_update_time,
            topics: raw
                .tag_list
                .into_iter()
                .filter(|tag| tag.kind == "topic" && !tag.name.is_empty())
                .map(|tag| tag.name)
                .collect(),
            source: None,
            crawl_status: None,
        })
    }

    /// Fill columns the stored record lacks from the current search row.
    pub fn backfill(&mut self, item: &ClassifiedNote) {
        if self.id.is_empty() {
            self.id = item.id().to_string();
        }
        if self.title.is_empty() {
            self.title = item.note.title.clone();
        }
        if self.note_type.is_empty() {
            self.note_type = item.note.note_type.clone();
        }
        if self.published_at.is_none() {
            self.published_at = item.note.published_at;
        }
        if self.source.is_none() {
            self.source = Some(item.clone());
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNote {
    note_id: String,
    title: String,
    desc: String,
    #[serde(deserialize_with = "lenient::millis")]
    time: Option<i64>,
    ip_location: String,
    interact_info: RawInteractInfo,
    #[serde(rename = "type")]
    note_type: String,
    user: RawUser,
    #[serde(deserialize_with = "lenient::millis")]
    last_update_time: Option<i64>,
    tag_list: Vec<RawTag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInteractInfo {
    #[serde(deserialize_with = "lenient::counter")]
    liked_count: String,
    #[serde(deserialize_with = "lenient::counter")]
    collected_count: String,
    #[serde(deserialize_with = "lenient::counter")]
    comment_count: String,
    #[serde(deserialize_with = "lenient::counter")]
    share_count: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawUser {
    user_id: String,
    nickname: String,
    avatar: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTag {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// The platform is inconsistent about numbers vs. strings.
mod lenient {
    use super::*;

    pub fn millis<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        })
    }

    pub fn counter<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => "0".to_string(),
        })
    }
}
