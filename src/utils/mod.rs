//! Utility functions and helpers.

pub mod http;
pub mod log;

use std::time::Duration;

use chrono::Utc;

/// Split a raw `Cookie` header string into `(name, value)` pairs.
///
/// Segments without `=` or with an empty name are dropped.
pub fn cookie_pairs(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Generate an opaque search session id (base36 of the current time in nanoseconds).
pub fn search_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default().unsigned_abs();
    to_base36(u128::from(nanos) << 64 | u128::from(nanos.rotate_left(17)))
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Build the explore URL for a note.
pub fn explore_url(base: &str, id: &str, token: &str) -> String {
    let base = base.trim_end_matches('/');
    if token.is_empty() {
        format!("{}/{}", base, id)
    } else {
        format!("{}/{}?xsec_token={}", base, id, token)
    }
}

/// Render a duration as `"{h}h {m}m {s}s"`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Truncate to at most `max` characters for log output.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
