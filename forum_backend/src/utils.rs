//! Shared helpers and constants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const APP_NAME: &str = "forum_backend";

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Parses an RFC 3339 timestamp. Unparseable values map to the Unix epoch so
/// ordering stays total.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Generates a prefixed record id such as `post-6f0c…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

pub fn print_banner() {
    println!("{APP_NAME} {}", env!("CARGO_PKG_VERSION"));
}
