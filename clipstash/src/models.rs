//! Storage-side data models for clipstash
//!
//! `StoredRecord` is a record exactly as it sits in the `clipboard` table:
//! text columns escaped, the copy date as canonical ISO-8601 text, absent
//! optional text as "". Conversion to and from the public `ClipboardRecord`
//! is the only place the codec runs.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec;
use crate::interface::{ClipboardRecord, ItemType, SaveRequest};
use crate::query::canonical_timestamp;

// ─────────────────────────────────────────────────────────────────────────────
// INTERNAL RECORD (escaped, used for storage)
// ─────────────────────────────────────────────────────────────────────────────

/// Row representation of a clipboard record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: Option<i64>,
    pub item_type: ItemType,
    pub content: String,
    pub copy_date: String,
    pub is_favorite: bool,
    pub match_value: String,
    pub search_value: String,
    pub meta_data: String,
}

impl StoredRecord {
    /// Escape a save request for insertion
    pub fn from_request(request: &SaveRequest) -> Result<Self, UnstorableDate> {
        Ok(Self {
            id: None,
            item_type: request.item_type,
            content: codec::escape(&request.content).into_owned(),
            copy_date: stored_timestamp(&request.copy_date)?,
            is_favorite: request.is_favorite,
            match_value: codec::escape(&request.match_value).into_owned(),
            search_value: escape_optional(request.search_value.as_deref()),
            meta_data: escape_optional(request.meta_data.as_deref()),
        })
    }

    /// Escape a full record for an in-place update
    pub fn from_record(record: &ClipboardRecord) -> Result<Self, UnstorableDate> {
        Ok(Self {
            id: Some(record.id),
            item_type: record.item_type,
            content: codec::escape(&record.content).into_owned(),
            copy_date: stored_timestamp(&record.copy_date)?,
            is_favorite: record.is_favorite,
            match_value: codec::escape(&record.match_value).into_owned(),
            search_value: escape_optional(record.search_value.as_deref()),
            meta_data: escape_optional(record.meta_data.as_deref()),
        })
    }

    /// Unescape into the public record
    pub fn into_record(self) -> ClipboardRecord {
        ClipboardRecord {
            id: self.id.unwrap_or(0),
            item_type: self.item_type,
            content: codec::unescape(&self.content).into_owned(),
            copy_date: parse_db_timestamp(&self.copy_date),
            is_favorite: self.is_favorite,
            match_value: codec::unescape(&self.match_value).into_owned(),
            search_value: unescape_optional(&self.search_value),
            meta_data: unescape_optional(&self.meta_data),
        }
    }
}

/// Copy date outside the four-digit year range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("copy date {0} is outside years 0000-9999")]
pub struct UnstorableDate(pub DateTime<Utc>);

/// Canonical text for the `copy_date` column. Only four-digit years keep the
/// text fixed-width, which the column's ordering and parsing rely on.
pub fn stored_timestamp(ts: &DateTime<Utc>) -> Result<String, UnstorableDate> {
    if (0..=9999).contains(&ts.year()) {
        Ok(canonical_timestamp(ts))
    } else {
        Err(UnstorableDate(*ts))
    }
}

fn escape_optional(value: Option<&str>) -> String {
    value.map(|v| codec::escape(v).into_owned()).unwrap_or_default()
}

fn unescape_optional(stored: &str) -> Option<String> {
    if stored.is_empty() {
        None
    } else {
        Some(codec::unescape(stored).into_owned())
    }
}

/// Parse the `item_type` column. Unknown names read as text.
pub fn parse_item_type(stored: &str) -> ItemType {
    stored.parse().unwrap_or_else(|e| {
        debug!(error = %e, "treating unknown item type as TEXT");
        ItemType::Text
    })
}

/// Parse the `copy_date` column.
/// Accepts the canonical RFC 3339 form and the older `%Y-%m-%d %H:%M:%S%.f`
/// layout; anything else reads as the epoch so it sorts last.
pub fn parse_db_timestamp(timestamp_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
                .map(|dt| Utc.from_utc_datetime(&dt))
        })
        .unwrap_or_else(|e| {
            warn!(value = timestamp_str, error = %e, "unparseable copy date");
            DateTime::<Utc>::default()
        })
}
