//! clipstash public interface
//!
//! Caller-facing record types, the error taxonomy and the `ClipboardHistory`
//! trait. Everything here is what a host (shell extension, UI) sees.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::query::QueryDescriptor;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Closed set of clipboard item kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Image,
    Link,
    Text,
    Code,
    Color,
    Emoji,
    File,
}

impl ItemType {
    pub const ALL: [ItemType; 7] = [
        ItemType::Image,
        ItemType::Link,
        ItemType::Text,
        ItemType::Code,
        ItemType::Color,
        ItemType::Emoji,
        ItemType::File,
    ];

    /// Name stored in the `item_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Image => "IMAGE",
            ItemType::Link => "LINK",
            ItemType::Text => "TEXT",
            ItemType::Code => "CODE",
            ItemType::Color => "COLOR",
            ItemType::Emoji => "EMOJI",
            ItemType::File => "FILE",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown item type '{0}'")]
pub struct UnknownItemType(pub String);

impl FromStr for ItemType {
    type Err = UnknownItemType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownItemType(s.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted clipboard entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardRecord {
    pub id: i64,
    pub item_type: ItemType,
    pub content: String,
    pub copy_date: DateTime<Utc>,
    pub is_favorite: bool,
    /// Dedupe key chosen by the caller. Not unique at the storage level.
    pub match_value: String,
    pub search_value: Option<String>,
    /// Opaque serialized blob (image dimensions and the like)
    pub meta_data: Option<String>,
}

impl ClipboardRecord {
    /// Attach a backend-assigned id to a save request.
    /// Empty optional text comes back as `None`, the same as a later read.
    pub fn from_request(id: i64, request: SaveRequest) -> Self {
        Self {
            id,
            item_type: request.item_type,
            content: request.content,
            copy_date: request.copy_date.trunc_subsecs(3),
            is_favorite: request.is_favorite,
            match_value: request.match_value,
            search_value: request.search_value.filter(|s| !s.is_empty()),
            meta_data: request.meta_data.filter(|s| !s.is_empty()),
        }
    }
}

/// A record that has not been saved yet. Ids are never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub item_type: ItemType,
    pub content: String,
    pub copy_date: DateTime<Utc>,
    pub is_favorite: bool,
    pub match_value: String,
    pub search_value: Option<String>,
    pub meta_data: Option<String>,
}

impl SaveRequest {
    /// Plain text entry copied now, matched on its own content
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            item_type: ItemType::Text,
            match_value: content.clone(),
            search_value: Some(content.to_lowercase()),
            content,
            copy_date: Utc::now(),
            is_favorite: false,
            meta_data: None,
        }
    }

    pub fn with_item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_copy_date(mut self, copy_date: DateTime<Utc>) -> Self {
        self.copy_date = copy_date;
        self
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    pub fn with_search_value(mut self, search_value: Option<String>) -> Self {
        self.search_value = search_value;
        self
    }

    pub fn with_meta_data(mut self, meta_data: Option<String>) -> Self {
        self.meta_data = meta_data;
        self
    }
}

impl From<ClipboardRecord> for SaveRequest {
    fn from(record: ClipboardRecord) -> Self {
        Self {
            item_type: record.item_type,
            content: record.content,
            copy_date: record.copy_date,
            is_favorite: record.is_favorite,
            match_value: record.match_value,
            search_value: record.search_value,
            meta_data: record.meta_data,
        }
    }
}

/// Error type for store operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store not initialized")]
    NotInitialized,
    #[error("Record {0} not found")]
    NotFound(i64),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Schema drift: {0}")]
    SchemaDrift(String),
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),
    #[error("Failed to open store: {0}")]
    Open(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-facing surface of a clipboard history store.
/// `RecordStore` is the SQLite-backed implementation.
pub trait ClipboardHistory {
    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persist a new record. Returns it with its assigned id.
    fn save(&mut self, request: SaveRequest) -> Result<ClipboardRecord, StoreError>;

    /// Replace every non-id field of an existing record
    fn update(&mut self, record: &ClipboardRecord) -> Result<ClipboardRecord, StoreError>;

    /// Remove a record. Missing ids are not an error.
    fn delete(&mut self, id: i64) -> Result<(), StoreError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Most recent first. Empty on any failure.
    fn query(&mut self, descriptor: &QueryDescriptor) -> Vec<ClipboardRecord>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Release the backend. Safe to call repeatedly.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_type_roundtrip() {
        for t in ItemType::ALL {
            assert_eq!(t.as_str().parse::<ItemType>().unwrap(), t);
        }
        assert!("text".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let request = SaveRequest::text("hello")
            .with_copy_date(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let record = ClipboardRecord::from_request(7, request);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["itemType"], "TEXT");
        assert_eq!(json["matchValue"], "hello");
        assert_eq!(json["isFavorite"], false);
        assert!(json.get("copyDate").is_some());
    }

    #[test]
    fn test_from_request_truncates_to_millis() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let record = ClipboardRecord::from_request(1, SaveRequest::text("x").with_copy_date(precise));
        assert_eq!(record.copy_date.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_from_request_drops_empty_optionals() {
        let request = SaveRequest::text("x")
            .with_search_value(Some(String::new()))
            .with_meta_data(Some(String::new()));
        let record = ClipboardRecord::from_request(1, request);
        assert_eq!(record.search_value, None);
        assert_eq!(record.meta_data, None);
    }

    #[test]
    fn test_record_converts_back_to_request() {
        let record = ClipboardRecord::from_request(3, SaveRequest::text("again").with_favorite(true));
        let request = SaveRequest::from(record.clone());
        assert_eq!(request.content, "again");
        assert!(request.is_favorite);
        assert_eq!(request.copy_date, record.copy_date);
    }
}
