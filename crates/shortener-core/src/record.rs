// ABOUTME: Defines the Record entity and the BatchItem wrapper used for batch creation.
// ABOUTME: A record's only mutable field after creation is its soft-delete flag.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The first id handed out by an empty store. Later ids only ever grow.
pub const FIRST_ID: u64 = 1000;

pub const MAX_OWNER_LEN: usize = 64;
pub const MAX_URL_LEN: usize = 2048;

/// Reject empty URLs, URLs containing control characters (they can never be
/// sent back in a Location header), and fields over the stored column bounds.
pub fn validate_fields(owner: &str, url: &str) -> StoreResult<()> {
    if url.is_empty() {
        return Err(StoreError::Validation("url must not be empty".into()));
    }
    if url.chars().any(char::is_control) {
        return Err(StoreError::Validation(
            "url must not contain control characters".into(),
        ));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(StoreError::Validation(format!(
            "owner exceeds {} bytes",
            MAX_OWNER_LEN
        )));
    }
    if url.len() > MAX_URL_LEN {
        return Err(StoreError::Validation(format!(
            "url exceeds {} bytes",
            MAX_URL_LEN
        )));
    }
    Ok(())
}

/// A shortened URL owned by an opaque caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub owner: String,
    pub url: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    /// Create a live (not deleted) record.
    pub fn new(id: u64, owner: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            owner: owner.into(),
            url: url.into(),
            deleted: false,
        }
    }
}

/// One entry of a batch creation request.
///
/// `correlation_id` is an opaque client token used to match response items
/// back to request items; the store never interprets it. `id` is `None` on
/// input and filled in by `Storage::put_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub owner: String,
    pub url: String,
    pub id: Option<u64>,
}

impl BatchItem {
    pub fn new(
        correlation_id: impl Into<String>,
        owner: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            owner: owner.into(),
            url: url.into(),
            id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_new_is_live() {
        let record = Record::new(1000, "u1", "https://example.com");
        assert_eq!(record.id, 1000);
        assert_eq!(record.owner, "u1");
        assert_eq!(record.url, "https://example.com");
        assert!(!record.deleted);
    }

    #[test]
    fn record_deserializes_without_deleted_flag() {
        let record: Record =
            serde_json::from_str(r#"{"id":1001,"owner":"u2","url":"b"}"#).unwrap();
        assert_eq!(record, Record::new(1001, "u2", "b"));
    }

    #[test]
    fn validate_fields_enforces_bounds() {
        assert!(validate_fields("u1", "https://example.com").is_ok());
        assert!(validate_fields("u1", "").is_err());
        assert!(matches!(
            validate_fields("u1", "https://a.example/x\ny"),
            Err(StoreError::Validation(_))
        ));
        assert!(validate_fields("u1", "https://a.example/x\u{7f}").is_err());
        assert!(validate_fields(&"o".repeat(MAX_OWNER_LEN + 1), "a").is_err());
        assert!(matches!(
            validate_fields("u1", &"x".repeat(MAX_URL_LEN + 1)),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn batch_item_starts_without_id() {
        let item = BatchItem::new("c-1", "u1", "https://a.example");
        assert_eq!(item.correlation_id, "c-1");
        assert!(item.id.is_none());
    }
}
