//! Remote table access.
//!
//! The remote side is a generic tabular store with one table per entity
//! type. Every row has a server-assigned `id` and a free-form `fields`
//! object. [`RemoteTable`] is the seam the sync engine talks to; it does not
//! care whether requests carry a credential or go through a trusted proxy.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::{GatewayAuth, HttpTableGateway};
pub use memory::{MemoryTable, Operation};

/// Column values of a remote row.
pub type Fields = serde_json::Map<String, Value>;

/// One row of a remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Server-assigned identifier
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteRecord {
    /// Non-empty string value of a field, trimmed.
    #[must_use]
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Equality filter applied when listing a table.
///
/// With [`FieldFilter::or_unclaimed`] the filter also passes rows where both
/// the filtered field and the given id field are blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
    pub unclaimed_by: Option<String>,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            unclaimed_by: None,
        }
    }

    /// Also pass rows with neither the filtered field nor `id_field` set.
    #[must_use]
    pub fn or_unclaimed(mut self, id_field: impl Into<String>) -> Self {
        self.unclaimed_by = Some(id_field.into());
        self
    }

    /// Whether the filtered field of `record` holds the filter value.
    #[must_use]
    pub fn owns(&self, record: &RemoteRecord) -> bool {
        record.text_field(&self.field) == Some(self.value.trim())
    }

    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        self.owns(record)
            || self.unclaimed_by.as_deref().is_some_and(|id_field| {
                record.text_field(&self.field).is_none() && record.text_field(id_field).is_none()
            })
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid remote table configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote table HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote table API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid remote table payload: {0}")]
    InvalidPayload(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// CRUD over remote tables.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// List every row of `table`, following pagination.
    async fn list(
        &self,
        table: &str,
        filter: Option<&FieldFilter>,
    ) -> GatewayResult<Vec<RemoteRecord>>;

    /// Fetch one row.
    async fn get(&self, table: &str, id: &str) -> GatewayResult<RemoteRecord>;

    /// Insert a row. The server assigns its id.
    async fn create(&self, table: &str, fields: &Fields) -> GatewayResult<RemoteRecord>;

    /// Partially update a row: only the given fields change.
    async fn update(&self, table: &str, id: &str, fields: &Fields) -> GatewayResult<RemoteRecord>;

    async fn delete(&self, table: &str, id: &str) -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: Value) -> RemoteRecord {
        RemoteRecord {
            id: "rec1".to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn text_field_ignores_blank_and_non_string_values() {
        let record = record(serde_json::json!({
            "address": "  1 rue Haute ",
            "notes": "   ",
            "amount": 4,
        }));
        assert_eq!(record.text_field("address"), Some("1 rue Haute"));
        assert_eq!(record.text_field("notes"), None);
        assert_eq!(record.text_field("amount"), None);
        assert_eq!(record.text_field("missing"), None);
    }

    #[test]
    fn field_filter_matches_trimmed_text() {
        let filter = FieldFilter::equals("ownerId", "team-1");
        assert!(filter.matches(&record(serde_json::json!({ "ownerId": "team-1 " }))));
        assert!(!filter.matches(&record(serde_json::json!({ "ownerId": "team-2" }))));
        assert!(!filter.matches(&record(serde_json::json!({}))));
    }

    #[test]
    fn remote_record_deserializes_without_fields() {
        let record: RemoteRecord = serde_json::from_str(r#"{ "id": "rec9" }"#).unwrap();
        assert_eq!(record.id, "rec9");
        assert!(record.fields.is_empty());
    }
}
