use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::StoreConfig;

/// Identity of a user as issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Decoded image held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Reference the image was loaded from
    pub reference: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ImageData {
    pub fn new(reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            reference: reference.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Shared handle to a decoded image, cheap to clone out of the cache
pub type ImageHandle = Arc<ImageData>;

/// A single field value in a stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    String(String),
    Timestamp(DateTime<Utc>),
    /// Placeholder resolved to the store's clock when the write lands
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::String).unwrap_or(FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// Field set of one document, keyed by field name
pub type Fields = BTreeMap<String, FieldValue>;

/// A document as returned by the record store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Field value, with a missing field reading as null
    pub fn field(&self, name: &str) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;
        self.fields.get(name).unwrap_or(NULL)
    }
}

/// Authoritative per-user profile state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub user_id: UserId,
    pub image_ref: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    pub fn from_document(doc: &Document, names: &StoreConfig) -> Self {
        Self {
            user_id: UserId::new(doc.id.clone()),
            image_ref: doc.field(&names.image_field).as_str().map(str::to_string),
            updated_at: doc.field(&names.updated_at_field).as_timestamp(),
        }
    }
}

/// Content item carrying a denormalized copy of its owner's image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentRecord {
    pub id: String,
    pub owner_id: UserId,
    pub image_ref: Option<String>,
}

impl DependentRecord {
    /// Returns `None` when the document has no owner field
    pub fn from_document(doc: &Document, names: &StoreConfig) -> Option<Self> {
        let owner = doc.field(&names.owner_field).as_str()?;
        Some(Self {
            id: doc.id.clone(),
            owner_id: UserId::new(owner),
            image_ref: doc.field(&names.image_field).as_str().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> StoreConfig {
        StoreConfig::default()
    }

    #[test]
    fn test_profile_record_from_document() {
        let ts = Utc::now();
        let mut fields = Fields::new();
        fields.insert("profileImageUrl".into(), "img1".into());
        fields.insert("updatedAt".into(), FieldValue::Timestamp(ts));
        let doc = Document::new("u1", fields);

        let record = ProfileRecord::from_document(&doc, &names());
        assert_eq!(record.user_id, UserId::new("u1"));
        assert_eq!(record.image_ref.as_deref(), Some("img1"));
        assert_eq!(record.updated_at, Some(ts));
    }

    #[test]
    fn test_profile_record_without_picture() {
        let doc = Document::new("u1", Fields::new());
        let record = ProfileRecord::from_document(&doc, &names());
        assert_eq!(record.image_ref, None);
        assert_eq!(record.updated_at, None);
    }

    #[test]
    fn test_dependent_record_requires_owner() {
        let mut fields = Fields::new();
        fields.insert("profileImageUrl".into(), "img1".into());
        let doc = Document::new("p1", fields.clone());
        assert!(DependentRecord::from_document(&doc, &names()).is_none());

        fields.insert("ownerUid".into(), "u1".into());
        let doc = Document::new("p1", fields);
        let record = DependentRecord::from_document(&doc, &names()).unwrap();
        assert_eq!(record.owner_id.as_str(), "u1");
        assert_eq!(record.image_ref.as_deref(), Some("img1"));
    }

    #[test]
    fn test_field_value_from_option() {
        assert_eq!(FieldValue::from(None), FieldValue::Null);
        assert_eq!(
            FieldValue::from(Some("x".to_string())),
            FieldValue::String("x".into())
        );
        assert!(FieldValue::Null.is_null());
    }

    #[test]
    fn test_field_value_serde_shape() {
        let json = serde_json::to_value(FieldValue::from("img")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "string", "value": "img"}));

        let json = serde_json::to_value(FieldValue::ServerTimestamp).unwrap();
        assert_eq!(json, serde_json::json!({"type": "server_timestamp"}));
    }
}
