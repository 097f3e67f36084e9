use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{RecordStore, StoreError, StoreResult};
use crate::domain::{Document, FieldValue, Fields, UserId};

/// Process-local document store.
///
/// Collections are sharded by `DashMap`; a write holds the collection's
/// shard lock for the whole field merge, so a multi-field write is never
/// partially visible. Owner queries page through documents in id order.
pub struct InMemoryRecordStore {
    collections: DashMap<String, BTreeMap<String, Fields>>,
    owner_field: String,
    page_size: usize,
    pages_fetched: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new(owner_field: impl Into<String>, page_size: usize) -> Self {
        Self {
            collections: DashMap::new(),
            owner_field: owner_field.into(),
            page_size: page_size.max(1),
            pages_fetched: AtomicUsize::new(0),
        }
    }

    /// Seed a document, replacing any existing one with the same id
    pub fn insert_document(&self, collection: &str, document: &str, fields: Fields) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.to_string(), resolve_server_values(fields));
    }

    pub fn document(&self, collection: &str, document: &str) -> Option<Document> {
        let docs = self.collections.get(collection)?;
        docs.get(document).map(|fields| Document::new(document, fields.clone()))
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of owner-query pages served since creation
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    fn fetch_page(&self, collection: &str, owner: &UserId, after: Option<&str>) -> Vec<Document> {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);

        let Some(docs) = self.collections.get(collection) else {
            return Vec::new();
        };

        let range = match after {
            Some(cursor) => docs.range::<str, _>((
                std::ops::Bound::Excluded(cursor),
                std::ops::Bound::Unbounded,
            )),
            None => docs.range::<str, _>(..),
        };

        range
            .filter(|(_, fields)| {
                fields.get(&self.owner_field).and_then(FieldValue::as_str) == Some(owner.as_str())
            })
            .take(self.page_size)
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect()
    }
}

fn resolve_server_values(fields: Fields) -> Fields {
    let now = Utc::now();
    fields
        .into_iter()
        .map(|(name, value)| match value {
            FieldValue::ServerTimestamp => (name, FieldValue::Timestamp(now)),
            other => (name, other),
        })
        .collect()
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn write_fields(
        &self,
        collection: &str,
        document: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        let fields = resolve_server_values(fields);
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        docs.entry(document.to_string()).or_default().extend(fields);

        debug!(collection = %collection, document = %document, "Document written");
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        document: &str,
    ) -> StoreResult<Option<Document>> {
        Ok(self.document(collection, document))
    }

    fn query_by_owner<'a>(
        &'a self,
        collection: &'a str,
        owner: &'a UserId,
    ) -> BoxStream<'a, StoreResult<Document>> {
        // State: None once exhausted, otherwise the cursor to resume after
        stream::unfold(Some(None::<String>), move |cursor| async move {
            let after = cursor?;
            let page = self.fetch_page(collection, owner, after.as_deref());
            if page.is_empty() {
                return None;
            }

            let next = if page.len() < self.page_size {
                None
            } else {
                page.last().map(|doc| Some(doc.id.clone()))
            };
            Some((stream::iter(page.into_iter().map(Ok::<_, StoreError>)), next))
        })
        .flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn post(owner: &str, image: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("ownerUid".into(), owner.into());
        fields.insert("profileImageUrl".into(), image.into());
        fields
    }

    #[test]
    fn test_write_merges_fields() {
        let store = InMemoryRecordStore::new("ownerUid", 10);
        store.insert_document("posts", "p1", post("u1", "old"));

        let mut update = Fields::new();
        update.insert("profileImageUrl".into(), "new".into());
        tokio_test::block_on(store.write_fields("posts", "p1", update)).unwrap();

        let doc = store.document("posts", "p1").unwrap();
        assert_eq!(doc.field("profileImageUrl").as_str(), Some("new"));
        assert_eq!(doc.field("ownerUid").as_str(), Some("u1"));
    }

    #[test]
    fn test_server_timestamp_resolved_on_write() {
        let store = InMemoryRecordStore::new("ownerUid", 10);
        let mut fields = Fields::new();
        fields.insert("updatedAt".into(), FieldValue::ServerTimestamp);

        let before = Utc::now();
        tokio_test::block_on(store.write_fields("users", "u1", fields)).unwrap();

        let doc = store.document("users", "u1").unwrap();
        let ts = doc.field("updatedAt").as_timestamp().expect("timestamp resolved");
        assert!(ts >= before);
    }

    #[test]
    fn test_query_by_owner_pages_through_all_documents() {
        let store = InMemoryRecordStore::new("ownerUid", 3);
        for i in 0..10 {
            store.insert_document("posts", &format!("a{:02}", i), post("u1", "img"));
        }
        for i in 0..4 {
            store.insert_document("posts", &format!("b{:02}", i), post("u2", "img"));
        }

        let owner = UserId::new("u1");
        let docs: Vec<Document> =
            tokio_test::block_on(store.query_by_owner("posts", &owner).try_collect()).unwrap();

        assert_eq!(docs.len(), 10);
        assert!(docs.iter().all(|d| d.id.starts_with('a')));
        // 3 + 3 + 3 + 1
        assert_eq!(store.pages_fetched(), 4);
    }

    #[test]
    fn test_query_unknown_collection_is_empty() {
        let store = InMemoryRecordStore::new("ownerUid", 3);
        let owner = UserId::new("u1");
        let docs: Vec<Document> =
            tokio_test::block_on(store.query_by_owner("posts", &owner).try_collect()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_get_document() {
        let store = InMemoryRecordStore::new("ownerUid", 3);
        store.insert_document("users", "u1", post("u1", "img"));

        let found = tokio_test::block_on(store.get_document("users", "u1")).unwrap();
        assert!(found.is_some());
        let missing = tokio_test::block_on(store.get_document("users", "u2")).unwrap();
        assert!(missing.is_none());
    }
}
