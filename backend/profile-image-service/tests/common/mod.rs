#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use profile_image_service::domain::{Document, EventEnvelope, Fields, ProfileEvent, UserId};
use profile_image_service::repositories::{
    InMemoryRecordStore, RecordStore, StoreError, StoreResult,
};
use profile_image_service::services::ProfileEventObserver;

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const IMAGE_FIELD: &str = "profileImageUrl";
pub const OWNER_FIELD: &str = "ownerUid";

/// In-memory store with injectable failures
pub struct FlakyStore {
    pub inner: InMemoryRecordStore,
    fail_users_writes: AtomicBool,
    /// Owner queries yield this many documents, then an error
    query_fails_after: Mutex<Option<usize>>,
    failing_documents: DashSet<String>,
    panicking_documents: DashSet<String>,
    writes: DashMap<String, usize>,
    /// When set, every write consumes one permit before it lands
    gate: Mutex<Option<Arc<Semaphore>>>,
    active_writes: AtomicUsize,
    max_active_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryRecordStore::new(OWNER_FIELD, page_size),
            fail_users_writes: AtomicBool::new(false),
            query_fails_after: Mutex::new(None),
            failing_documents: DashSet::new(),
            panicking_documents: DashSet::new(),
            writes: DashMap::new(),
            gate: Mutex::new(None),
            active_writes: AtomicUsize::new(0),
            max_active_writes: AtomicUsize::new(0),
        })
    }

    pub fn seed_user(&self, user: &str, image: Option<&str>) {
        let mut fields = Fields::new();
        fields.insert(IMAGE_FIELD.into(), image.map(str::to_string).into());
        self.inner.insert_document(USERS, user, fields);
    }

    pub fn seed_posts(&self, owner: &str, count: usize, image: &str) -> Vec<String> {
        (0..count)
            .map(|i| {
                let id = format!("{}-post-{:03}", owner, i);
                let mut fields = Fields::new();
                fields.insert(OWNER_FIELD.into(), owner.into());
                fields.insert(IMAGE_FIELD.into(), image.into());
                self.inner.insert_document(POSTS, &id, fields);
                id
            })
            .collect()
    }

    pub fn fail_users_writes(&self, fail: bool) {
        self.fail_users_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_query(&self, fail: bool) {
        *self.query_fails_after.lock() = fail.then_some(0);
    }

    pub fn fail_query_after(&self, documents: usize) {
        *self.query_fails_after.lock() = Some(documents);
    }

    pub fn fail_document(&self, id: &str) {
        self.failing_documents.insert(id.to_string());
    }

    pub fn heal_all(&self) {
        self.failing_documents.clear();
        self.fail_users_writes(false);
        self.fail_query(false);
    }

    pub fn panic_on_document(&self, id: &str) {
        self.panicking_documents.insert(id.to_string());
    }

    pub fn gate_writes(&self, gate: Arc<Semaphore>) {
        *self.gate.lock() = Some(gate);
    }

    /// Writes currently started but not yet landed
    pub fn active_writes(&self) -> usize {
        self.active_writes.load(Ordering::SeqCst)
    }

    pub fn max_active_writes(&self) -> usize {
        self.max_active_writes.load(Ordering::SeqCst)
    }

    pub fn writes_to(&self, collection: &str) -> usize {
        self.writes.get(collection).map(|n| *n).unwrap_or(0)
    }

    pub fn image_of(&self, collection: &str, document: &str) -> Option<String> {
        self.inner
            .document(collection, document)
            .and_then(|doc| doc.field(IMAGE_FIELD).as_str().map(str::to_string))
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn write_fields(
        &self,
        collection: &str,
        document: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        let active = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_writes.fetch_max(active, Ordering::SeqCst);
        let result = self.gated_write(collection, document, fields).await;
        self.active_writes.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_document(
        &self,
        collection: &str,
        document: &str,
    ) -> StoreResult<Option<Document>> {
        self.inner.get_document(collection, document).await
    }

    fn query_by_owner<'a>(
        &'a self,
        collection: &'a str,
        owner: &'a UserId,
    ) -> BoxStream<'a, StoreResult<Document>> {
        let fails_after = *self.query_fails_after.lock();
        match fails_after {
            Some(documents) => self
                .inner
                .query_by_owner(collection, owner)
                .take(documents)
                .chain(stream::once(async {
                    Err(StoreError::Unavailable("query timed out".to_string()))
                }))
                .boxed(),
            None => self.inner.query_by_owner(collection, owner),
        }
    }
}

impl FlakyStore {
    async fn gated_write(
        &self,
        collection: &str,
        document: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
                .forget();
        }

        *self.writes.entry(collection.to_string()).or_insert(0) += 1;

        if self.panicking_documents.contains(document) {
            panic!("store exploded on {}", document);
        }
        if collection == USERS && self.fail_users_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deadline exceeded".to_string()));
        }
        if self.failing_documents.contains(document) {
            return Err(StoreError::Rejected {
                document: document.to_string(),
                reason: "permission denied".to_string(),
            });
        }

        self.inner.write_fields(collection, document, fields).await
    }
}

/// Observer that records every event it sees
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<EventEnvelope<ProfileEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl ProfileEventObserver for RecordingObserver {
    fn on_event(&self, event: &EventEnvelope<ProfileEvent>) {
        self.events.lock().push(event.clone());
    }
}
