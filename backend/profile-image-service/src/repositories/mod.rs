//! Record store collaborator
//!
//! The store is an opaque key-addressed document database with atomic
//! per-document writes. No multi-document transactions are assumed.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::domain::{Document, Fields, UserId};

pub mod memory;

pub use memory::InMemoryRecordStore;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected for {document}: {reason}")]
    Rejected { document: String, reason: String },

    #[error("Malformed document: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Merge `fields` into one document. Either every field lands or none does.
    async fn write_fields(
        &self,
        collection: &str,
        document: &str,
        fields: Fields,
    ) -> StoreResult<()>;

    async fn get_document(&self, collection: &str, document: &str) -> StoreResult<Option<Document>>;

    /// Every document in `collection` owned by `owner`.
    ///
    /// The stream is lazy and pages internally. Each call restarts the
    /// enumeration from the beginning.
    fn query_by_owner<'a>(
        &'a self,
        collection: &'a str,
        owner: &'a UserId,
    ) -> BoxStream<'a, StoreResult<Document>>;
}
