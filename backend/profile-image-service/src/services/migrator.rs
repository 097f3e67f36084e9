//! Fan-out of a new profile image reference onto dependent records
//!
//! One pass enumerates every record owned by the user and rewrites the
//! denormalized image field:
//! - single attempt per record, no retry within a pass
//! - a failed record never aborts the others
//! - records already carrying the target reference are not rewritten
//! - writes run with bounded parallelism

use futures::stream::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{MigrationConfig, StoreConfig};
use crate::domain::{DependentRecord, Document, FieldValue, Fields, UserId};
use crate::metrics::MigrationMetrics;
use crate::repositories::{RecordStore, StoreError};

/// Target state for one owner's dependent records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJob {
    pub owner_id: UserId,
    /// Reference from the authoritative write that triggered this job
    pub image_ref: Option<String>,
}

/// Terminal status of a migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Completed {
        migrated: usize,
        unchanged: usize,
    },
    PartialFailure {
        failed: usize,
        migrated: usize,
        unchanged: usize,
        /// First few failures as "document: error"
        samples: Vec<String>,
    },
    /// The run could not finish enumerating, or its task died
    Fatal(String),
}

impl MigrationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MigrationOutcome::Completed { .. } => "completed",
            MigrationOutcome::PartialFailure { .. } => "partial_failure",
            MigrationOutcome::Fatal(_) => "fatal",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, MigrationOutcome::Completed { .. })
    }
}

enum RecordResult {
    Migrated,
    Unchanged,
    Failed { document: String, error: StoreError },
    QueryFailed(StoreError),
}

pub struct DependentRecordMigrator {
    store: Arc<dyn RecordStore>,
    names: StoreConfig,
    concurrency: usize,
    max_error_samples: usize,
    metrics: MigrationMetrics,
}

impl DependentRecordMigrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        store_config: &StoreConfig,
        config: &MigrationConfig,
    ) -> Self {
        Self {
            store,
            names: store_config.clone(),
            concurrency: config.concurrency.max(1),
            max_error_samples: config.max_error_samples,
            metrics: MigrationMetrics::new(),
        }
    }

    /// Run one pass for `job` and report how it ended
    pub async fn run(&self, job: &MigrationJob) -> MigrationOutcome {
        info!(
            owner_id = %job.owner_id,
            image_ref = ?job.image_ref,
            collection = %self.names.posts_collection,
            "Starting dependent record migration"
        );

        let mut migrated = 0;
        let mut unchanged = 0;
        let mut failed = 0;
        let mut samples = Vec::new();
        let mut query_error = None;

        let mut results = self
            .store
            .query_by_owner(&self.names.posts_collection, &job.owner_id)
            .map(|item| async move {
                match item {
                    Ok(doc) => self.migrate_record(doc, &job.image_ref).await,
                    Err(e) => RecordResult::QueryFailed(e),
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some(result) = results.next().await {
            match result {
                RecordResult::Migrated => {
                    migrated += 1;
                    self.metrics.record_record("migrated");
                }
                RecordResult::Unchanged => {
                    unchanged += 1;
                    self.metrics.record_record("unchanged");
                }
                RecordResult::Failed { document, error } => {
                    failed += 1;
                    self.metrics.record_record("failed");
                    warn!(
                        owner_id = %job.owner_id,
                        document = %document,
                        error = %error,
                        "Failed to migrate dependent record"
                    );
                    if samples.len() < self.max_error_samples {
                        samples.push(format!("{}: {}", document, error));
                    }
                }
                RecordResult::QueryFailed(e) => {
                    // Keep draining; the store decides whether enumeration continues
                    if query_error.is_none() {
                        query_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = query_error {
            let mut reason = format!(
                "failed to enumerate records for {} after {} migrated, {} unchanged, {} failed: {}",
                job.owner_id, migrated, unchanged, failed, e
            );
            if !samples.is_empty() {
                reason.push_str(&format!(" (record errors: {})", samples.join("; ")));
            }
            return MigrationOutcome::Fatal(reason);
        }

        if failed > 0 {
            MigrationOutcome::PartialFailure {
                failed,
                migrated,
                unchanged,
                samples,
            }
        } else {
            MigrationOutcome::Completed {
                migrated,
                unchanged,
            }
        }
    }

    async fn migrate_record(&self, doc: Document, target: &Option<String>) -> RecordResult {
        let Some(record) = DependentRecord::from_document(&doc, &self.names) else {
            return RecordResult::Failed {
                error: StoreError::Malformed(format!(
                    "{} has no {}",
                    doc.id, self.names.owner_field
                )),
                document: doc.id,
            };
        };
        if record.image_ref == *target {
            return RecordResult::Unchanged;
        }

        let mut fields = Fields::new();
        fields.insert(
            self.names.image_field.clone(),
            FieldValue::from(target.clone()),
        );

        match self
            .store
            .write_fields(&self.names.posts_collection, &record.id, fields)
            .await
        {
            Ok(()) => {
                debug!(document = %record.id, "Dependent record migrated");
                RecordResult::Migrated
            }
            Err(error) => RecordResult::Failed {
                document: record.id,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryRecordStore;

    fn seeded_store(owner: &str, count: usize, image: &str) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new("ownerUid", 4));
        for i in 0..count {
            let mut fields = Fields::new();
            fields.insert("ownerUid".into(), owner.into());
            fields.insert("profileImageUrl".into(), image.into());
            store.insert_document("posts", &format!("{}-p{}", owner, i), fields);
        }
        store
    }

    fn migrator(store: Arc<InMemoryRecordStore>) -> DependentRecordMigrator {
        DependentRecordMigrator::new(store, &StoreConfig::default(), &MigrationConfig::default())
    }

    #[tokio::test]
    async fn test_run_rewrites_every_owned_record() {
        let store = seeded_store("u1", 9, "img1");
        let job = MigrationJob {
            owner_id: UserId::new("u1"),
            image_ref: Some("img2".to_string()),
        };

        let outcome = migrator(Arc::clone(&store)).run(&job).await;

        assert_eq!(
            outcome,
            MigrationOutcome::Completed {
                migrated: 9,
                unchanged: 0
            }
        );
        for doc in store.documents("posts") {
            assert_eq!(doc.field("profileImageUrl").as_str(), Some("img2"));
        }
    }

    #[tokio::test]
    async fn test_rerun_is_a_no_op() {
        let store = seeded_store("u1", 5, "img1");
        let job = MigrationJob {
            owner_id: UserId::new("u1"),
            image_ref: Some("img2".to_string()),
        };
        let migrator = migrator(Arc::clone(&store));

        migrator.run(&job).await;
        let outcome = migrator.run(&job).await;

        assert_eq!(
            outcome,
            MigrationOutcome::Completed {
                migrated: 0,
                unchanged: 5
            }
        );
    }

    #[tokio::test]
    async fn test_removal_writes_null() {
        let store = seeded_store("u1", 3, "img1");
        let job = MigrationJob {
            owner_id: UserId::new("u1"),
            image_ref: None,
        };

        let outcome = migrator(Arc::clone(&store)).run(&job).await;

        assert!(outcome.is_completed());
        for doc in store.documents("posts") {
            assert!(doc.field("profileImageUrl").is_null());
        }
    }

    #[tokio::test]
    async fn test_owner_without_records_completes_empty() {
        let store = seeded_store("u2", 3, "img1");
        let job = MigrationJob {
            owner_id: UserId::new("u1"),
            image_ref: Some("img2".to_string()),
        };

        let outcome = migrator(store).run(&job).await;
        assert_eq!(
            outcome,
            MigrationOutcome::Completed {
                migrated: 0,
                unchanged: 0
            }
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(
            MigrationOutcome::Completed {
                migrated: 1,
                unchanged: 0
            }
            .label(),
            "completed"
        );
        assert_eq!(MigrationOutcome::Fatal("x".into()).label(), "fatal");
    }
}
