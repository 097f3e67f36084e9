//! Profile picture update flow
//!
//! The authoritative write is the only step whose failure reaches the
//! caller. Once it lands, the remaining steps run in a fixed order:
//! cache refresh, migration launch, broadcast.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Config, StoreConfig};
use crate::domain::{
    EventEnvelope, FieldValue, Fields, ImageHandle, ProfileEvent, ProfileRecord, UserId,
};
use crate::error::{CacheRefreshError, ReconcileError, Result, UpdateError};
use crate::repositories::RecordStore;
use crate::services::event_bus::EventBroadcaster;
use crate::services::identity::IdentityResolver;
use crate::services::image_source::ImageSource;
use crate::services::migrator::MigrationJob;
use crate::services::supervisor::{MigrationId, MigrationSupervisor};
use crate::ProfileImageCache;

/// Returned once the authoritative write has landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReceipt {
    pub owner_id: UserId,
    pub image_ref: Option<String>,
    /// Background fan-out started for this update
    pub migration_id: MigrationId,
}

pub struct UpdateCoordinator {
    store: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityResolver>,
    cache: Arc<ProfileImageCache>,
    image_source: Option<Arc<dyn ImageSource>>,
    supervisor: Arc<MigrationSupervisor>,
    broadcaster: Arc<dyn EventBroadcaster>,
    names: StoreConfig,
    cache_refresh_timeout: Duration,
    source_service: String,
}

impl UpdateCoordinator {
    pub fn new(
        config: &Config,
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityResolver>,
        cache: Arc<ProfileImageCache>,
        image_source: Option<Arc<dyn ImageSource>>,
        supervisor: Arc<MigrationSupervisor>,
        broadcaster: Arc<dyn EventBroadcaster>,
    ) -> Self {
        Self {
            store,
            identity,
            cache,
            image_source,
            supervisor,
            broadcaster,
            names: config.store.clone(),
            cache_refresh_timeout: config.cache_refresh_timeout,
            source_service: config.source_service.clone(),
        }
    }

    /// Set or clear the current user's profile picture.
    ///
    /// `None` removes the picture. The new image is loaded into the cache
    /// from the configured image source, if any.
    pub async fn update_profile_image(&self, image_ref: Option<String>) -> Result<UpdateReceipt> {
        self.apply(image_ref, None).await
    }

    /// Same as [`update_profile_image`](Self::update_profile_image) with an
    /// image the caller already holds, which goes into the cache as is.
    pub async fn update_profile_image_with_handle(
        &self,
        image_ref: String,
        image: ImageHandle,
    ) -> Result<UpdateReceipt> {
        self.apply(Some(image_ref), Some(image)).await
    }

    pub async fn remove_profile_picture(&self) -> Result<UpdateReceipt> {
        self.apply(None, None).await
    }

    /// Re-run the fan-out for `owner_id` from the reference currently held
    /// in the authoritative record. Used to repair records left behind by
    /// a partially failed migration.
    pub async fn reconcile(
        &self,
        owner_id: &UserId,
    ) -> std::result::Result<MigrationId, ReconcileError> {
        let doc = self
            .store
            .get_document(&self.names.users_collection, owner_id.as_str())
            .await?
            .ok_or_else(|| ReconcileError::NotFound(owner_id.clone()))?;
        let record = ProfileRecord::from_document(&doc, &self.names);

        let migration_id = self.supervisor.launch(MigrationJob {
            owner_id: record.user_id,
            image_ref: record.image_ref,
        });
        info!(owner_id = %owner_id, migration_id = %migration_id, "Reconciliation launched");
        Ok(migration_id)
    }

    async fn apply(
        &self,
        image_ref: Option<String>,
        image: Option<ImageHandle>,
    ) -> Result<UpdateReceipt> {
        let owner_id = self
            .identity
            .current_actor()
            .ok_or(UpdateError::Unauthenticated)?;

        if let Some(reference) = &image_ref {
            if reference.trim().is_empty() {
                return Err(UpdateError::InvalidImageReference(reference.clone()));
            }
        }

        let mut fields = Fields::new();
        fields.insert(
            self.names.image_field.clone(),
            FieldValue::from(image_ref.clone()),
        );
        fields.insert(
            self.names.updated_at_field.clone(),
            FieldValue::ServerTimestamp,
        );

        if let Err(e) = self
            .store
            .write_fields(&self.names.users_collection, owner_id.as_str(), fields)
            .await
        {
            error!(owner_id = %owner_id, error = %e, "Profile record write failed");
            return Err(UpdateError::AuthoritativeWriteFailed(e));
        }
        info!(owner_id = %owner_id, image_ref = ?image_ref, "Profile image updated");

        if let Some(reference) = &image_ref {
            if let Err(e) = self.refresh_cache(reference, image).await {
                warn!(
                    owner_id = %owner_id,
                    image_ref = %reference,
                    error = %e,
                    "Profile image cache refresh failed"
                );
            }
        }

        let migration_id = self.supervisor.launch(MigrationJob {
            owner_id: owner_id.clone(),
            image_ref: image_ref.clone(),
        });
        debug!(owner_id = %owner_id, migration_id = %migration_id, "Migration launched");

        self.broadcaster.publish(EventEnvelope::new(
            self.source_service.clone(),
            ProfileEvent::ProfilePictureUpdated {
                owner_id: owner_id.clone(),
                image_ref: image_ref.clone(),
            },
        ));

        Ok(UpdateReceipt {
            owner_id,
            image_ref,
            migration_id,
        })
    }

    async fn refresh_cache(
        &self,
        reference: &str,
        image: Option<ImageHandle>,
    ) -> std::result::Result<(), CacheRefreshError> {
        let image = match (image, &self.image_source) {
            (Some(image), _) => image,
            (None, Some(source)) => {
                tokio::time::timeout(self.cache_refresh_timeout, source.load(reference))
                    .await
                    .map_err(|_| CacheRefreshError::TimedOut(self.cache_refresh_timeout))??
            }
            (None, None) => {
                debug!(
                    image_ref = %reference,
                    "No image source configured, skipping cache refresh"
                );
                return Ok(());
            }
        };

        self.cache.set(reference.to_string(), image);
        Ok(())
    }
}
