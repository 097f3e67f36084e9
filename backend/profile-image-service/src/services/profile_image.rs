use std::sync::Arc;

use image_cache::{CacheMetrics, ImageCache};

use crate::config::Config;
use crate::domain::{ImageHandle, UserId};
use crate::error::{ReconcileError, Result};
use crate::repositories::RecordStore;
use crate::services::coordinator::{UpdateCoordinator, UpdateReceipt};
use crate::services::event_bus::EventBus;
use crate::services::identity::IdentityResolver;
use crate::services::image_source::ImageSource;
use crate::services::migrator::DependentRecordMigrator;
use crate::services::supervisor::{MigrationId, MigrationSupervisor};
use crate::ProfileImageCache;

/// Profile image service wired from a single [`Config`]
///
/// Owns the image cache, the event bus and the migration supervisor, and
/// hands out shared references to them.
pub struct ProfileImageService {
    cache: Arc<ProfileImageCache>,
    events: Arc<EventBus>,
    supervisor: Arc<MigrationSupervisor>,
    coordinator: UpdateCoordinator,
}

impl ProfileImageService {
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityResolver>,
        image_source: Option<Arc<dyn ImageSource>>,
    ) -> Self {
        let cache = Arc::new(
            ImageCache::with_policy(config.cache.max_size, config.cache.eviction)
                .with_metrics(CacheMetrics::new("profile_images")),
        );
        let events = Arc::new(EventBus::new());

        let migrator =
            DependentRecordMigrator::new(Arc::clone(&store), &config.store, &config.migration);
        let supervisor = Arc::new(MigrationSupervisor::new(
            Arc::new(migrator),
            config.migration.status_history,
        ));

        let coordinator = UpdateCoordinator::new(
            &config,
            store,
            identity,
            Arc::clone(&cache),
            image_source,
            Arc::clone(&supervisor),
            events.clone(),
        );

        Self {
            cache,
            events,
            supervisor,
            coordinator,
        }
    }

    pub fn cache(&self) -> &Arc<ProfileImageCache> {
        &self.cache
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn supervisor(&self) -> &Arc<MigrationSupervisor> {
        &self.supervisor
    }

    pub fn cached_image(&self, reference: &str) -> Option<ImageHandle> {
        self.cache.get(reference)
    }

    pub async fn update_profile_image(&self, image_ref: Option<String>) -> Result<UpdateReceipt> {
        self.coordinator.update_profile_image(image_ref).await
    }

    pub async fn update_profile_image_with_handle(
        &self,
        image_ref: String,
        image: ImageHandle,
    ) -> Result<UpdateReceipt> {
        self.coordinator
            .update_profile_image_with_handle(image_ref, image)
            .await
    }

    pub async fn remove_profile_picture(&self) -> Result<UpdateReceipt> {
        self.coordinator.remove_profile_picture().await
    }

    pub async fn reconcile(
        &self,
        owner_id: &UserId,
    ) -> std::result::Result<MigrationId, ReconcileError> {
        self.coordinator.reconcile(owner_id).await
    }

    /// Wait for every migration launched so far. Call before shutdown.
    pub async fn shutdown(&self) {
        self.supervisor.drain().await;
    }
}
