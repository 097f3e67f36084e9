//! Profile image service
//!
//! Updates a user's profile picture and keeps its denormalized copies in
//! step:
//! - authoritative write to the user's profile record
//! - refresh of the shared in-process image cache
//! - background fan-out onto every record the user owns
//! - in-process notification of observers
//!
//! Only a failed authoritative write fails an update. Everything after it
//! is best effort and converges through later passes.

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod repositories;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use domain::{ImageData, ImageHandle, UserId};
pub use error::{ReconcileError, UpdateError};
pub use repositories::{InMemoryRecordStore, RecordStore, StoreError};
pub use services::{
    MigrationId, MigrationOutcome, MigrationStatus, ProfileImageService, UpdateReceipt,
};

/// Image cache holding decoded profile pictures keyed by reference
pub type ProfileImageCache = image_cache::ImageCache<ImageHandle>;
