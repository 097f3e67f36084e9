pub mod coordinator;
pub mod event_bus;
pub mod identity;
pub mod image_source;
pub mod migrator;
pub mod profile_image;
pub mod supervisor;

pub use coordinator::{UpdateCoordinator, UpdateReceipt};
pub use event_bus::{EventBroadcaster, EventBus, ProfileEventObserver, SubscriptionId};
pub use identity::{IdentityResolver, StaticIdentity};
pub use image_source::{ImageSource, ImageSourceError, StaticImageSource};
pub use migrator::{DependentRecordMigrator, MigrationJob, MigrationOutcome};
pub use profile_image::ProfileImageService;
pub use supervisor::{MigrationId, MigrationStatus, MigrationSupervisor};
