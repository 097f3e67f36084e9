pub mod events;
pub mod models;

pub use events::{EventEnvelope, ProfileEvent, PROFILE_PICTURE_UPDATED};
pub use models::{
    DependentRecord, Document, FieldValue, Fields, ImageData, ImageHandle, ProfileRecord, UserId,
};
