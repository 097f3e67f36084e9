//! In-process profile events
//!
//! Events are published after the authoritative write has landed, so an
//! observer may rely on the owner's own profile record being current. It
//! must not assume dependent records have been migrated yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::UserId;

/// Registered name of the picture-changed notification
pub const PROFILE_PICTURE_UPDATED: &str = "profilePictureUpdated";

/// Envelope stamped on every published event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event ID for tracing
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Service that generated the event
    pub source: String,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(source: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProfileEvent {
    /// The owner's profile picture changed; `None` means it was removed
    ProfilePictureUpdated {
        #[serde(rename = "ownerIdentity")]
        owner_id: UserId,
        #[serde(rename = "newImageReference")]
        image_ref: Option<String>,
    },
}

impl ProfileEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProfileEvent::ProfilePictureUpdated { .. } => PROFILE_PICTURE_UPDATED,
        }
    }

    pub fn owner_id(&self) -> &UserId {
        match self {
            ProfileEvent::ProfilePictureUpdated { owner_id, .. } => owner_id,
        }
    }

    /// String-keyed payload for observers that consume untyped notifications
    pub fn payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut payload = serde_json::Map::new();
        match self {
            ProfileEvent::ProfilePictureUpdated { owner_id, image_ref } => {
                payload.insert(
                    "ownerIdentity".to_string(),
                    serde_json::Value::String(owner_id.to_string()),
                );
                payload.insert(
                    "newImageReference".to_string(),
                    image_ref
                        .clone()
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null),
                );
            }
        }
        payload
    }
}
