//! Loads decoded images for the cache refresh step

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{ImageData, ImageHandle};

#[derive(Debug, Error)]
pub enum ImageSourceError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch {reference}: {reason}")]
    Fetch { reference: String, reason: String },
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, reference: &str) -> Result<ImageHandle, ImageSourceError>;
}

/// Serves images registered up front, keyed by reference
#[derive(Debug, Default)]
pub struct StaticImageSource {
    images: DashMap<String, ImageHandle>,
}

impl StaticImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: Vec<u8>) -> ImageHandle {
        let reference = reference.into();
        let handle = Arc::new(ImageData::new(reference.clone(), bytes));
        self.images.insert(reference, Arc::clone(&handle));
        handle
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn load(&self, reference: &str) -> Result<ImageHandle, ImageSourceError> {
        self.images
            .get(reference)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ImageSourceError::NotFound(reference.to_string()))
    }
}
