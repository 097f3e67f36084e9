/// Configuration management for the profile image service
///
/// Loads configuration from environment variables. Every value has a default
/// so an unset environment yields a working in-process setup.
use anyhow::{ensure, Context, Result};
use image_cache::EvictionPolicy;
use std::str::FromStr;
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub migration: MigrationConfig,
    /// Upper bound on loading the new picture into the cache
    pub cache_refresh_timeout: Duration,
    /// Stamped on published events
    pub source_service: String,
}

/// Image cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Fixed for the lifetime of the cache
    pub max_size: usize,
    pub eviction: EvictionPolicy,
}

/// Collection and field names used in the record store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Authoritative profile records, keyed by user id
    pub users_collection: String,
    /// Content records carrying a denormalized image reference
    pub posts_collection: String,
    pub image_field: String,
    pub updated_at_field: String,
    pub owner_field: String,
    /// Documents fetched per page when enumerating an owner's records
    pub page_size: usize,
}

/// Fan-out migration settings
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Record writes in flight at once within a single run
    pub concurrency: usize,
    /// Error messages kept on a partial failure
    pub max_error_samples: usize,
    /// Finished runs the supervisor keeps statuses for
    pub status_history: usize,
}

// Default values
fn default_cache_refresh_timeout_ms() -> u64 {
    3000
}

fn default_source_service() -> String {
    "profile-image-service".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            migration: MigrationConfig::default(),
            cache_refresh_timeout: Duration::from_millis(default_cache_refresh_timeout_ms()),
            source_service: default_source_service(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: image_cache::DEFAULT_MAX_CACHE_SIZE,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            users_collection: "users".to_string(),
            posts_collection: "posts".to_string(),
            image_field: "profileImageUrl".to_string(),
            updated_at_field: "updatedAt".to_string(),
            owner_field: "ownerUid".to_string(),
            page_size: 50,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_error_samples: 5,
            status_history: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let cache = CacheConfig {
            max_size: parse_env(
                "PROFILE_IMAGE_CACHE_MAX_SIZE",
                image_cache::DEFAULT_MAX_CACHE_SIZE,
            )?,
            eviction: parse_env("PROFILE_IMAGE_CACHE_EVICTION", EvictionPolicy::Fifo)?,
        };

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            users_collection: string_env("PROFILE_USERS_COLLECTION", defaults.users_collection),
            posts_collection: string_env("PROFILE_POSTS_COLLECTION", defaults.posts_collection),
            image_field: string_env("PROFILE_IMAGE_FIELD", defaults.image_field),
            updated_at_field: string_env("PROFILE_UPDATED_AT_FIELD", defaults.updated_at_field),
            owner_field: string_env("PROFILE_OWNER_FIELD", defaults.owner_field),
            page_size: parse_env("PROFILE_STORE_PAGE_SIZE", defaults.page_size)?,
        };

        let defaults = MigrationConfig::default();
        let migration = MigrationConfig {
            concurrency: parse_env("PROFILE_MIGRATION_CONCURRENCY", defaults.concurrency)?,
            max_error_samples: parse_env(
                "PROFILE_MIGRATION_MAX_ERROR_SAMPLES",
                defaults.max_error_samples,
            )?,
            status_history: parse_env(
                "PROFILE_MIGRATION_STATUS_HISTORY",
                defaults.status_history,
            )?,
        };

        let cache_refresh_timeout = Duration::from_millis(parse_env(
            "PROFILE_CACHE_REFRESH_TIMEOUT_MS",
            default_cache_refresh_timeout_ms(),
        )?);

        let config = Config {
            cache,
            store,
            migration,
            cache_refresh_timeout,
            source_service: string_env("PROFILE_SOURCE_SERVICE", default_source_service()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.cache.max_size > 0, "cache max_size must be greater than 0");
        ensure!(self.store.page_size > 0, "store page_size must be greater than 0");
        ensure!(
            self.migration.concurrency > 0,
            "migration concurrency must be greater than 0"
        );
        ensure!(
            self.migration.status_history > 0,
            "migration status_history must be greater than 0"
        );
        Ok(())
    }
}

fn string_env(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        _ => Ok(default),
    }
}
