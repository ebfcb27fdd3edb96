//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client runs with zero configuration
//! against a local asset directory or the default hosted cloud.

use souk_assets::AssetConfig;
use souk_shared::constants::{DEFAULT_MESSAGE_WINDOW, DEFAULT_PAGE_SIZE, DEFAULT_UPLOAD_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Items per page when browsing listings.
    /// Env: `SOUK_PAGE_SIZE`
    /// Default: `20`
    pub page_size: usize,

    /// Uploads kept in flight at once by the asset lifecycle manager.
    /// Env: `SOUK_UPLOAD_CONCURRENCY`
    /// Default: `3`
    pub upload_concurrency: usize,

    /// Number of most recent messages kept in a chat flow.
    /// Env: `SOUK_MESSAGE_WINDOW`
    /// Default: `50`
    pub message_window: usize,

    /// Asset host settings (`SOUK_ASSET_*`, `SOUK_PRESET_*`, `SOUK_LOCAL_ASSET_*`).
    pub assets: AssetConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            message_window: DEFAULT_MESSAGE_WINDOW,
            assets: AssetConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            assets: AssetConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(val) = lookup("SOUK_PAGE_SIZE") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid SOUK_PAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("SOUK_UPLOAD_CONCURRENCY") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.upload_concurrency = n,
                _ => tracing::warn!(value = %val, "Invalid SOUK_UPLOAD_CONCURRENCY, using default"),
            }
        }

        if let Some(val) = lookup("SOUK_MESSAGE_WINDOW") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.message_window = n,
                _ => tracing::warn!(value = %val, "Invalid SOUK_MESSAGE_WINDOW, using default"),
            }
        }

        config
    }
}
