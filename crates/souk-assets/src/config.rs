//! Asset host configuration loaded from environment variables.
//!
//! Upload settings (cloud + unsigned presets) and delete credentials are
//! separate: a client that only uploads never needs the API secret.

use std::path::PathBuf;

use souk_shared::constants::{AVATAR_FOLDER, CHAT_FOLDER, MAX_ASSET_SIZE};

use crate::client::DeleteCredentials;

/// Unsigned upload preset per upload purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPresets {
    pub listings: String,
    pub chat: String,
    pub avatars: String,
}

impl Default for UploadPresets {
    fn default() -> Self {
        Self {
            listings: "souk_listings".to_string(),
            chat: "souk_chat".to_string(),
            avatars: "souk_avatars".to_string(),
        }
    }
}

impl UploadPresets {
    /// Preset matching a destination folder; listings is the fallback.
    pub fn for_folder(&self, folder: &str) -> &str {
        match folder {
            CHAT_FOLDER => &self.chat,
            AVATAR_FOLDER => &self.avatars,
            _ => &self.listings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Base URL of the asset API.
    /// Env: `SOUK_ASSET_API_URL`
    /// Default: `https://api.cloudinary.com/v1_1`
    pub api_url: String,

    /// Cloud (account) name, the first path segment of every API call.
    /// Env: `SOUK_ASSET_CLOUD`
    /// Default: `souk`
    pub cloud: String,

    /// Env: `SOUK_PRESET_LISTINGS`, `SOUK_PRESET_CHAT`, `SOUK_PRESET_AVATARS`
    pub presets: UploadPresets,

    /// Env: `SOUK_ASSET_API_KEY`
    /// Default: unset (deletion disabled).
    pub api_key: Option<String>,

    /// Env: `SOUK_ASSET_API_SECRET`
    /// Default: unset (deletion disabled).
    pub api_secret: Option<String>,

    /// Store assets on the local filesystem instead of the hosted service.
    /// Env: `SOUK_LOCAL_ASSET_DIR`
    /// Default: unset.
    pub local_dir: Option<PathBuf>,

    /// Public base URL under which local assets are served.
    /// Env: `SOUK_LOCAL_ASSET_URL`
    /// Default: `http://localhost:8080/assets`
    pub local_public_url: String,

    /// Maximum accepted upload size in bytes (10 MiB).
    pub max_asset_size: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.cloudinary.com/v1_1".to_string(),
            cloud: "souk".to_string(),
            presets: UploadPresets::default(),
            api_key: None,
            api_secret: None,
            local_dir: None,
            local_public_url: "http://localhost:8080/assets".to_string(),
            max_asset_size: MAX_ASSET_SIZE,
        }
    }
}

impl AssetConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup("SOUK_ASSET_API_URL")) {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.api_url = url.trim_end_matches('/').to_string();
            } else {
                tracing::warn!(value = %url, "Invalid SOUK_ASSET_API_URL, using default");
            }
        }

        if let Some(cloud) = non_empty(lookup("SOUK_ASSET_CLOUD")) {
            config.cloud = cloud;
        }

        if let Some(preset) = non_empty(lookup("SOUK_PRESET_LISTINGS")) {
            config.presets.listings = preset;
        }
        if let Some(preset) = non_empty(lookup("SOUK_PRESET_CHAT")) {
            config.presets.chat = preset;
        }
        if let Some(preset) = non_empty(lookup("SOUK_PRESET_AVATARS")) {
            config.presets.avatars = preset;
        }

        config.api_key = non_empty(lookup("SOUK_ASSET_API_KEY"));
        config.api_secret = non_empty(lookup("SOUK_ASSET_API_SECRET"));

        if let Some(dir) = non_empty(lookup("SOUK_LOCAL_ASSET_DIR")) {
            config.local_dir = Some(PathBuf::from(dir));
        }

        if let Some(url) = non_empty(lookup("SOUK_LOCAL_ASSET_URL")) {
            config.local_public_url = url.trim_end_matches('/').to_string();
        }

        config
    }

    /// Delete credentials, when both key and secret are configured.
    pub fn delete_credentials(&self) -> Option<DeleteCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(DeleteCredentials::new(key, secret)),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("Only one of SOUK_ASSET_API_KEY / SOUK_ASSET_API_SECRET set, deletion disabled");
                None
            }
            (None, None) => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
