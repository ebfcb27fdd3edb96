use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use souk_assets::UploadFile;
use souk_shared::constants::{AVATAR_FOLDER, USERS};
use souk_shared::{AssetReference, UserId};
use souk_store::{CollectionPath, DocumentPath, DocumentStore, Patch, SetMode, UserProfile};
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::lifecycle::AssetLifecycleManager;

/// Profile fields a user edits directly. `None` leaves the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

pub struct ProfileRepository {
    store: Arc<dyn DocumentStore>,
    lifecycle: Arc<AssetLifecycleManager>,
}

fn profile_path(user: &UserId) -> DocumentPath {
    CollectionPath::new(USERS).doc(user.as_str())
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn DocumentStore>, lifecycle: Arc<AssetLifecycleManager>) -> Self {
        Self { store, lifecycle }
    }

    pub async fn get(&self, user: &UserId) -> Result<Option<UserProfile>> {
        match self.store.get(&profile_path(user)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Write the whole profile, merging into any existing document so fields
    /// owned elsewhere (favorites, push token) survive.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        if profile.id.trim().is_empty() {
            return Err(RepoError::InvalidArgument("profile has no id".to_string()));
        }
        let user = UserId::new(profile.id.clone());
        let patch = Patch::new()
            .set("email", profile.email.as_str())
            .set("displayName", profile.display_name.as_str())
            .set("org", profile.org.as_str())
            .set("contact", opt(profile.contact.as_deref()));
        self.store
            .set(&profile_path(&user), patch, SetMode::Merge)
            .await?;
        info!(user = %user, "profile saved");
        Ok(())
    }

    /// Apply the given changes to an existing profile.
    pub async fn update_fields(&self, user: &UserId, changes: &ProfileChanges) -> Result<()> {
        let patch = Patch::from_serializable(changes)?;
        if patch.is_empty() {
            return Ok(());
        }
        self.store.update(&profile_path(user), patch).await?;
        debug!(user = %user, "profile fields updated");
        Ok(())
    }

    /// Upload a new avatar and drop the previous one from the asset host.
    pub async fn replace_avatar(&self, user: &UserId, file: UploadFile) -> Result<AssetReference> {
        self.lifecycle
            .replace_single_asset(&profile_path(user), file, AVATAR_FOLDER, "avatarUrl", "avatarId")
            .await
    }

    pub async fn add_favorite(&self, user: &UserId, listing_id: &str) -> Result<()> {
        self.store
            .update(&profile_path(user), Patch::new().array_union("favorites", [listing_id]))
            .await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, user: &UserId, listing_id: &str) -> Result<()> {
        self.store
            .update(&profile_path(user), Patch::new().array_remove("favorites", [listing_id]))
            .await?;
        Ok(())
    }

    /// Store the device push token, or clear it with `None`.
    pub async fn set_push_token(&self, user: &UserId, token: Option<&str>) -> Result<()> {
        self.store
            .set(
                &profile_path(user),
                Patch::new().set("pushToken", opt(token)),
                SetMode::Merge,
            )
            .await?;
        Ok(())
    }
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}
