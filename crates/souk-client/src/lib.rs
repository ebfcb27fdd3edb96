pub mod chat;
pub mod config;
pub mod consistency;
pub mod error;
pub mod lifecycle;
pub mod listings;
pub mod profiles;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use souk_assets::{AssetStore, HostedAssetClient, LocalAssetStore};
use souk_shared::UserId;
use souk_store::{DocumentStore, ListingRecord};
use tracing_subscriber::{fmt, EnvFilter};

pub use crate::chat::ChatRepository;
pub use crate::config::ClientConfig;
pub use crate::consistency::{ConsistencyBatchWriter, OutgoingMessage};
pub use crate::error::{RepoError, Result};
pub use crate::lifecycle::{AssetLifecycleManager, CleanupReport};
pub use crate::listings::{ListingDraft, ListingRepository};
pub use crate::profiles::{ProfileChanges, ProfileRepository};

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("souk_client=debug,souk_store=info,souk_assets=info,warn")
    });

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// All repositories wired to one document store and one asset host.
pub struct Marketplace {
    pub config: ClientConfig,
    pub listings: ListingRepository,
    pub chat: ChatRepository,
    pub profiles: ProfileRepository,
    lifecycle: Arc<AssetLifecycleManager>,
}

impl Marketplace {
    /// Build the repositories. Assets go to `config.assets.local_dir` when
    /// set, else to the hosted service.
    pub async fn connect(config: ClientConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let credentials = config.assets.delete_credentials();

        let assets: Arc<dyn AssetStore> = match &config.assets.local_dir {
            Some(dir) => {
                let mut local = LocalAssetStore::new(
                    dir.clone(),
                    &config.assets.local_public_url,
                    config.assets.max_asset_size,
                )
                .await?;
                if let Some(credentials) = &credentials {
                    local = local.with_credentials(credentials.clone());
                }
                tracing::info!(dir = %dir.display(), "using local asset store");
                Arc::new(local)
            }
            None => {
                tracing::info!(cloud = %config.assets.cloud, "using hosted asset store");
                Arc::new(HostedAssetClient::new(&config.assets))
            }
        };

        if credentials.is_none() {
            tracing::warn!("no asset credentials configured, asset deletions will fail");
        }

        Ok(Self::with_assets(config, store, assets, credentials))
    }

    pub fn with_assets(
        config: ClientConfig,
        store: Arc<dyn DocumentStore>,
        assets: Arc<dyn AssetStore>,
        credentials: Option<souk_assets::DeleteCredentials>,
    ) -> Self {
        let lifecycle = Arc::new(AssetLifecycleManager::new(
            Arc::clone(&store),
            assets,
            credentials,
            config.upload_concurrency,
        ));

        Self {
            listings: ListingRepository::new(Arc::clone(&store), Arc::clone(&lifecycle))
                .with_page_size(config.page_size),
            chat: ChatRepository::new(Arc::clone(&store), Arc::clone(&lifecycle))
                .with_message_window(config.message_window),
            profiles: ProfileRepository::new(store, Arc::clone(&lifecycle)),
            lifecycle,
            config,
        }
    }

    pub fn lifecycle(&self) -> &Arc<AssetLifecycleManager> {
        &self.lifecycle
    }

    /// The user's favorited listings that still exist, in favorite order.
    pub async fn favorite_listings(&self, user: &UserId) -> Result<Vec<ListingRecord>> {
        let favorites = match self.profiles.get(user).await? {
            Some(profile) => profile.favorites,
            None => return Ok(Vec::new()),
        };
        self.listings.by_ids(&favorites).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{creds, file, FakeAssets};
    use futures::StreamExt;
    use souk_assets::AssetConfig;
    use souk_store::{MemoryStore, UserProfile};

    #[tokio::test]
    async fn local_store_wiring_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            assets: AssetConfig {
                local_dir: Some(dir.path().to_path_buf()),
                api_key: Some("key".to_string()),
                api_secret: Some("secret".to_string()),
                ..AssetConfig::default()
            },
            ..ClientConfig::default()
        };
        let market = Marketplace::connect(config, Arc::new(MemoryStore::new()))
            .await
            .unwrap();

        let draft = ListingDraft {
            title: "Desk".to_string(),
            price: 10.0,
            ..ListingDraft::default()
        };
        let id = market
            .listings
            .create("seller", &draft, vec![file("desk.jpg")])
            .await
            .unwrap();
        let listing = market.listings.get(&id).await.unwrap().unwrap();
        assert_eq!(listing.asset_ids.len(), 1);

        let report = market.listings.delete(&id).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), 1);
    }

    #[tokio::test]
    async fn favorites_resolve_to_listings() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let market = Marketplace::with_assets(
            ClientConfig::default(),
            store,
            Arc::new(FakeAssets::new()),
            Some(creds()),
        );
        let user = UserId::new("buyer");
        market
            .profiles
            .upsert(&UserProfile {
                id: "buyer".to_string(),
                ..UserProfile::default()
            })
            .await
            .unwrap();

        let a = market.listings.create("s", &ListingDraft::default(), Vec::new()).await.unwrap();
        let b = market.listings.create("s", &ListingDraft::default(), Vec::new()).await.unwrap();
        market.profiles.add_favorite(&user, b.as_str()).await.unwrap();
        market.profiles.add_favorite(&user, a.as_str()).await.unwrap();
        market.profiles.add_favorite(&user, "deleted-listing").await.unwrap();

        let favs = market.favorite_listings(&user).await.unwrap();
        let ids: Vec<&str> = favs.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), a.as_str()]);
    }

    #[test]
    fn config_sizes_reach_repositories() {
        let config = ClientConfig::from_lookup(|key| match key {
            "SOUK_PAGE_SIZE" => Some("7".to_string()),
            "SOUK_MESSAGE_WINDOW" => Some("12".to_string()),
            _ => None,
        });
        let market = Marketplace::with_assets(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(FakeAssets::new()),
            Some(creds()),
        );
        assert_eq!(market.listings.page_size(), 7);
        assert_eq!(market.chat.message_window(), 12);
    }

    #[tokio::test]
    async fn chat_between_users() {
        let market = Marketplace::with_assets(
            ClientConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(FakeAssets::new()),
            Some(creds()),
        );
        let thread = market
            .chat
            .get_or_create_thread("buyer", "seller", Some("L1"))
            .await
            .unwrap();
        let mut sub = market
            .chat
            .observe_recent_messages(&thread)
            .subscribe()
            .await
            .unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        market.chat.send_text(&thread, "buyer", "still available?").await.unwrap();
        let list = sub.next().await.unwrap().unwrap();
        assert_eq!(list[0].text.as_deref(), Some("still available?"));
    }
}
