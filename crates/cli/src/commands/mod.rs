//! Subcommand implementations and the wiring they share.

pub mod backup;
pub mod books;
pub mod characters;
pub mod chat;
pub mod init;
pub mod models;

use std::sync::Arc;

use parlor_config::AppConfig;
use parlor_core::event::EventBus;
use parlor_engine::DeliveryController;
use parlor_memory::{FileStore, Repository};
use parlor_providers::{ProviderAdapter, ReqwestTransport};

/// Loaded config plus the collaborators built from it.
pub struct Runtime {
    pub config: AppConfig,
    pub repository: Repository,
    pub transport: Arc<ReqwestTransport>,
    pub adapter: Arc<ProviderAdapter>,
    pub controller: DeliveryController,
}

impl Runtime {
    pub async fn boot() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

        let path = config.storage.data_path();
        let store = FileStore::open(&path)
            .map_err(|e| format!("Failed to open data file {}: {e}", path.display()))?
            .with_quota(config.storage.quota_bytes);
        let repository = Repository::new(Arc::new(store));

        let transport = Arc::new(ReqwestTransport::new()?);
        let adapter = Arc::new(ProviderAdapter::new(transport.clone()));
        let controller = DeliveryController::load(
            &config,
            repository.clone(),
            adapter.clone(),
            Arc::new(EventBus::default()),
        )
        .await?;

        Ok(Self {
            config,
            repository,
            transport,
            adapter,
            controller,
        })
    }

    /// Resolve a character by id or name; the first character when `None`.
    pub async fn character_id(&self, wanted: Option<&str>) -> Result<String, Box<dyn std::error::Error>> {
        let found = self
            .controller
            .read(|state| {
                let conversations = &state.conversations;
                match wanted {
                    Some(w) => conversations.find(w).map(|c| c.id.clone()),
                    None => conversations.characters().first().map(|c| c.id.clone()),
                }
            })
            .await;
        found.ok_or_else(|| {
            let message = match wanted {
                Some(w) => format!("No character named '{w}'. Run `parlor characters` to list them."),
                None => "No characters stored".to_string(),
            };
            message.into()
        })
    }
}
