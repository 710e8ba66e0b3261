use crate::config::AppConfig;
use crate::recipes::import;
use crate::store::{MemoryStore, PgStore, RecipeStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecipeStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn RecipeStore> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url, config.max_connections).await?;
                // Run migrations if present
                if let Err(e) = store.migrate().await {
                    warn!(error = %e, "migration failed; continuing");
                }
                info!("using postgres recipe store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory recipe store");
                let store = MemoryStore::new();
                if let Some(path) = &config.seed_path {
                    import::import_file(&store, path, config.import_batch_size)
                        .await
                        .with_context(|| format!("seed in-memory store from {path}"))?;
                }
                Arc::new(store)
            }
        };

        Ok(Self {
            store,
            config: Arc::new(config),
        })
    }

    pub fn from_parts(store: Arc<dyn RecipeStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// Empty in-memory store with default config.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(MemoryStore::new()), Arc::new(AppConfig::default()))
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
        info!("recipe store closed");
    }
}
