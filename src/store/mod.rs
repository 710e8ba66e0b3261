use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::recipes::model::{Recipe, RecipeDocument};
use crate::recipes::pipeline::Pipeline;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid recipe id `{0}`")]
    InvalidId(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unsupported pipeline: {0}")]
    Pipeline(String),
}

/// Document store holding the recipe collection.
///
/// Reads are not isolated from concurrent writes: a `count` followed by an
/// `aggregate` may observe different collections.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Runs every stage of `pipeline` and returns the resulting documents.
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Recipe>, StoreError>;

    /// Counts the candidates of a pipeline made only of derive and filter
    /// stages.
    async fn count(&self, pipeline: &Pipeline) -> Result<u64, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Recipe>, StoreError>;

    /// Clears the collection, then inserts `docs` in batches of `batch_size`.
    async fn replace_all(
        &self,
        docs: Vec<RecipeDocument>,
        batch_size: usize,
    ) -> Result<u64, StoreError>;

    async fn close(&self);
}

pub fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}
