use anyhow::Context;
use recipe_catalog::{
    config::AppConfig,
    recipes::import,
    store::{PgStore, RecipeStore},
};

/// Usage: `import_recipes <recipes.json>`. Replaces the whole collection.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipe_catalog=info,import_recipes=info".to_string());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let path = std::env::args()
        .nth(1)
        .context("usage: import_recipes <recipes.json>")?;
    let config = AppConfig::from_env()?;
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to import recipes")?;

    let store = PgStore::connect(url, config.max_connections).await?;
    store.migrate().await.context("run migrations")?;

    let result = import::import_file(&store, &path, config.import_batch_size).await;
    store.close().await;
    let inserted = result?;
    tracing::info!(inserted, path = %path, "successfully imported recipes");
    Ok(())
}
