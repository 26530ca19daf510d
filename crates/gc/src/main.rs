use std::sync::Arc;

use gc_core::{config::Config, store::ConfigStore};
use gc_mongo::MongoStore;

#[tokio::main]
async fn main() -> Result<(), gc_core::Error> {
    gc_core::logging::init("gc")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn ConfigStore> =
        Arc::new(MongoStore::connect(&cfg.mongodb_uri, &cfg.mongodb_db).await?);

    gc_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| gc_core::Error::Transport(format!("bot failed: {e}")))?;

    Ok(())
}
