use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use curio_core::config::Config;
use curio_core::db::{self, PgItemRepository, RedisCounterStore};
use curio_core::services::ReconciliationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    let redis_client = db::create_redis_client(&config.redis_url)?;

    let store = Arc::new(RedisCounterStore::new(redis_client));
    let items = Arc::new(PgItemRepository::new(pool));

    let service = Arc::new(ReconciliationService::new(store, items));
    let handle = service.spawn(Duration::from_secs(config.sync_interval_secs));

    tracing::info!("curio-syncd running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    // Final reconciliation pass runs inside shutdown
    handle.shutdown().await;

    Ok(())
}
