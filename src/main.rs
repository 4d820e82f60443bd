use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use ardas_legends::config::AppConfig;
use ardas_legends::db::{PgStore, migrate};
use ardas_legends::error::Result;
use ardas_legends::scheduler::run_healing_tick;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "heal scheduler stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    // Fail fast on a broken catalog file before touching the database.
    let catalog = config.unit_catalog()?;
    let store = PgStore::connect(&config).await?;
    migrate(store.pool()).await?;

    let mut interval = time::interval(config.heal_tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_secs = config.heal_tick_interval.as_secs(),
        max_connections = config.max_connections,
        unit_types = catalog.len(),
        "heal scheduler ready"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = tick(&store).await {
                    error!(error = %err, "healing tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    store.pool().close().await;
    Ok(())
}

async fn tick(store: &PgStore) -> Result<()> {
    let mut uow = store.begin().await?;
    match run_healing_tick(&mut uow, Utc::now()).await {
        Ok(_) => uow.commit().await,
        Err(err) => {
            uow.rollback().await?;
            Err(err)
        }
    }
}
