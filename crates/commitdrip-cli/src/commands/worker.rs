//! Long-running worker and database maintenance.

use anyhow::{Context, Result};
use commitdrip_config::EngineConfig;
use commitdrip_scheduler::{DispatchConfig, Worker};
use tracing::info;

use crate::engine::Engine;
use crate::shutdown::install_shutdown_handler;

pub async fn run(engine: &Engine) -> Result<()> {
    let shutdown = install_shutdown_handler();
    let runner = engine.runner(shutdown.clone());

    let worker = Worker::new(
        engine.queue.clone(),
        engine.jobs.clone(),
        runner,
        DispatchConfig::from(&engine.config.worker),
    );
    worker.run(shutdown).await;
    Ok(())
}

pub async fn migrate(config: &EngineConfig) -> Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("No database URL configured (set database url or DATABASE_URL)")?;

    let pool = commitdrip_db::create_pool(url)
        .await
        .context("Failed to connect to database")?;
    commitdrip_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    info!("Migrations applied");
    Ok(())
}
