use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::core::config::Config;
use crate::core::routes::PROTECTED_ROUTES;
use crate::services::users::ensure_admin;
use crate::stores::database::Database;
use crate::wal::wal::Wal;

/// Replay the WAL into a fresh database, compacting it afterwards if configured
pub fn open_database(config: &Config) -> Result<Database> {
    let wal_path = &config.storage.wal_path;
    if let Some(dir) = wal_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create WAL directory: {}", dir.display()))?;
    }

    let wal = Wal::new(wal_path.clone()).context("Failed to initialize WAL")?;
    let database = Database::open(Arc::new(wal))?;

    info!(
        wal_path = %wal_path.display(),
        users = database.user_count(),
        grants = database.grant_count(),
        "WAL replay completed"
    );

    if config.storage.compact_on_startup {
        database.compact().context("Failed to compact WAL")?;
        info!("WAL compacted");
    }

    Ok(database)
}

/// Create the configured administrator if it does not exist yet
pub async fn seed_bootstrap_admin(config: &Config, database: &Database) -> Result<()> {
    let Some(bootstrap) = &config.bootstrap else {
        return Ok(());
    };

    let created = ensure_admin(
        database,
        &bootstrap.fullname,
        &bootstrap.email,
        &bootstrap.password,
        &PROTECTED_ROUTES,
    )
    .await
    .context("Failed to seed bootstrap administrator")?;

    match created {
        Some(id) => info!(user_id = id, email = %bootstrap.email, "Bootstrap administrator created"),
        None => info!(email = %bootstrap.email, "Bootstrap administrator already present"),
    }

    Ok(())
}
