pub mod migrate;
pub mod schema;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use idem_core::{mask_database_url, MigrateConfig};
use idem_migrate::{
    DatabaseBackendRegistry, DatabasePool, DatabasePoolConfig, MigrationPlan, SplitMode,
};

use crate::release::release_plan;

/// Open a pool for the configured database URL
pub async fn connect(config: &MigrateConfig) -> anyhow::Result<Arc<dyn DatabasePool>> {
    let url = config.require_database_url()?;
    tracing::info!("Connecting to {}", mask_database_url(url));

    DatabaseBackendRegistry::with_defaults()
        .create_pool(url, DatabasePoolConfig::from_config(config))
        .await
        .with_context(|| format!("failed to connect to {}", mask_database_url(url)))
}

/// The YAML plan at `path`, or the built-in release plan
pub fn load_plan(path: Option<&Path>, split_mode: Option<SplitMode>) -> anyhow::Result<MigrationPlan> {
    let plan = match path {
        Some(path) => MigrationPlan::from_file(path)
            .with_context(|| format!("failed to load plan {}", path.display()))?,
        None => release_plan()?,
    };

    Ok(match split_mode {
        Some(mode) => plan.with_split_mode(mode),
        None => plan,
    })
}
