use crate::api;
use crate::bootstrap::{self, BootstrapResources};
use crate::config::DojoConfig;
use crate::database::{Database, ReconcileReport};
use crate::error::ForumResult;
use crate::seed::{self, SeedOutcome};
use anyhow::Result;

/// Bootstraps the backend once and hands out handles to whichever entrypoint
/// (REST server, seeding, counter reconciliation) needs them.
pub struct DojoNode {
    config: DojoConfig,
    bootstrap: BootstrapResources,
}

impl DojoNode {
    pub fn start(config: DojoConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config)?;

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            db_path = %config.paths.db_path.display(),
            "dojo node initialized"
        );

        Ok(Self { config, bootstrap })
    }

    /// Runs the REST API server until shutdown.
    pub async fn run_http_server(&self) -> Result<()> {
        api::serve_http(self.config.clone(), self.database()).await
    }

    pub fn seed(&self) -> ForumResult<SeedOutcome> {
        seed::seed(&self.bootstrap.database)
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        self.bootstrap.database.reconcile_counters()
    }

    /// Returns a clone of the database handle.
    pub fn database(&self) -> Database {
        self.bootstrap.database.clone()
    }
}
