//! Application state shared by every command.
//!
//! Resolves the data directory and configuration, opens the knowledge graph
//! and builds the workflow executor on demand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use medallion_core::workflow::executor::DagExecutor;
use medallion_infra::config::{load_config_file, load_global_config, resolve_database_url};
use medallion_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use medallion_infra::llm::build_registry;
use medallion_infra::sqlite::graph::SqliteGraphRepository;
use medallion_infra::sqlite::pool::DatabasePool;
use medallion_types::config::GlobalConfig;

pub type ConcreteExecutor = DagExecutor<SqliteGraphRepository>;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub repo: Arc<SqliteGraphRepository>,
}

impl AppState {
    /// Load configuration and open the database (creating it on first use).
    pub async fn init(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = match config_path {
            Some(path) => load_config_file(path).await?,
            None => load_global_config(&data_dir).await,
        };

        let db_url = resolve_database_url(&config, &data_dir);
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open knowledge graph at {db_url}"))?;
        tracing::debug!(data_dir = %data_dir.display(), "knowledge graph opened");

        Ok(Self {
            data_dir,
            config,
            repo: Arc::new(SqliteGraphRepository::new(pool)),
        })
    }

    /// Build an executor over every configured provider.
    ///
    /// Providers are only constructed here so commands that never generate
    /// text do not need API keys.
    pub fn executor(&self) -> anyhow::Result<ConcreteExecutor> {
        let registry = build_registry(&self.config).context("failed to configure providers")?;
        if registry.is_empty() {
            tracing::warn!(
                "no providers configured; add [providers.<name>] to {}",
                medallion_infra::filesystem::config_path(&self.data_dir).display()
            );
        }

        Ok(DagExecutor::new(self.repo.clone(), Arc::new(registry))
            .with_generation_defaults(self.config.generation.clone()))
    }

    pub async fn close(&self) {
        self.repo.pool().close().await;
    }
}
