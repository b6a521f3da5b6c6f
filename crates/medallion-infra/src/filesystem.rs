//! Data directory layout.
//!
//! Everything Medallion keeps locally lives under one directory:
//!
//! ```text
//! {data_dir}/
//!   config.toml     provider registrations and generation defaults
//!   medallion.db    the knowledge graph
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MEDALLION_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `MEDALLION_DATA_DIR` environment variable
/// 2. `~/.medallion`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".medallion");
    }

    // Last resort: current directory
    PathBuf::from(".medallion")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("medallion.db")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}
