pub mod config;

use std::path::PathBuf;

pub use config::{AppConfig, ConfigError, DatabaseConfig, Environment, DEFAULT_BIND_ADDR};

/// Loads `.env` from the working directory or its ancestors.
///
/// Returns the file that was applied, or `None` when there was nothing to load.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
