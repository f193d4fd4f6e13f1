//! Configuration management
//!
//! `PactConfig` is the single explicit configuration object owned by a
//! client. It is assembled from defaults, an optional `agentpact.toml`,
//! `AGENTPACT_*` environment variables, and programmatic patches.

pub mod store;
pub mod types;

pub use store::{ConfigPatch, PactConfig, CONFIG_FILE_NAME, DEFAULT_RPC_URL, MAX_HISTORY_LIMIT};
pub use types::{LocalCredential, RemoteBackend, RemoteWalletConfig, DEFAULT_WALLET_API};

use std::path::PathBuf;

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(dir) = get_config_dir() {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    // Fall back to ~/.config even where the platform config dir differs
    if let Some(home) = home::home_dir() {
        let path = home.join(".config").join("agentpact").join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    use dirs::config_dir;
    use home::home_dir;

    if let Some(dir) = config_dir() {
        return Some(dir.join("agentpact"));
    }

    if let Some(home) = home_dir() {
        return Some(home.join(".config").join("agentpact"));
    }

    None
}

/// Load the effective configuration: file (or defaults), then environment
pub fn load_effective(explicit_path: Option<&std::path::Path>) -> Result<PactConfig, crate::error::ConfigurationError> {
    let base = match explicit_path {
        Some(path) => PactConfig::load(path)?,
        None => PactConfig::load_or_default()?,
    };
    Ok(base.with(ConfigPatch::from_env()))
}
