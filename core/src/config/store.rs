//! Configuration Store
//!
//! Loads and saves `agentpact.toml`, applies environment overrides, and
//! merges programmatic patches. Every merge is last-write-wins per field;
//! fields a patch leaves unset keep their previous value.

use super::types::{LocalCredential, RemoteBackend, RemoteWalletConfig};
use crate::error::ConfigurationError;
use crate::ledger::{Commitment, ConfirmPolicy};
use crate::util::{sanitize_base_url, validate_api_key};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default RPC endpoint (devnet)
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Config file name searched for in standard locations
pub const CONFIG_FILE_NAME: &str = "agentpact.toml";

/// Largest page the RPC node will serve
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PactConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Level a write must reach before `publish` returns; `confirmed` or stricter
    #[serde(default)]
    pub commitment: Commitment,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_confirm_poll")]
    pub confirm_poll_ms: u64,

    /// Signatures fetched per history page
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Concurrent transaction fetches while scanning
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalCredential>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_wallet: Option<RemoteWalletConfig>,
}

impl Default for PactConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: Commitment::default(),
            request_timeout_secs: default_request_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            confirm_poll_ms: default_confirm_poll(),
            history_limit: default_history_limit(),
            fetch_concurrency: default_fetch_concurrency(),
            local: None,
            remote_wallet: None,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_confirm_timeout() -> u64 {
    60
}

fn default_confirm_poll() -> u64 {
    500
}

fn default_history_limit() -> usize {
    100
}

fn default_fetch_concurrency() -> usize {
    4
}

/// Partial configuration; `None` fields leave the target untouched
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub rpc_url: Option<String>,
    pub commitment: Option<Commitment>,
    pub request_timeout_secs: Option<u64>,
    pub confirm_timeout_secs: Option<u64>,
    pub confirm_poll_ms: Option<u64>,
    pub history_limit: Option<usize>,
    pub fetch_concurrency: Option<usize>,
    pub private_key: Option<String>,
    pub keypair_path: Option<PathBuf>,
    pub wallet_api_url: Option<String>,
    pub wallet_token: Option<String>,
    pub wallet_handle: Option<String>,
    pub wallet_backend: Option<RemoteBackend>,
}

impl std::fmt::Debug for ConfigPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPatch")
            .field("rpc_url", &self.rpc_url)
            .field("commitment", &self.commitment)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("keypair_path", &self.keypair_path)
            .field("wallet_api_url", &self.wallet_api_url)
            .field("wallet_token", &self.wallet_token.as_ref().map(|_| "<redacted>"))
            .field("wallet_handle", &self.wallet_handle)
            .field("wallet_backend", &self.wallet_backend)
            .finish_non_exhaustive()
    }
}

impl ConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn keypair_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.keypair_path = Some(path.into());
        self
    }

    pub fn remote_wallet(mut self, token: impl Into<String>, handle: impl Into<String>) -> Self {
        self.wallet_token = Some(token.into());
        self.wallet_handle = Some(handle.into());
        self
    }

    pub fn wallet_backend(mut self, backend: RemoteBackend) -> Self {
        self.wallet_backend = Some(backend);
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// Collect overrides from `AGENTPACT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            rpc_url: get("AGENTPACT_RPC_URL"),
            commitment: get("AGENTPACT_COMMITMENT").and_then(|v| v.parse().ok()),
            private_key: get("AGENTPACT_PRIVATE_KEY"),
            keypair_path: get("AGENTPACT_KEYPAIR_PATH").map(PathBuf::from),
            wallet_api_url: get("AGENTPACT_WALLET_API"),
            wallet_token: get("AGENTPACT_WALLET_TOKEN"),
            wallet_handle: get("AGENTPACT_WALLET_HANDLE"),
            wallet_backend: get("AGENTPACT_WALLET_BACKEND").and_then(|v| v.parse().ok()),
            ..Self::default()
        }
    }
}

impl PactConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        let config: PactConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file. Inline private keys are never written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(self)?;
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the first standard location that has a config file, or
    /// fall back to defaults
    pub fn load_or_default() -> Result<Self, ConfigurationError> {
        match super::find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Default config path in the user config directory
    pub fn default_path() -> Option<PathBuf> {
        super::get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Apply a patch, last-write-wins per field
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.rpc_url {
            self.rpc_url = v;
        }
        if let Some(v) = patch.commitment {
            self.commitment = v;
        }
        if let Some(v) = patch.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = patch.confirm_timeout_secs {
            self.confirm_timeout_secs = v;
        }
        if let Some(v) = patch.confirm_poll_ms {
            self.confirm_poll_ms = v;
        }
        if let Some(v) = patch.history_limit {
            self.history_limit = v;
        }
        if let Some(v) = patch.fetch_concurrency {
            self.fetch_concurrency = v;
        }

        if patch.private_key.is_some() || patch.keypair_path.is_some() {
            let local = self.local.get_or_insert_with(LocalCredential::default);
            if let Some(v) = patch.private_key {
                local.private_key = Some(v);
            }
            if let Some(v) = patch.keypair_path {
                local.keypair_path = Some(v);
            }
        }

        if patch.wallet_api_url.is_some()
            || patch.wallet_token.is_some()
            || patch.wallet_handle.is_some()
            || patch.wallet_backend.is_some()
        {
            let wallet = self.remote_wallet.get_or_insert_with(RemoteWalletConfig::default);
            if let Some(v) = patch.wallet_api_url {
                wallet.api_url = v;
            }
            if let Some(v) = patch.wallet_token {
                wallet.token = Some(v);
            }
            if let Some(v) = patch.wallet_handle {
                wallet.handle = Some(v);
            }
            if let Some(v) = patch.wallet_backend {
                wallet.backend = v;
            }
        }
    }

    /// Builder-style merge
    pub fn with(mut self, patch: ConfigPatch) -> Self {
        self.merge(patch);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        sanitize_base_url(&self.rpc_url, "rpc_url").map_err(|e| ConfigurationError::InvalidEndpoint {
            field: "rpc_url".to_string(),
            reason: e.to_string(),
        })?;

        if self.commitment < Commitment::MIN_DURABLE {
            return Err(ConfigurationError::InvalidValue(format!(
                "commitment must be at least {}, got {}",
                Commitment::MIN_DURABLE,
                self.commitment
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.confirm_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue(
                "confirm_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(ConfigurationError::InvalidValue(format!(
                "history_limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigurationError::InvalidValue(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(wallet) = self.remote_wallet.as_ref().filter(|w| w.is_complete()) {
            sanitize_base_url(&wallet.api_url, "remote_wallet.api_url").map_err(|e| {
                ConfigurationError::InvalidEndpoint {
                    field: "remote_wallet.api_url".to_string(),
                    reason: e.to_string(),
                }
            })?;
            if let Some(token) = &wallet.token {
                validate_api_key(token)
                    .map_err(|e| ConfigurationError::InvalidValue(format!("remote_wallet.token: {}", e)))?;
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            commitment: self.commitment,
            timeout: Duration::from_secs(self.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.confirm_poll_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PactConfig::default();
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut config = PactConfig::default().with(
            ConfigPatch::new()
                .endpoint("http://localhost:8899")
                .private_key("secret")
                .history_limit(25),
        );
        config.merge(ConfigPatch::new().remote_wallet("tok", "clawd"));

        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.local.as_ref().unwrap().private_key.as_deref(), Some("secret"));
        let wallet = config.remote_wallet.as_ref().unwrap();
        assert_eq!(wallet.handle.as_deref(), Some("clawd"));
        assert_eq!(wallet.api_url, super::super::types::DEFAULT_WALLET_API);

        config.merge(ConfigPatch::new().endpoint("https://api.mainnet-beta.solana.com"));
        assert_eq!(config.rpc_url, "https://api.mainnet-beta.solana.com");
        assert_eq!(config.local.as_ref().unwrap().private_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PactConfig::default().with(ConfigPatch::new().endpoint("devnet"));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidEndpoint { .. })
        ));

        let config = PactConfig::default().with(ConfigPatch::new().history_limit(0));
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidValue(_))));

        let config = PactConfig {
            commitment: Commitment::Processed,
            ..PactConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidValue(msg)) if msg.contains("commitment")));

        let config = PactConfig::default().with(ConfigPatch::new().remote_wallet("bad\ntoken", "clawd"));
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidValue(_))));
    }

    #[test]
    fn test_save_omits_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = PactConfig::default().with(
            ConfigPatch::new()
                .private_key("super-secret")
                .keypair_path("/tmp/id.json"),
        );
        config.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("super-secret"));
        assert!(written.contains("keypair_path"));

        let loaded = PactConfig::load(&path).unwrap();
        let local = loaded.local.unwrap();
        assert_eq!(local.private_key, None);
        assert_eq!(local.keypair_path, Some(PathBuf::from("/tmp/id.json")));
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
rpc_url = "http://127.0.0.1:8899"
commitment = "finalized"

[remote_wallet]
token = "tok"
handle = "clawd"
backend = "transaction_signing"
"#,
        )
        .unwrap();

        let config = PactConfig::load(&path).unwrap();
        assert_eq!(config.commitment, Commitment::Finalized);
        assert_eq!(config.fetch_concurrency, 4);
        let wallet = config.remote_wallet.unwrap();
        assert!(wallet.is_complete());
        assert_eq!(wallet.backend, RemoteBackend::TransactionSigning);
    }

    #[test]
    fn test_env_lookup() {
        let patch = ConfigPatch::from_lookup(|key| match key {
            "AGENTPACT_RPC_URL" => Some("http://localhost:8899".to_string()),
            "AGENTPACT_WALLET_HANDLE" => Some("pixel".to_string()),
            "AGENTPACT_WALLET_TOKEN" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(patch.rpc_url.as_deref(), Some("http://localhost:8899"));
        assert_eq!(patch.wallet_handle.as_deref(), Some("pixel"));
        assert_eq!(patch.wallet_token, None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = PactConfig::default().with(
            ConfigPatch::new()
                .private_key("super-secret")
                .remote_wallet("token-value", "clawd"),
        );
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("token-value"));
    }
}
