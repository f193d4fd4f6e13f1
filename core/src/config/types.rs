use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default remote wallet service
pub const DEFAULT_WALLET_API: &str = "https://agentwallet.mcpay.tech/api";

/// Capability of the remote wallet backend
///
/// The hosted AgentWallet service only exposes generic message signing, so
/// that is the default. Backends with a real transaction-signing endpoint
/// opt in with `transaction_signing`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackend {
    /// Signs arbitrary messages only; transaction writes are refused
    #[default]
    MessageSigningOnly,
    /// Exposes `wallets/{handle}/sign-transaction`
    TransactionSigning,
}

impl RemoteBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteBackend::MessageSigningOnly => "message_signing_only",
            RemoteBackend::TransactionSigning => "transaction_signing",
        }
    }
}

impl std::fmt::Display for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RemoteBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "message_signing_only" | "message" => Ok(RemoteBackend::MessageSigningOnly),
            "transaction_signing" | "transaction" => Ok(RemoteBackend::TransactionSigning),
            _ => Err(format!("Unknown wallet backend: {}", s)),
        }
    }
}

/// Locally held key material
///
/// `private_key` is accepted from files and the environment but never
/// written back out.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocalCredential {
    /// Base58, base64, or JSON byte-array encoded keypair
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    /// Path to a Solana CLI keypair file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair_path: Option<PathBuf>,
}

impl LocalCredential {
    pub fn is_empty(&self) -> bool {
        self.private_key.is_none() && self.keypair_path.is_none()
    }
}

impl std::fmt::Debug for LocalCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredential")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("keypair_path", &self.keypair_path)
            .finish()
    }
}

/// Delegated signing through an HTTP wallet service
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteWalletConfig {
    #[serde(default = "default_wallet_api")]
    pub api_url: String,

    /// Bearer token for the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Account handle the wallet is registered under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    #[serde(default)]
    pub backend: RemoteBackend,
}

impl Default for RemoteWalletConfig {
    fn default() -> Self {
        Self {
            api_url: default_wallet_api(),
            token: None,
            handle: None,
            backend: RemoteBackend::default(),
        }
    }
}

impl RemoteWalletConfig {
    /// Token and handle are both present
    pub fn is_complete(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
            && self.handle.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

impl std::fmt::Debug for RemoteWalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWalletConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("handle", &self.handle)
            .field("backend", &self.backend)
            .finish()
    }
}

fn default_wallet_api() -> String {
    DEFAULT_WALLET_API.to_string()
}
