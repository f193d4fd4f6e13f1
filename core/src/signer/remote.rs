//! Remote wallet signer
//!
//! Delegates authorization to an HTTP wallet service addressed by bearer
//! token and account handle. The service's public key is looked up once
//! and reused for every later write.

use super::{attach, PendingWrite, TransactionSigner};
use crate::config::{RemoteBackend, RemoteWalletConfig};
use crate::error::{ConfigurationError, Error, NetworkError, PublishError, SigningError};
use crate::ledger::{submit_and_confirm, ConfirmPolicy, LedgerRpc, Pubkey, Signature, Transaction};
use crate::util::{sanitize_base_url, validate_api_key};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client as HttpClient, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletInfo {
    solana_address: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

/// Signs through an external wallet service
pub struct RemoteWalletSigner {
    api_url: String,
    token: String,
    handle: String,
    backend: RemoteBackend,
    http_client: HttpClient,
    timeout: Duration,
    ledger: Arc<dyn LedgerRpc>,
    policy: ConfirmPolicy,
    identity: OnceCell<Pubkey>,
}

impl RemoteWalletSigner {
    pub fn new(
        config: &RemoteWalletConfig,
        ledger: Arc<dyn LedgerRpc>,
        policy: ConfirmPolicy,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let api_url = sanitize_base_url(&config.api_url, "remote_wallet.api_url").map_err(|e| {
            ConfigurationError::InvalidEndpoint {
                field: "remote_wallet.api_url".to_string(),
                reason: e.to_string(),
            }
        })?;
        let token = validate_api_key(config.token.as_deref().unwrap_or_default())
            .map_err(|e| ConfigurationError::InvalidValue(format!("remote_wallet.token: {}", e)))?;
        let handle = config
            .handle
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigurationError::InvalidValue("remote_wallet.handle is empty".to_string()))?
            .to_string();

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("agentpact/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationError::InvalidEndpoint {
                field: "remote_wallet.api_url".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            api_url,
            token,
            handle,
            backend: config.backend,
            http_client,
            timeout,
            ledger,
            policy,
            identity: OnceCell::new(),
        })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn backend(&self) -> RemoteBackend {
        self.backend
    }

    /// Identity from an earlier lookup, if any
    pub fn cached_identity(&self) -> Option<Pubkey> {
        self.identity.get().copied()
    }

    /// `{api}/wallets/{handle}/...` with each segment escaped
    fn endpoint(&self, tail: &[&str]) -> Result<Url, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidEndpoint {
            field: "remote_wallet.api_url".to_string(),
            reason,
        };
        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("wallets")
            .push(&self.handle)
            .extend(tail);
        Ok(url)
    }

    /// Look up the service's public key for the handle
    pub async fn resolve_identity(&self) -> Result<Pubkey, PublishError> {
        let pubkey = self
            .identity
            .get_or_try_init(|| async {
                let unresolved = |reason: String| SigningError::UnresolvedIdentity {
                    handle: self.handle.clone(),
                    reason,
                };

                let url = self.endpoint(&[])?;
                let response = self
                    .http_client
                    .get(url)
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| unresolved(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(PublishError::from(unresolved(format!("HTTP {}: {}", status.as_u16(), body))));
                }

                let info: WalletInfo = response.json().await.map_err(|e| unresolved(e.to_string()))?;
                let pubkey = info
                    .solana_address
                    .parse::<Pubkey>()
                    .map_err(|e| unresolved(format!("invalid address: {}", e)))?;
                tracing::debug!(handle = %self.handle, identity = %pubkey, "resolved wallet identity");
                Ok::<_, PublishError>(pubkey)
            })
            .await?;
        Ok(*pubkey)
    }

    async fn request_signature(&self, message: &[u8]) -> Result<Signature, PublishError> {
        let url = self.endpoint(&["sign-transaction"])?;
        let body = json!({
            "message": base64::engine::general_purpose::STANDARD.encode(message),
            "encoding": "base64",
        });

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest("sign-transaction", e, self.timeout))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(NetworkError::HttpStatus {
                operation: "sign-transaction".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SigningError::Rejected {
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            }
            .into());
        }

        let signed: SignResponse = response.json().await.map_err(|e| SigningError::Rejected {
            reason: format!("unreadable response: {}", e),
        })?;
        let signature = signed.signature.parse::<Signature>().map_err(|e| SigningError::Rejected {
            reason: format!("invalid signature: {}", e),
        })?;
        Ok(signature)
    }
}

impl std::fmt::Debug for RemoteWalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWalletSigner")
            .field("api_url", &self.api_url)
            .field("handle", &self.handle)
            .field("backend", &self.backend)
            .field("identity", &self.identity.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionSigner for RemoteWalletSigner {
    fn name(&self) -> &'static str {
        "remote_wallet"
    }

    async fn sign_and_submit(&self, write: &PendingWrite) -> Result<Signature, PublishError> {
        let identity = self.resolve_identity().await?;
        let checkpoint = self.ledger.latest_checkpoint().await?;
        let mut tx = Transaction::new_unsigned(write.to_message(identity, checkpoint.blockhash));
        let message = tx.message_bytes();

        match self.backend {
            RemoteBackend::MessageSigningOnly => Err(SigningError::UnsupportedByBackend {
                backend: self.backend.to_string(),
            }
            .into()),
            RemoteBackend::TransactionSigning => {
                let signature = self.request_signature(&message).await?;
                if !identity.verify(&message, &signature) {
                    return Err(SigningError::Rejected {
                        reason: "signature does not verify against wallet identity".to_string(),
                    }
                    .into());
                }
                attach(&mut tx, &identity, signature)?;

                let wire = tx.serialize();
                let confirmed = submit_and_confirm(self.ledger.as_ref(), &wire, &checkpoint, &self.policy).await?;
                Ok(confirmed)
            }
        }
    }
}
