//! Credential signers
//!
//! A signer authorizes a pending memo write and carries it through to
//! confirmation. Which signer is active is decided once, when the client is
//! configured, and recorded as an [`ActiveSigner`] variant.

pub mod local;
pub mod remote;

pub use local::{Keypair, LocalKeypairSigner};
pub use remote::RemoteWalletSigner;

use crate::config::PactConfig;
use crate::error::{Error, PublishError, SigningError};
use crate::ledger::{Hash, LedgerRpc, Message, Pubkey, Signature, Transaction};
use async_trait::async_trait;
use std::sync::Arc;

/// A memo write that has not been signed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    memo: Vec<u8>,
}

impl PendingWrite {
    pub fn new(memo: impl Into<Vec<u8>>) -> Self {
        Self { memo: memo.into() }
    }

    /// Raw memo bytes
    pub fn payload(&self) -> &[u8] {
        &self.memo
    }

    /// Memo as text, lossy for non UTF-8 payloads
    pub fn memo(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.memo)
    }

    pub fn to_message(&self, fee_payer: Pubkey, recent_blockhash: Hash) -> Message {
        Message::new_memo(fee_payer, &self.memo, recent_blockhash)
    }

    /// Size of the signed transaction on the wire
    pub fn wire_size(&self) -> usize {
        Transaction::new_unsigned(self.to_message(Pubkey::default(), Hash::default()))
            .serialize()
            .len()
    }
}

/// Put `signature` in the slot of `signer`, which must be one of the
/// message's signers
pub(crate) fn attach(tx: &mut Transaction, signer: &Pubkey, signature: Signature) -> Result<(), SigningError> {
    if tx.attach_signature(signer, signature) {
        Ok(())
    } else {
        Err(SigningError::Rejected {
            reason: format!("{} is not a signer of the write", signer),
        })
    }
}

/// Authorizes and submits pending writes
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sign, submit, and wait for confirmation
    async fn sign_and_submit(&self, write: &PendingWrite) -> Result<Signature, PublishError>;
}

/// The signing strategy chosen for a configuration
#[derive(Debug)]
pub enum ActiveSigner {
    LocalCredential(LocalKeypairSigner),
    RemoteWallet(RemoteWalletSigner),
}

impl ActiveSigner {
    /// Pick the signer for `config`
    ///
    /// A local credential wins over a remote wallet. A remote wallet needs
    /// both token and handle. With neither, there is no signer.
    pub fn resolve(config: &PactConfig, ledger: Arc<dyn LedgerRpc>) -> Result<Option<Self>, Error> {
        if let Some(local) = &config.local {
            let signer = LocalKeypairSigner::from_credential(local, ledger, config.confirm_policy())?;
            tracing::debug!(identity = %signer.pubkey(), "using local credential signer");
            return Ok(Some(Self::LocalCredential(signer)));
        }

        if let Some(wallet) = config.remote_wallet.as_ref().filter(|w| w.is_complete()) {
            let signer = RemoteWalletSigner::new(wallet, ledger, config.confirm_policy(), config.request_timeout())?;
            tracing::debug!(handle = signer.handle(), backend = %wallet.backend, "using remote wallet signer");
            return Ok(Some(Self::RemoteWallet(signer)));
        }

        tracing::debug!("no signer configured; publishing is disabled");
        Ok(None)
    }

    /// Public key, when known without a network round trip
    pub fn identity(&self) -> Option<Pubkey> {
        match self {
            Self::LocalCredential(signer) => Some(signer.pubkey()),
            Self::RemoteWallet(signer) => signer.cached_identity(),
        }
    }
}

#[async_trait]
impl TransactionSigner for ActiveSigner {
    fn name(&self) -> &'static str {
        match self {
            Self::LocalCredential(signer) => signer.name(),
            Self::RemoteWallet(signer) => signer.name(),
        }
    }

    async fn sign_and_submit(&self, write: &PendingWrite) -> Result<Signature, PublishError> {
        match self {
            Self::LocalCredential(signer) => signer.sign_and_submit(write).await,
            Self::RemoteWallet(signer) => signer.sign_and_submit(write).await,
        }
    }
}
