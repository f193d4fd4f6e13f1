//! Local credential signer
//!
//! Key material lives in process memory and every write is signed in
//! process with ed25519.

use super::{attach, PendingWrite, TransactionSigner};
use crate::config::LocalCredential;
use crate::error::{ConfigurationError, Error, PublishError, SigningError};
use crate::ledger::{submit_and_confirm, ConfirmPolicy, LedgerRpc, Pubkey, Signature, Transaction};
use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use std::path::Path;
use std::sync::Arc;

/// An ed25519 keypair
#[derive(Clone)]
pub struct Keypair {
    secret: SigningKey,
}

impl Keypair {
    /// Build from a 64-byte keypair (secret then public) or a 32-byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigurationError> {
        match bytes.len() {
            64 => {
                let mut full = [0u8; 64];
                full.copy_from_slice(bytes);
                let secret = SigningKey::from_keypair_bytes(&full).map_err(|_| invalid("public half does not match secret"))?;
                Ok(Self { secret })
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Ok(Self::generate_from_seed(seed))
            }
            n => Err(invalid(&format!("expected 64 or 32 bytes, got {}", n))),
        }
    }

    pub fn generate_from_seed(seed: [u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a JSON byte array, base58, or base64 encoding
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("empty"));
        }

        if text.starts_with('[') {
            let bytes: Vec<u8> =
                serde_json::from_str(text).map_err(|e| invalid(&format!("not a JSON byte array: {}", e)))?;
            return Self::from_bytes(&bytes);
        }

        if let Ok(bytes) = bs58::decode(text).into_vec() {
            if matches!(bytes.len(), 32 | 64) {
                return Self::from_bytes(&bytes);
            }
        }

        match base64::engine::general_purpose::STANDARD.decode(text) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(_) => Err(invalid("not base58, base64, or a JSON byte array")),
        }
    }

    /// Read a Solana CLI keypair file
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::KeypairFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.secret.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.secret.sign(message).to_bytes())
    }

    /// 64-byte keypair in base58
    pub fn to_base58(&self) -> String {
        bs58::encode(self.secret.to_keypair_bytes()).into_string()
    }

    /// 64-byte keypair as the JSON array written by the Solana CLI
    pub fn to_json_bytes(&self) -> String {
        let bytes: Vec<u8> = self.secret.to_keypair_bytes().to_vec();
        serde_json::Value::from(bytes).to_string()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("pubkey", &self.pubkey()).finish_non_exhaustive()
    }
}

fn invalid(reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidKeyMaterial {
        reason: reason.to_string(),
    }
}

/// Signs with a keypair held in memory
pub struct LocalKeypairSigner {
    keypair: Keypair,
    ledger: Arc<dyn LedgerRpc>,
    policy: ConfirmPolicy,
}

impl LocalKeypairSigner {
    pub fn new(keypair: Keypair, ledger: Arc<dyn LedgerRpc>, policy: ConfirmPolicy) -> Self {
        Self { keypair, ledger, policy }
    }

    /// Load the keypair named by a credential. An inline key takes
    /// precedence over a keypair file.
    pub fn from_credential(
        credential: &LocalCredential,
        ledger: Arc<dyn LedgerRpc>,
        policy: ConfirmPolicy,
    ) -> Result<Self, Error> {
        let keypair = match (&credential.private_key, &credential.keypair_path) {
            (Some(key), _) => Keypair::parse(key)?,
            (None, Some(path)) => Keypair::from_file(path)?,
            (None, None) => return Err(SigningError::NoCredential.into()),
        };
        Ok(Self::new(keypair, ledger, policy))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl std::fmt::Debug for LocalKeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeypairSigner")
            .field("pubkey", &self.pubkey())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionSigner for LocalKeypairSigner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn sign_and_submit(&self, write: &PendingWrite) -> Result<Signature, PublishError> {
        let checkpoint = self.ledger.latest_checkpoint().await?;
        let message = write.to_message(self.pubkey(), checkpoint.blockhash);
        let mut tx = Transaction::new_unsigned(message);

        let signature = self.keypair.sign(&tx.message_bytes());
        attach(&mut tx, &self.pubkey(), signature)?;

        let wire = tx.serialize();
        let confirmed = submit_and_confirm(self.ledger.as_ref(), &wire, &checkpoint, &self.policy).await?;
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::ledger::{Commitment, InMemoryLedger};
    use std::time::Duration;

    fn keypair() -> Keypair {
        Keypair::generate_from_seed([3u8; 32])
    }

    #[test]
    fn test_parse_encodings() {
        let kp = keypair();
        let bytes = kp.secret.to_keypair_bytes();

        let from_b58 = Keypair::parse(&kp.to_base58()).unwrap();
        let from_b64 = Keypair::parse(&base64::engine::general_purpose::STANDARD.encode(bytes)).unwrap();
        let from_json = Keypair::parse(&kp.to_json_bytes()).unwrap();
        let from_seed = Keypair::parse(&bs58::encode([3u8; 32]).into_string()).unwrap();

        for parsed in [from_b58, from_b64, from_json, from_seed] {
            assert_eq!(parsed.pubkey(), kp.pubkey());
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Keypair::parse("").is_err());
        assert!(Keypair::parse("[1,2,3]").is_err());
        assert!(Keypair::parse("!!!").is_err());

        let mut bytes = keypair().secret.to_keypair_bytes();
        bytes[40] ^= 0xff;
        assert!(Keypair::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        std::fs::write(&path, keypair().to_json_bytes()).unwrap();
        assert_eq!(Keypair::from_file(&path).unwrap().pubkey(), keypair().pubkey());

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Keypair::from_file(&missing),
            Err(ConfigurationError::KeypairFile { .. })
        ));
    }

    #[test]
    fn test_sign_verifies() {
        let kp = keypair();
        let sig = kp.sign(b"payload");
        assert!(kp.pubkey().verify(b"payload", &sig));
        assert!(!kp.pubkey().verify(b"other", &sig));
        assert!(!format!("{:?}", kp).contains(&kp.to_base58()));
    }

    #[test]
    fn test_inline_key_wins_over_file() {
        let credential = LocalCredential {
            private_key: Some(keypair().to_base58()),
            keypair_path: Some("/nonexistent/id.json".into()),
        };
        let signer =
            LocalKeypairSigner::from_credential(&credential, Arc::new(InMemoryLedger::new()), ConfirmPolicy::default())
                .unwrap();
        assert_eq!(signer.pubkey(), keypair().pubkey());
    }

    #[tokio::test]
    async fn test_sign_and_submit_confirms() {
        let ledger = Arc::new(InMemoryLedger::new());
        let signer = LocalKeypairSigner::new(keypair(), ledger.clone(), ConfirmPolicy::default());

        let sig = signer.sign_and_submit(&PendingWrite::new(b"note".to_vec())).await.unwrap();
        assert_eq!(ledger.transaction_count(), 1);

        let fetched = ledger.get_transaction(&sig).await.unwrap().unwrap();
        assert_eq!(fetched.account_keys[0], keypair().pubkey());
        assert_eq!(fetched.memo_payload().as_deref(), Some(&b"note"[..]));
    }

    #[tokio::test]
    async fn test_times_out_below_commitment() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_confirmation(Commitment::Processed);
        let policy = ConfirmPolicy {
            commitment: Commitment::Confirmed,
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        };
        let signer = LocalKeypairSigner::new(keypair(), ledger, policy);

        let err = signer.sign_and_submit(&PendingWrite::new(b"note".to_vec())).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Network(NetworkError::ConfirmationTimeout { .. })
        ));
        assert!(err.is_retryable());
    }
}
