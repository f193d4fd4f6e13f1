//! Ledger access
//!
//! The protocol only needs a handful of ledger operations: a fresh
//! checkpoint, submit, status polling, and the two history reads. They are
//! expressed by [`LedgerRpc`] so the publisher and scanner never see HTTP.
//!
//! # Implementations
//! - `JsonRpcClient`: Solana HTTP JSON-RPC
//! - `InMemoryLedger`: single-process ledger for tests and offline runs

pub mod memory;
pub mod rpc;
pub mod transaction;

pub use memory::InMemoryLedger;
pub use rpc::JsonRpcClient;
pub use transaction::{CompiledInstruction, Message, Transaction, PACKET_DATA_SIZE};

use crate::error::NetworkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// SPL Memo program, version 2
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// SPL Memo program, version 1
pub const MEMO_V1_PROGRAM_ID: &str = "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo";

/// Base58 identifier could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {reason}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub reason: String,
}

macro_rules! base58_id {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn to_base58(&self) -> String {
                bs58::encode(&self.0).into_string()
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseIdError> {
                let array: [u8; $len] = bytes.try_into().map_err(|_| ParseIdError {
                    kind: $kind,
                    reason: format!("expected {} bytes, got {}", $len, bytes.len()),
                })?;
                Ok(Self(array))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = bs58::decode(s.trim()).into_vec().map_err(|e| ParseIdError {
                    kind: $kind,
                    reason: e.to_string(),
                })?;
                Self::from_slice(&bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_base58())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base58())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base58())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

base58_id!(
    /// Ed25519 public key, the ledger's notion of an account identity
    Pubkey,
    32,
    "public key"
);
base58_id!(
    /// Transaction signature; doubles as the identity of a published event
    Signature,
    64,
    "signature"
);
base58_id!(
    /// Recent blockhash
    Hash,
    32,
    "blockhash"
);

impl Pubkey {
    /// Check an ed25519 signature over `message` against this key
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify_strict(message, &sig).is_ok()
    }
}

/// Well-known memo program id
pub fn memo_program_id() -> Pubkey {
    static ID: OnceLock<Pubkey> = OnceLock::new();
    *ID.get_or_init(|| MEMO_PROGRAM_ID.parse().unwrap_or_default())
}

/// True for either memo program version
pub fn is_memo_program(key: &Pubkey) -> bool {
    static V1: OnceLock<Pubkey> = OnceLock::new();
    let v1 = V1.get_or_init(|| MEMO_V1_PROGRAM_ID.parse().unwrap_or_default());
    *key == memo_program_id() || key == v1
}

/// Ledger consistency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    /// Lowest level a publish may report as recorded, and the lowest the
    /// history reads accept
    pub const MIN_DURABLE: Commitment = Commitment::Confirmed;

    /// This level, raised to [`Commitment::MIN_DURABLE`]
    pub fn durable(self) -> Self {
        self.max(Self::MIN_DURABLE)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            _ => Err(format!("Unknown commitment level: {}", s)),
        }
    }
}

/// Short-lived reference a write must carry to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Status of a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmation: Option<Commitment>,
    /// Ledger-reported failure, rendered as text
    pub err: Option<String>,
}

/// Window selector for signature listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureQuery {
    pub limit: usize,
    /// Start searching backwards from this signature (exclusive)
    pub before: Option<Signature>,
    /// Stop when this signature is reached (exclusive)
    pub until: Option<Signature>,
}

/// One entry of an address's signature history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub err: Option<String>,
}

/// Execution metadata attached to a fetched transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionMeta {
    pub err: Option<String>,
    pub log_messages: Vec<String>,
}

/// A transaction as returned by history reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub meta: Option<TransactionMeta>,
    /// Static keys followed by any lookup-table keys
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<CompiledInstruction>,
}

impl FetchedTransaction {
    /// Payload of the first top-level memo instruction, falling back to the
    /// memo program's log line when no instruction is addressed to it
    pub fn memo_payload(&self) -> Option<Vec<u8>> {
        self.instructions
            .iter()
            .find(|ix| {
                self.account_keys
                    .get(ix.program_id_index as usize)
                    .is_some_and(is_memo_program)
            })
            .map(|ix| ix.data.clone())
            .or_else(|| {
                self.meta
                    .as_ref()?
                    .log_messages
                    .iter()
                    .find_map(|line| parse_memo_log(line))
                    .map(String::into_bytes)
            })
    }
}

/// Extract the payload from `Program log: Memo (len N): "..."`
///
/// The memo program writes the payload with Rust's `{:?}` string formatting,
/// so escapes follow that syntax (`\u{1b}`, not `\u001b`).
pub fn parse_memo_log(line: &str) -> Option<String> {
    let rest = line.strip_prefix("Program log: Memo (len ")?;
    let (_, quoted) = rest.split_once("): ")?;
    unescape_debug_str(quoted)
}

fn unescape_debug_str(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let unescaped = match chars.next()? {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|&h| h != '}').collect();
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        };
        out.push(unescaped);
    }
    Some(out)
}

/// Ledger operations the protocol depends on
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fresh blockhash for a new write
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError>;

    /// Current block height, used to detect checkpoint expiry
    async fn block_height(&self) -> Result<u64, NetworkError>;

    /// Submit a signed wire transaction; returns its first signature
    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, NetworkError>;

    /// Status of one signature, `None` if the node has not seen it
    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, NetworkError>;

    /// Signatures touching `address`, newest first
    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, NetworkError>;

    /// Full transaction, `None` if unknown
    async fn get_transaction(&self, signature: &Signature) -> Result<Option<FetchedTransaction>, NetworkError>;
}

/// How long and how hard to wait for a submitted write
#[derive(Debug, Clone)]
pub struct ConfirmPolicy {
    pub commitment: Commitment,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Submit a signed transaction and block until it reaches the policy's
/// commitment, the checkpoint expires, or the deadline passes
pub async fn submit_and_confirm(
    ledger: &dyn LedgerRpc,
    wire: &[u8],
    checkpoint: &Checkpoint,
    policy: &ConfirmPolicy,
) -> Result<Signature, NetworkError> {
    let target = policy.commitment.durable();
    let signature = ledger.send_transaction(wire).await?;
    tracing::debug!(%signature, commitment = %target, "submitted, awaiting confirmation");

    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(status) = ledger.signature_status(&signature).await? {
            if let Some(reason) = status.err {
                return Err(NetworkError::TransactionFailed {
                    signature: signature.to_string(),
                    reason,
                });
            }
            if status.confirmation.is_some_and(|level| level >= target) {
                return Ok(signature);
            }
        }

        if ledger.block_height().await? > checkpoint.last_valid_block_height {
            return Err(NetworkError::CheckpointExpired {
                signature: signature.to_string(),
            });
        }

        if Instant::now() >= deadline {
            return Err(NetworkError::ConfirmationTimeout {
                signature: signature.to_string(),
                duration: policy.timeout,
            });
        }

        sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_program_ids_decode() {
        assert_eq!(memo_program_id().to_base58(), MEMO_PROGRAM_ID);
        assert!(is_memo_program(&MEMO_V1_PROGRAM_ID.parse().unwrap()));
        assert!(!is_memo_program(&Pubkey::default()));
    }

    #[test]
    fn test_base58_parse_rejects_wrong_length() {
        assert!("3yZe7d".parse::<Pubkey>().is_err());
        assert!("not-base58-0OIl".parse::<Signature>().is_err());
        let key: Pubkey = MEMO_PROGRAM_ID.parse().unwrap();
        assert_eq!(key.to_string(), MEMO_PROGRAM_ID);
    }

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Finalized >= Commitment::Confirmed);
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert_eq!("FINALIZED".parse::<Commitment>().unwrap(), Commitment::Finalized);
    }

    #[test]
    fn test_durable_never_below_confirmed() {
        assert_eq!(Commitment::Processed.durable(), Commitment::Confirmed);
        assert_eq!(Commitment::Confirmed.durable(), Commitment::Confirmed);
        assert_eq!(Commitment::Finalized.durable(), Commitment::Finalized);
    }

    #[tokio::test]
    async fn test_processed_policy_still_waits_for_confirmed() {
        let ledger = memory::InMemoryLedger::new();
        ledger.set_confirmation(Commitment::Processed);
        let key = ed25519_dalek::SigningKey::from_bytes(&[21u8; 32]);
        let payer = Pubkey(key.verifying_key().to_bytes());

        let checkpoint = ledger.latest_checkpoint().await.unwrap();
        let mut tx = Transaction::new_unsigned(Message::new_memo(payer, b"memo", checkpoint.blockhash));
        let signature = ed25519_dalek::Signer::sign(&key, &tx.message.serialize());
        assert!(tx.attach_signature(&payer, Signature(signature.to_bytes())));

        let policy = ConfirmPolicy {
            commitment: Commitment::Processed,
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        };
        let err = submit_and_confirm(&ledger, &tx.serialize(), &checkpoint, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::ConfirmationTimeout { .. }));
    }

    #[test]
    fn test_parse_memo_log() {
        let line = r#"Program log: Memo (len 38): "{\"protocol\":\"AgentPact\",\"v\":1}""#;
        assert_eq!(
            parse_memo_log(line).as_deref(),
            Some(r#"{"protocol":"AgentPact","v":1}"#)
        );
        assert_eq!(parse_memo_log("Program log: something else"), None);
    }

    #[test]
    fn test_parse_memo_log_debug_escapes() {
        let memo = "tab\there \u{1b}[0m \"quoted\" back\\slash \u{200b}";
        let line = format!("Program log: Memo (len {}): {:?}", memo.len(), memo);
        assert!(line.contains("\\u{1b}"));
        assert_eq!(parse_memo_log(&line).as_deref(), Some(memo));

        assert_eq!(parse_memo_log(r#"Program log: Memo (len 1): "\u{zz}""#), None);
        assert_eq!(parse_memo_log(r#"Program log: Memo (len 1): "dangling\""#), None);
    }

    #[test]
    fn test_memo_payload_prefers_instruction() {
        let tx = FetchedTransaction {
            signature: Signature::default(),
            slot: 1,
            block_time: None,
            meta: Some(TransactionMeta {
                err: None,
                log_messages: vec![r#"Program log: Memo (len 3): "log""#.to_string()],
            }),
            account_keys: vec![Pubkey::default(), memo_program_id()],
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: vec![],
                data: b"instruction".to_vec(),
            }],
        };
        assert_eq!(tx.memo_payload().unwrap(), b"instruction".to_vec());

        let log_only = FetchedTransaction {
            instructions: vec![],
            ..tx
        };
        assert_eq!(log_only.memo_payload().unwrap(), b"log".to_vec());
    }
}
