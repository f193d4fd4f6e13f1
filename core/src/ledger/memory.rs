//! In-memory ledger implementation
//!
//! For single-process use: unit tests, offline demos, and exercising the
//! publisher and scanner without a network. Submitted transactions are
//! decoded and signature-checked like the real network would, then stored
//! in arrival order. Fault injection hooks let tests reproduce the lossy
//! behavior of a real node.

use super::{
    is_memo_program, Checkpoint, Commitment, CompiledInstruction, FetchedTransaction, Hash, LedgerRpc,
    Pubkey, Signature, SignatureInfo, SignatureQuery, SignatureStatus, Transaction, TransactionMeta,
    PACKET_DATA_SIZE,
};
use crate::error::NetworkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Blocks a blockhash stays valid for
const CHECKPOINT_LIFETIME: u64 = 150;

/// First block time handed out, in seconds
const GENESIS_TIME: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct StoredTransaction {
    fetched: FetchedTransaction,
}

#[derive(Debug)]
struct State {
    block_height: u64,
    slot: u64,
    next_block_time: Option<i64>,
    next_synthetic: u64,
    blockhashes: HashMap<Hash, u64>,
    transactions: Vec<StoredTransaction>,
    index: HashMap<Signature, usize>,
    failing_fetches: HashSet<Signature>,
    fail_listing: bool,
    fail_submit: bool,
    confirmation: Commitment,
    calls: usize,
}

/// Ledger held entirely in process memory
///
/// # Example
/// ```rust,ignore
/// let ledger = Arc::new(InMemoryLedger::new());
/// let client = AgentPact::with_ledger(config, ledger.clone())?;
/// client.log_handoff("Kevin", "Clawd", "Investigate pricing page").await?;
/// assert_eq!(ledger.transaction_count(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                block_height: 1,
                slot: 1,
                next_block_time: Some(GENESIS_TIME),
                next_synthetic: 1,
                blockhashes: HashMap::new(),
                transactions: Vec::new(),
                index: HashMap::new(),
                failing_fetches: HashSet::new(),
                fail_listing: false,
                fail_submit: false,
                confirmation: Commitment::Finalized,
                calls: 0,
            }),
        }
    }

    /// Number of ledger operations served so far
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    /// Block time assigned to the next stored transaction; `None` omits it
    pub fn set_next_block_time(&self, block_time: Option<i64>) {
        self.state.lock().next_block_time = block_time;
    }

    /// Highest level submitted transactions reach
    pub fn set_confirmation(&self, level: Commitment) {
        self.state.lock().confirmation = level;
    }

    /// Advance block height, expiring older checkpoints
    pub fn advance_blocks(&self, blocks: u64) {
        let mut state = self.state.lock();
        state.block_height += blocks;
        state.slot += blocks;
    }

    /// Make `get_transaction` fail for one signature
    pub fn fail_fetch(&self, signature: Signature) {
        self.state.lock().failing_fetches.insert(signature);
    }

    /// Make `signatures_for_address` fail
    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    /// Make `send_transaction` fail
    pub fn fail_submit(&self, fail: bool) {
        self.state.lock().fail_submit = fail;
    }

    /// Store an unsigned memo transaction from `author` directly, bypassing
    /// submission. Used to seed foreign or malformed traffic.
    pub fn record_memo(&self, author: Pubkey, memo: &[u8], block_time: Option<i64>) -> Signature {
        let mut state = self.state.lock();
        let signature = synthetic_signature(&mut state);
        let fetched = FetchedTransaction {
            signature,
            slot: 0,
            block_time,
            meta: Some(memo_meta(memo)),
            account_keys: vec![author, super::memo_program_id()],
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: Vec::new(),
                data: memo.to_vec(),
            }],
        };
        store(&mut state, fetched);
        signature
    }

    /// Store a transaction touching `author` with no memo instruction
    pub fn record_plain(&self, author: Pubkey, block_time: Option<i64>) -> Signature {
        let mut state = self.state.lock();
        let signature = synthetic_signature(&mut state);
        let fetched = FetchedTransaction {
            signature,
            slot: 0,
            block_time,
            meta: Some(TransactionMeta::default()),
            account_keys: vec![author, Pubkey::default()],
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: vec![0],
                data: vec![2, 0, 0, 0],
            }],
        };
        store(&mut state, fetched);
        signature
    }

    /// Drop the metadata of a stored transaction
    pub fn strip_meta(&self, signature: &Signature) {
        let mut state = self.state.lock();
        if let Some(&i) = state.index.get(signature) {
            state.transactions[i].fetched.meta = None;
        }
    }

    /// Mark a stored transaction as failed on execution
    pub fn fail_execution(&self, signature: &Signature, reason: &str) {
        let mut state = self.state.lock();
        if let Some(&i) = state.index.get(signature) {
            if let Some(meta) = state.transactions[i].fetched.meta.as_mut() {
                meta.err = Some(reason.to_string());
            }
        }
    }

    fn begin_call(&self) -> parking_lot::MutexGuard<'_, State> {
        let mut state = self.state.lock();
        state.calls += 1;
        state
    }
}

fn synthetic_signature(state: &mut State) -> Signature {
    let mut bytes = [0xA5u8; 64];
    bytes[..8].copy_from_slice(&state.next_synthetic.to_le_bytes());
    state.next_synthetic += 1;
    Signature(bytes)
}

fn memo_meta(memo: &[u8]) -> TransactionMeta {
    let text = String::from_utf8_lossy(memo);
    TransactionMeta {
        err: None,
        log_messages: vec![
            format!("Program {} invoke [1]", super::MEMO_PROGRAM_ID),
            format!("Program log: Memo (len {}): {:?}", memo.len(), text),
            format!("Program {} success", super::MEMO_PROGRAM_ID),
        ],
    }
}

fn store(state: &mut State, mut fetched: FetchedTransaction) {
    state.slot += 1;
    fetched.slot = state.slot;
    if fetched.block_time.is_none() {
        fetched.block_time = state.next_block_time;
    }
    if let Some(t) = state.next_block_time.as_mut() {
        *t += 1;
    }
    state.index.insert(fetched.signature, state.transactions.len());
    state.transactions.push(StoredTransaction { fetched });
}

fn rejected(message: impl Into<String>) -> NetworkError {
    NetworkError::Rpc {
        method: "sendTransaction".to_string(),
        code: -32002,
        message: message.into(),
    }
}

#[async_trait]
impl LedgerRpc for InMemoryLedger {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError> {
        let mut state = self.begin_call();
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&state.block_height.to_le_bytes());
        bytes[8..16].copy_from_slice(&(state.blockhashes.len() as u64).to_le_bytes());
        bytes[31] = 0x42;
        let blockhash = Hash(bytes);
        let last_valid_block_height = state.block_height + CHECKPOINT_LIFETIME;
        state.blockhashes.insert(blockhash, last_valid_block_height);
        Ok(Checkpoint {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        Ok(self.begin_call().block_height)
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, NetworkError> {
        let mut state = self.begin_call();
        if state.fail_submit {
            return Err(NetworkError::Transport {
                operation: "sendTransaction".to_string(),
                message: "connection reset".to_string(),
            });
        }
        if wire.len() > PACKET_DATA_SIZE {
            return Err(rejected(format!("transaction too large: {} bytes", wire.len())));
        }

        let (tx, message_bytes) =
            Transaction::deserialize(wire).map_err(|e| rejected(format!("failed to deserialize: {}", e)))?;

        match state.blockhashes.get(&tx.message.recent_blockhash) {
            Some(&last_valid) if last_valid >= state.block_height => {}
            _ => return Err(rejected("Blockhash not found")),
        }

        let signers = tx.message.signer_keys();
        if signers.is_empty() || signers.len() != tx.signatures.len() {
            return Err(rejected("signature count mismatch"));
        }
        for (key, sig) in signers.iter().zip(&tx.signatures) {
            if !key.verify(&message_bytes, sig) {
                return Err(rejected("signature verification failure"));
            }
        }

        let signature = tx.signatures[0];
        if state.index.contains_key(&signature) {
            return Err(rejected("This transaction has already been processed"));
        }

        let memo = tx
            .message
            .instructions
            .iter()
            .find(|ix| {
                tx.message
                    .account_keys
                    .get(ix.program_id_index as usize)
                    .is_some_and(is_memo_program)
            })
            .map(|ix| ix.data.clone());

        let fetched = FetchedTransaction {
            signature,
            slot: 0,
            block_time: None,
            meta: Some(memo.as_deref().map(memo_meta).unwrap_or_default()),
            account_keys: tx.message.account_keys.clone(),
            instructions: tx.message.instructions.clone(),
        };
        store(&mut state, fetched);
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, NetworkError> {
        let state = self.begin_call();
        Ok(state.index.get(signature).map(|&i| SignatureStatus {
            slot: state.transactions[i].fetched.slot,
            confirmation: Some(state.confirmation),
            err: None,
        }))
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, NetworkError> {
        let state = self.begin_call();
        if state.fail_listing {
            return Err(NetworkError::Timeout {
                operation: "getSignaturesForAddress".to_string(),
                duration: std::time::Duration::from_secs(30),
            });
        }

        let newest_first = state
            .transactions
            .iter()
            .rev()
            .map(|t| &t.fetched)
            .filter(|t| t.account_keys.contains(address));

        let mut started = query.before.is_none();
        let mut out = Vec::new();
        for tx in newest_first {
            if !started {
                started = Some(tx.signature) == query.before;
                continue;
            }
            if Some(tx.signature) == query.until || out.len() >= query.limit {
                break;
            }
            out.push(SignatureInfo {
                signature: tx.signature,
                slot: tx.slot,
                block_time: tx.block_time,
                err: tx.meta.as_ref().and_then(|m| m.err.clone()),
            });
        }
        Ok(out)
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<FetchedTransaction>, NetworkError> {
        let state = self.begin_call();
        if state.failing_fetches.contains(signature) {
            return Err(NetworkError::Transport {
                operation: "getTransaction".to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(state.index.get(signature).map(|&i| state.transactions[i].fetched.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_is_newest_first_with_cursor() {
        let ledger = InMemoryLedger::new();
        let author = Pubkey([1u8; 32]);
        let other = Pubkey([2u8; 32]);

        let a = ledger.record_memo(author, b"a", None);
        let _foreign = ledger.record_memo(other, b"x", None);
        let b = ledger.record_memo(author, b"b", None);
        let c = ledger.record_memo(author, b"c", None);

        let all = ledger
            .signatures_for_address(&author, &SignatureQuery { limit: 10, before: None, until: None })
            .await
            .unwrap();
        let sigs: Vec<_> = all.iter().map(|i| i.signature).collect();
        assert_eq!(sigs, vec![c, b, a]);

        let page = ledger
            .signatures_for_address(&author, &SignatureQuery { limit: 10, before: Some(c), until: Some(a) })
            .await
            .unwrap();
        assert_eq!(page.iter().map(|i| i.signature).collect::<Vec<_>>(), vec![b]);
    }

    #[tokio::test]
    async fn test_rejects_unsigned_submission() {
        let ledger = InMemoryLedger::new();
        let checkpoint = ledger.latest_checkpoint().await.unwrap();
        let tx = Transaction::new_unsigned(super::super::Message::new_memo(
            Pubkey([1u8; 32]),
            b"memo",
            checkpoint.blockhash,
        ));
        let err = ledger.send_transaction(&tx.serialize()).await.unwrap_err();
        assert!(matches!(err, NetworkError::Rpc { .. }));
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_injection() {
        let ledger = InMemoryLedger::new();
        let sig = ledger.record_memo(Pubkey([1u8; 32]), b"m", Some(10));
        ledger.fail_fetch(sig);
        assert!(ledger.get_transaction(&sig).await.is_err());
        assert_eq!(ledger.call_count(), 1);
    }
}
