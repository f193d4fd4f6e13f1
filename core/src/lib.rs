pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod output;
pub mod protocol;
pub mod publisher;
pub mod scanner;
pub mod signer;
pub mod util;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use client::AgentPact;
pub use config::{ConfigPatch, PactConfig};
pub use error::{ConfigurationError, Error, NetworkError, PublishError, Result, ScanError, SigningError};
pub use ledger::{Commitment, InMemoryLedger, LedgerRpc, Pubkey, Signature};
pub use protocol::{create_completion_log, create_handoff_log, CompletionEvent, HandoffEvent, PactEvent};
pub use scanner::{HistoryPage, HistoryQuery, RecordedEvent, ScanReport, SkipReason};
pub use signer::{ActiveSigner, Keypair};
