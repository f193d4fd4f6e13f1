//! AgentPact client
//!
//! Owns one configuration and everything derived from it: the ledger
//! connection, the active signer, a publisher, and a scanner. Changing the
//! configuration goes through [`AgentPact::reconfigure`], which rebuilds the
//! derived parts before swapping them in.

use crate::config::{ConfigPatch, PactConfig};
use crate::error::{Error, PublishError, ScanError};
use crate::ledger::{JsonRpcClient, LedgerRpc, Pubkey, Signature};
use crate::protocol::{create_completion_log, create_handoff_log, PactEvent};
use crate::publisher::Publisher;
use crate::scanner::{HistoryPage, HistoryQuery, RecordedEvent, Scanner, SkipObserver};
use crate::signer::{ActiveSigner, TransactionSigner};
use std::sync::Arc;

/// Client for publishing and reading coordination events
pub struct AgentPact {
    config: PactConfig,
    ledger: Arc<dyn LedgerRpc>,
    /// Set when the ledger was supplied by the caller rather than built
    /// from `rpc_url`
    injected_ledger: bool,
    signer: Option<Arc<ActiveSigner>>,
    publisher: Publisher,
    scanner: Scanner,
    observer: Option<SkipObserver>,
}

impl AgentPact {
    /// Connect to the JSON-RPC endpoint named in `config`
    pub fn new(config: PactConfig) -> Result<Self, Error> {
        config.validate()?;
        let ledger = connect(&config)?;
        Self::assemble(config, ledger, false, None)
    }

    /// Use an existing ledger, such as [`crate::ledger::InMemoryLedger`]
    pub fn with_ledger(config: PactConfig, ledger: Arc<dyn LedgerRpc>) -> Result<Self, Error> {
        config.validate()?;
        Self::assemble(config, ledger, true, None)
    }

    /// Load the config file and environment, then connect
    pub fn from_env() -> Result<Self, Error> {
        Self::new(crate::config::load_effective(None)?)
    }

    fn assemble(
        config: PactConfig,
        ledger: Arc<dyn LedgerRpc>,
        injected_ledger: bool,
        observer: Option<SkipObserver>,
    ) -> Result<Self, Error> {
        let signer = ActiveSigner::resolve(&config, ledger.clone())?.map(Arc::new);
        let publisher = Publisher::new(
            signer.clone().map(|s| s as Arc<dyn TransactionSigner>),
            config.rpc_url.clone(),
        );
        let mut scanner = Scanner::new(ledger.clone(), config.fetch_concurrency, config.history_limit);
        scanner.set_observer(observer.clone());

        Ok(Self {
            config,
            ledger,
            injected_ledger,
            signer,
            publisher,
            scanner,
            observer,
        })
    }

    /// Merge `patch` and re-resolve the signer
    ///
    /// On error the client is left unchanged.
    pub fn reconfigure(&mut self, patch: ConfigPatch) -> Result<(), Error> {
        let config = self.config.clone().with(patch);
        config.validate()?;

        let ledger = if self.injected_ledger {
            self.ledger.clone()
        } else {
            connect(&config)?
        };

        *self = Self::assemble(config, ledger, self.injected_ledger, self.observer.clone())?;
        Ok(())
    }

    pub fn config(&self) -> &PactConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<dyn LedgerRpc> {
        self.ledger.clone()
    }

    /// Public key of the active signer when known locally
    pub fn identity(&self) -> Option<Pubkey> {
        self.signer.as_ref().and_then(|s| s.identity())
    }

    pub fn signer_name(&self) -> Option<&'static str> {
        self.signer.as_ref().map(|s| s.name())
    }

    /// Record that `from` handed `task` to `to`
    pub async fn log_handoff(&self, from: &str, to: &str, task: &str) -> Result<Signature, PublishError> {
        self.publish(&create_handoff_log(from, to, task).into()).await
    }

    /// Record that `agent` finished `task`
    pub async fn log_completion(&self, agent: &str, task: &str, result: &str) -> Result<Signature, PublishError> {
        self.publish(&create_completion_log(agent, task, result).into()).await
    }

    pub async fn publish(&self, event: &PactEvent) -> Result<Signature, PublishError> {
        self.publisher.publish(event).await
    }

    pub async fn history(&self, identity: &str) -> Result<Vec<RecordedEvent>, ScanError> {
        self.scanner.history(identity).await
    }

    pub async fn history_page(&self, identity: &str, query: &HistoryQuery) -> Result<HistoryPage, ScanError> {
        self.scanner.history_page(identity, query).await
    }

    pub async fn full_history(
        &self,
        identity: &str,
        page_size: usize,
        max_pages: usize,
    ) -> Result<HistoryPage, ScanError> {
        self.scanner.full_history(identity, page_size, max_pages).await
    }

    /// Walk pages backwards from an explicit starting window
    pub async fn walk_history(
        &self,
        identity: &str,
        start: HistoryQuery,
        max_pages: usize,
    ) -> Result<HistoryPage, ScanError> {
        self.scanner.walk(identity, start, max_pages).await
    }

    /// Observe signatures skipped by later scans
    pub fn set_skip_observer(&mut self, observer: Option<SkipObserver>) {
        self.scanner.set_observer(observer.clone());
        self.observer = observer;
    }
}

impl std::fmt::Debug for AgentPact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPact")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .field("injected_ledger", &self.injected_ledger)
            .finish_non_exhaustive()
    }
}

fn connect(config: &PactConfig) -> Result<Arc<dyn LedgerRpc>, Error> {
    let client = JsonRpcClient::new(&config.rpc_url, config.request_timeout())?.with_commitment(config.commitment);
    Ok(Arc::new(client))
}
