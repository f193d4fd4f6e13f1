//! History scanner
//!
//! Rebuilds the event history of an identity from its ledger transactions.
//! A scan is best effort: only failing to list signatures is an error.
//! Every other per-record problem skips that record and is counted in the
//! page's [`ScanReport`].

use crate::config::MAX_HISTORY_LIMIT;
use crate::error::ScanError;
use crate::ledger::{FetchedTransaction, LedgerRpc, Pubkey, Signature, SignatureInfo, SignatureQuery};
use crate::protocol::{NotRecognized, PactEvent};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Window of signatures to scan, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    /// Only signatures older than this one
    pub before: Option<Signature>,
    /// Stop at this signature
    pub until: Option<Signature>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistoryQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_HISTORY_LIMIT),
            before: None,
            until: None,
        }
    }

    pub fn before(mut self, signature: Signature) -> Self {
        self.before = Some(signature);
        self
    }

    pub fn until(mut self, signature: Signature) -> Self {
        self.until = Some(signature);
        self
    }
}

/// An event recovered from the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub signature: Signature,
    pub slot: u64,
    /// Ledger block time in seconds, `0` when the ledger has none
    pub block_time: i64,
    pub event: PactEvent,
}

/// Per-cause counters for one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Signatures listed
    pub signatures: usize,
    pub fetch_failed: usize,
    /// Landed but failed on the ledger, so nothing was recorded
    pub failed: usize,
    pub missing_meta: usize,
    pub no_annotation: usize,
    pub not_protocol: usize,
    pub accepted: usize,
}

impl ScanReport {
    pub fn skipped(&self) -> usize {
        self.fetch_failed + self.failed + self.missing_meta + self.no_annotation + self.not_protocol
    }

    pub fn absorb(&mut self, other: &ScanReport) {
        self.signatures += other.signatures;
        self.fetch_failed += other.fetch_failed;
        self.failed += other.failed;
        self.missing_meta += other.missing_meta;
        self.no_annotation += other.no_annotation;
        self.not_protocol += other.not_protocol;
        self.accepted += other.accepted;
    }

    fn count(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::FetchFailed(_) => self.fetch_failed += 1,
            SkipReason::Failed(_) => self.failed += 1,
            SkipReason::MissingMeta => self.missing_meta += 1,
            SkipReason::NoAnnotation => self.no_annotation += 1,
            SkipReason::NotProtocol(_) => self.not_protocol += 1,
        }
    }
}

/// Why a listed signature produced no event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The transaction could not be fetched, or the node did not know it
    FetchFailed(String),
    /// Ledger error on execution; the memo was rolled back
    Failed(String),
    MissingMeta,
    /// No memo instruction or memo log line
    NoAnnotation,
    NotProtocol(NotRecognized),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FetchFailed(reason) => write!(f, "fetch failed: {}", reason),
            SkipReason::Failed(reason) => write!(f, "transaction failed: {}", reason),
            SkipReason::MissingMeta => write!(f, "transaction has no metadata"),
            SkipReason::NoAnnotation => write!(f, "no memo"),
            SkipReason::NotProtocol(reason) => write!(f, "not an AgentPact event: {}", reason),
        }
    }
}

/// Callback invoked for every skipped signature
pub type SkipObserver = Arc<dyn Fn(&Signature, &SkipReason) + Send + Sync>;

/// One page of history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Newest block time first
    pub events: Vec<RecordedEvent>,
    /// Oldest signature listed, set when the page was full
    pub next_cursor: Option<Signature>,
    pub report: ScanReport,
}

/// Reads event history from a ledger
#[derive(Clone)]
pub struct Scanner {
    ledger: Arc<dyn LedgerRpc>,
    concurrency: usize,
    default_limit: usize,
    observer: Option<SkipObserver>,
}

impl Scanner {
    pub fn new(ledger: Arc<dyn LedgerRpc>, concurrency: usize, default_limit: usize) -> Self {
        Self {
            ledger,
            concurrency: concurrency.max(1),
            default_limit: default_limit.clamp(1, MAX_HISTORY_LIMIT),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SkipObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<SkipObserver>) {
        self.observer = observer;
    }

    /// Most recent events of `identity`
    pub async fn history(&self, identity: &str) -> Result<Vec<RecordedEvent>, ScanError> {
        let page = self.history_page(identity, &HistoryQuery::new(self.default_limit)).await?;
        Ok(page.events)
    }

    /// Scan one window of signatures
    pub async fn history_page(&self, identity: &str, query: &HistoryQuery) -> Result<HistoryPage, ScanError> {
        let address = parse_identity(identity)?;
        let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);

        let listing = self
            .ledger
            .signatures_for_address(
                &address,
                &SignatureQuery {
                    limit,
                    before: query.before,
                    until: query.until,
                },
            )
            .await?;

        let next_cursor = if listing.len() >= limit {
            listing.last().map(|info| info.signature)
        } else {
            None
        };

        let ledger = &self.ledger;
        let fetched: Vec<_> = stream::iter(listing.iter())
            .map(|info| async move { (info, ledger.get_transaction(&info.signature).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = ScanReport {
            signatures: listing.len(),
            ..ScanReport::default()
        };
        let mut events = Vec::new();
        for (info, result) in fetched {
            let outcome = match result {
                Ok(Some(tx)) => reconstruct(info, tx),
                Ok(None) => Err(SkipReason::FetchFailed("transaction not found".to_string())),
                Err(e) => Err(SkipReason::FetchFailed(e.to_string())),
            };
            match outcome {
                Ok(event) => {
                    report.accepted += 1;
                    events.push(event);
                }
                Err(reason) => {
                    report.count(&reason);
                    if let Some(observer) = &self.observer {
                        observer(&info.signature, &reason);
                    }
                }
            }
        }

        sort_newest_first(&mut events);
        tracing::debug!(
            %identity,
            listed = report.signatures,
            accepted = report.accepted,
            skipped = report.skipped(),
            "history page scanned"
        );

        Ok(HistoryPage {
            events,
            next_cursor,
            report,
        })
    }

    /// Walk up to `max_pages` pages backwards and merge them
    ///
    /// The returned cursor is where a further walk would resume.
    pub async fn full_history(
        &self,
        identity: &str,
        page_size: usize,
        max_pages: usize,
    ) -> Result<HistoryPage, ScanError> {
        self.walk(identity, HistoryQuery::new(page_size), max_pages).await
    }

    /// Like [`Scanner::full_history`], starting from an explicit window
    pub async fn walk(&self, identity: &str, start: HistoryQuery, max_pages: usize) -> Result<HistoryPage, ScanError> {
        let mut merged = HistoryPage::default();
        let mut seen = HashSet::new();
        let mut query = start;

        for _ in 0..max_pages.max(1) {
            let page = self.history_page(identity, &query).await?;
            merged.report.absorb(&page.report);
            merged
                .events
                .extend(page.events.into_iter().filter(|e| seen.insert(e.signature)));
            merged.next_cursor = page.next_cursor;

            match page.next_cursor {
                Some(cursor) => query.before = Some(cursor),
                None => break,
            }
        }

        sort_newest_first(&mut merged.events);
        Ok(merged)
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("concurrency", &self.concurrency)
            .field("default_limit", &self.default_limit)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_identity(identity: &str) -> Result<Pubkey, ScanError> {
    identity
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidIdentity(identity.to_string()))
}

fn reconstruct(info: &SignatureInfo, tx: FetchedTransaction) -> Result<RecordedEvent, SkipReason> {
    let meta = tx.meta.as_ref().ok_or(SkipReason::MissingMeta)?;
    if let Some(reason) = meta.err.as_ref().or(info.err.as_ref()) {
        return Err(SkipReason::Failed(reason.clone()));
    }
    let payload = tx.memo_payload().ok_or(SkipReason::NoAnnotation)?;
    let event = PactEvent::decode_bytes(&payload).map_err(SkipReason::NotProtocol)?;

    Ok(RecordedEvent {
        signature: info.signature,
        slot: tx.slot,
        block_time: tx.block_time.or(info.block_time).unwrap_or(0),
        event,
    })
}

/// Stable, so equal block times keep listing order
fn sort_newest_first(events: &mut [RecordedEvent]) {
    events.sort_by(|a, b| b.block_time.cmp(&a.block_time));
}
