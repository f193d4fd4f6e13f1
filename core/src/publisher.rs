//! Event publisher
//!
//! Turns a [`PactEvent`] into a single memo write and hands it to the
//! active signer. A publish either returns a confirmed signature or fails
//! as a whole; nothing is retried here, since a retried publish is a second,
//! distinct event.

use crate::error::{ConfigurationError, PublishError};
use crate::ledger::{Signature, PACKET_DATA_SIZE};
use crate::protocol::PactEvent;
use crate::signer::{PendingWrite, TransactionSigner};
use std::sync::Arc;

/// Publishes events through an optional signer
#[derive(Clone)]
pub struct Publisher {
    signer: Option<Arc<dyn TransactionSigner>>,
    rpc_url: String,
}

impl Publisher {
    pub fn new(signer: Option<Arc<dyn TransactionSigner>>, rpc_url: impl Into<String>) -> Self {
        Self {
            signer,
            rpc_url: rpc_url.into(),
        }
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Encode, sign, submit, and wait for confirmation
    pub async fn publish(&self, event: &PactEvent) -> Result<Signature, PublishError> {
        let signer = self.signer.as_ref().ok_or(ConfigurationError::NoSigner)?;

        validate(event)?;
        let write = PendingWrite::new(event.encode()?.into_bytes());

        let size = write.wire_size();
        if size > PACKET_DATA_SIZE {
            return Err(PublishError::PayloadTooLarge {
                size,
                limit: PACKET_DATA_SIZE,
            });
        }

        let signature = signer.sign_and_submit(&write).await?;
        tracing::info!(
            kind = %event.kind(),
            task = event.task(),
            signer = signer.name(),
            %signature,
            explorer = %explorer_link(&signature, &self.rpc_url),
            "event published"
        );
        Ok(signature)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("signer", &self.signer.as_ref().map(|s| s.name()))
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

fn validate(event: &PactEvent) -> Result<(), PublishError> {
    let fields: [(&'static str, &str); 3] = match event {
        PactEvent::Handoff(h) => [("from", h.from.as_str()), ("to", h.to.as_str()), ("task", h.task.as_str())],
        PactEvent::Completion(c) => [
            ("agent", c.agent.as_str()),
            ("task", c.task.as_str()),
            ("result", c.result.as_str()),
        ],
    };
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some(&(field, _)) => Err(PublishError::InvalidEvent { field }),
        None => Ok(()),
    }
}

/// Block explorer URL for a signature on the cluster behind `rpc_url`
pub fn explorer_link(signature: &Signature, rpc_url: &str) -> String {
    let base = format!("https://explorer.solana.com/tx/{}", signature);
    if rpc_url.contains("mainnet") {
        base
    } else if rpc_url.contains("devnet") {
        format!("{}?cluster=devnet", base)
    } else if rpc_url.contains("testnet") {
        format!("{}?cluster=testnet", base)
    } else {
        format!("{}?cluster=custom&customUrl={}", base, rpc_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NetworkError, SigningError};
    use crate::protocol::{create_completion_log, create_handoff_log};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Signer that records writes instead of submitting them
    #[derive(Default)]
    struct RecordingSigner {
        writes: Mutex<Vec<PendingWrite>>,
        fail_with_timeout: bool,
    }

    #[async_trait]
    impl TransactionSigner for RecordingSigner {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn sign_and_submit(&self, write: &PendingWrite) -> Result<Signature, PublishError> {
            if self.fail_with_timeout {
                return Err(NetworkError::ConfirmationTimeout {
                    signature: "pending".to_string(),
                    duration: std::time::Duration::from_secs(60),
                }
                .into());
            }
            let mut writes = self.writes.lock();
            writes.push(write.clone());
            let mut bytes = [0u8; 64];
            bytes[0] = writes.len() as u8;
            Ok(Signature(bytes))
        }
    }

    fn publisher(signer: Arc<RecordingSigner>) -> Publisher {
        Publisher::new(Some(signer), "https://api.devnet.solana.com")
    }

    #[tokio::test]
    async fn test_publish_encodes_event_as_memo() {
        let signer = Arc::new(RecordingSigner::default());
        let event: PactEvent = create_handoff_log("Kevin", "Clawd", "Investigate pricing page").into();

        let sig = publisher(signer.clone()).publish(&event).await.unwrap();
        assert_eq!(sig.as_bytes()[0], 1);

        let writes = signer.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(PactEvent::decode_bytes(writes[0].payload()).unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_signer() {
        let publisher = Publisher::new(None, "https://api.devnet.solana.com");
        let event: PactEvent = create_completion_log("Clawd", "task", "done").into();
        let err = publisher.publish(&event).await.unwrap_err();
        assert!(matches!(err, PublishError::Configuration(ConfigurationError::NoSigner)));
        assert!(!publisher.has_signer());
    }

    #[tokio::test]
    async fn test_publish_rejects_blank_fields() {
        let signer = Arc::new(RecordingSigner::default());
        let event: PactEvent = create_handoff_log("Kevin", "  ", "task").into();
        let err = publisher(signer.clone()).publish(&event).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidEvent { field: "to" }));
        assert!(signer.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_rejects_oversized_payload() {
        let signer = Arc::new(RecordingSigner::default());
        let task = "x".repeat(1300);
        let event: PactEvent = create_completion_log("Clawd", &task, "done").into();
        let err = publisher(signer.clone()).publish(&event).await.unwrap_err();
        match err {
            PublishError::PayloadTooLarge { size, limit } => {
                assert!(size > limit);
                assert_eq!(limit, PACKET_DATA_SIZE);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(signer.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_signer_failure_propagates() {
        let signer = Arc::new(RecordingSigner {
            fail_with_timeout: true,
            ..Default::default()
        });
        let event: PactEvent = create_handoff_log("a", "b", "c").into();
        let err = publisher(signer).publish(&event).await.unwrap_err();
        assert!(err.is_retryable());

        let err: PublishError = SigningError::NoCredential.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_explorer_link_cluster() {
        let sig = Signature([7u8; 64]);
        assert!(explorer_link(&sig, "https://api.devnet.solana.com").ends_with("?cluster=devnet"));
        assert!(!explorer_link(&sig, "https://api.mainnet-beta.solana.com").contains('?'));
        assert!(explorer_link(&sig, "http://127.0.0.1:8899").contains("customUrl=http://127.0.0.1:8899"));
    }
}
