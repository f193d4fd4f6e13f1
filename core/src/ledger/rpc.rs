//! Solana JSON-RPC client
//!
//! One `reqwest` client with a per-request timeout. Every method maps
//! transport failures, HTTP status errors and JSON-RPC error objects to
//! [`NetworkError`] so callers can decide what to retry.

use super::{
    Checkpoint, Commitment, CompiledInstruction, FetchedTransaction, Hash, LedgerRpc, Pubkey,
    Signature, SignatureInfo, SignatureQuery, SignatureStatus, TransactionMeta,
};
use crate::error::{ConfigurationError, NetworkError};
use crate::util::sanitize_base_url;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// JSON-RPC backed ledger
pub struct JsonRpcClient {
    url: String,
    http_client: HttpClient,
    commitment: Commitment,
    timeout: Duration,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    slot: u64,
    #[serde(default)]
    err: Value,
    confirmation_status: Option<Commitment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureEntry {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Value,
    block_time: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<EncodedMeta>,
    transaction: EncodedInner,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMeta {
    #[serde(default)]
    err: Value,
    #[serde(default)]
    log_messages: Option<Vec<String>>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize, Default)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Deserialize)]
struct EncodedInner {
    signatures: Vec<String>,
    message: EncodedMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<String>,
    instructions: Vec<EncodedInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedInstruction {
    program_id_index: u8,
    #[serde(default)]
    accounts: Vec<u8>,
    data: String,
}

impl JsonRpcClient {
    /// Create a client for `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ConfigurationError> {
        let url = sanitize_base_url(url, "rpc_url").map_err(|e| ConfigurationError::InvalidEndpoint {
            field: "rpc_url".to_string(),
            reason: e.to_string(),
        })?;

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("agentpact/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationError::InvalidEndpoint {
                field: "rpc_url".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            url,
            http_client,
            commitment: Commitment::Confirmed,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Commitment used for reads and checkpoint queries, never below
    /// `confirmed` since the history reads reject anything lower
    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment.durable();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NetworkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "rpc request");

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(method, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::HttpStatus {
                operation: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::from_reqwest(method, e, self.timeout))?;

        if let Some(err) = envelope.error {
            return Err(NetworkError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }

        serde_json::from_value(envelope.result).map_err(|e| invalid(method, e))
    }

    fn commitment_config(&self) -> Value {
        json!({ "commitment": self.commitment.as_str() })
    }
}

fn invalid(operation: &str, err: impl std::fmt::Display) -> NetworkError {
    NetworkError::InvalidResponse {
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

fn error_text(err: &Value) -> Option<String> {
    if err.is_null() {
        None
    } else {
        Some(err.to_string())
    }
}

fn parse_id<T: std::str::FromStr>(operation: &str, s: &str) -> Result<T, NetworkError>
where
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e| invalid(operation, e))
}

impl EncodedTransaction {
    fn into_fetched(self) -> Result<FetchedTransaction, NetworkError> {
        const OP: &str = "getTransaction";

        let signature = self
            .transaction
            .signatures
            .first()
            .ok_or_else(|| invalid(OP, "transaction has no signatures"))
            .and_then(|s| parse_id::<Signature>(OP, s))?;

        let mut account_keys = self
            .transaction
            .message
            .account_keys
            .iter()
            .map(|k| parse_id::<Pubkey>(OP, k))
            .collect::<Result<Vec<_>, _>>()?;

        let meta = match self.meta {
            Some(meta) => {
                let loaded = meta.loaded_addresses.unwrap_or_default();
                for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
                    account_keys.push(parse_id::<Pubkey>(OP, key)?);
                }
                Some(TransactionMeta {
                    err: error_text(&meta.err),
                    log_messages: meta.log_messages.unwrap_or_default(),
                })
            }
            None => None,
        };

        let instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .map(|ix| {
                let data = bs58::decode(&ix.data).into_vec().map_err(|e| invalid(OP, e))?;
                Ok(CompiledInstruction {
                    program_id_index: ix.program_id_index,
                    accounts: ix.accounts,
                    data,
                })
            })
            .collect::<Result<Vec<_>, NetworkError>>()?;

        Ok(FetchedTransaction {
            signature,
            slot: self.slot,
            block_time: self.block_time,
            meta,
            account_keys,
            instructions,
        })
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcClient {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError> {
        const OP: &str = "getLatestBlockhash";
        let value: WithContext<BlockhashValue> = self.call(OP, json!([self.commitment_config()])).await?;
        Ok(Checkpoint {
            blockhash: parse_id::<Hash>(OP, &value.value.blockhash)?,
            last_valid_block_height: value.value.last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        self.call("getBlockHeight", json!([self.commitment_config()])).await
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, NetworkError> {
        const OP: &str = "sendTransaction";
        let encoded = BASE64.encode(wire);
        let signature: String = self
            .call(
                OP,
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": self.commitment.as_str(),
                }]),
            )
            .await?;
        parse_id(OP, &signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, NetworkError> {
        let statuses: WithContext<Vec<Option<StatusValue>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;

        Ok(statuses.value.into_iter().next().flatten().map(|s| SignatureStatus {
            slot: s.slot,
            confirmation: s.confirmation_status,
            err: error_text(&s.err),
        }))
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, NetworkError> {
        const OP: &str = "getSignaturesForAddress";
        let mut config = json!({
            "limit": query.limit,
            "commitment": self.commitment.as_str(),
        });
        if let Some(before) = &query.before {
            config["before"] = json!(before.to_string());
        }
        if let Some(until) = &query.until {
            config["until"] = json!(until.to_string());
        }

        let entries: Vec<SignatureEntry> = self.call(OP, json!([address.to_string(), config])).await?;
        entries
            .into_iter()
            .map(|e| {
                Ok(SignatureInfo {
                    signature: parse_id(OP, &e.signature)?,
                    slot: e.slot,
                    block_time: e.block_time,
                    err: error_text(&e.err),
                })
            })
            .collect()
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<FetchedTransaction>, NetworkError> {
        let encoded: Option<EncodedTransaction> = self
            .call(
                "getTransaction",
                json!([signature.to_string(), {
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0,
                    "commitment": self.commitment.as_str(),
                }]),
            )
            .await?;
        encoded.map(EncodedTransaction::into_fetched).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{memo_program_id, MEMO_PROGRAM_ID};
    use crate::test_support::{StubResponse, StubServer};

    fn rpc_result(result: Value) -> StubResponse {
        StubResponse::json(200, json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            JsonRpcClient::new("api.devnet.solana.com", Duration::from_secs(5)),
            Err(ConfigurationError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_latest_checkpoint() {
        let blockhash = Hash([4u8; 32]).to_string();
        let server = StubServer::start(move |req| {
            assert_eq!(req.json()["method"], "getLatestBlockhash");
            rpc_result(json!({
                "context": { "slot": 10 },
                "value": { "blockhash": blockhash, "lastValidBlockHeight": 300 }
            }))
        })
        .await;

        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        let checkpoint = client.latest_checkpoint().await.unwrap();
        assert_eq!(checkpoint.blockhash, Hash([4u8; 32]));
        assert_eq!(checkpoint.last_valid_block_height, 300);
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let server = StubServer::start(|_| {
            StubResponse::json(
                200,
                json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid param" } }),
            )
        })
        .await;

        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        let err = client.block_height().await.unwrap_err();
        assert!(matches!(err, NetworkError::Rpc { code: -32602, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = StubServer::start(|_| StubResponse::text(503, "maintenance")).await;
        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        let err = client.block_height().await.unwrap_err();
        assert!(matches!(err, NetworkError::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_signatures_for_address_sends_cursor() {
        let sig = Signature([8u8; 64]);
        let before = Signature([9u8; 64]);
        let expected_before = before.to_string();
        let sig_text = sig.to_string();
        let server = StubServer::start(move |req| {
            let body = req.json();
            assert_eq!(body["method"], "getSignaturesForAddress");
            assert_eq!(body["params"][1]["limit"], 2);
            assert_eq!(body["params"][1]["before"], expected_before.as_str());
            assert_eq!(body["params"][1]["commitment"], "confirmed");
            rpc_result(json!([
                { "signature": sig_text, "slot": 5, "err": null, "memo": null, "blockTime": 1700000000 }
            ]))
        })
        .await;

        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5))
            .unwrap()
            .with_commitment(Commitment::Processed);
        let query = SignatureQuery {
            limit: 2,
            before: Some(before),
            until: None,
        };
        let infos = client.signatures_for_address(&Pubkey([1u8; 32]), &query).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].signature, sig);
        assert_eq!(infos[0].block_time, Some(1700000000));
    }

    #[tokio::test]
    async fn test_get_transaction_decodes_memo() {
        let sig = Signature([2u8; 64]);
        let payer = Pubkey([3u8; 32]);
        let tx_json = json!({
            "slot": 42,
            "blockTime": 1700000100,
            "meta": { "err": null, "logMessages": ["Program log: Memo (len 5): \"hello\""] },
            "transaction": {
                "signatures": [sig.to_string()],
                "message": {
                    "accountKeys": [payer.to_string(), MEMO_PROGRAM_ID],
                    "header": { "numRequiredSignatures": 1, "numReadonlySignedAccounts": 0, "numReadonlyUnsignedAccounts": 1 },
                    "recentBlockhash": Hash::default().to_string(),
                    "instructions": [
                        { "programIdIndex": 1, "accounts": [], "data": bs58::encode(b"hello").into_string(), "stackHeight": null }
                    ]
                }
            }
        });
        let server = StubServer::start(move |_| rpc_result(tx_json.clone())).await;

        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        let tx = client.get_transaction(&sig).await.unwrap().unwrap();
        assert_eq!(tx.signature, sig);
        assert_eq!(tx.slot, 42);
        assert_eq!(tx.block_time, Some(1700000100));
        assert_eq!(tx.account_keys[1], memo_program_id());
        assert_eq!(tx.memo_payload().unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_get_transaction_null_result() {
        let server = StubServer::start(|_| rpc_result(Value::Null)).await;
        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        assert!(client.get_transaction(&Signature([1u8; 64])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signature_status_mapping() {
        let server = StubServer::start(|_| {
            rpc_result(json!({
                "context": { "slot": 7 },
                "value": [{ "slot": 7, "confirmations": 0, "err": { "InstructionError": [0, "Custom"] }, "confirmationStatus": "confirmed" }]
            }))
        })
        .await;
        let client = JsonRpcClient::new(&server.url, Duration::from_secs(5)).unwrap();
        let status = client.signature_status(&Signature([1u8; 64])).await.unwrap().unwrap();
        assert_eq!(status.confirmation, Some(Commitment::Confirmed));
        assert!(status.err.unwrap().contains("InstructionError"));
    }
}
