//! Relay submission
//!
//! `Bundler` hands a complete bundle to the block engine as one atomic unit
//! and classifies the answer. There is no partial success: either every
//! envelope lands together or none does, and nothing here retries. A
//! `Dropped` outcome is the caller's cue to rebuild with a fresh blockhash.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::metrics::{with_metrics, Timer};
use crate::observability::TraceContext;
use crate::rpc_manager::{poll_until, RetryPolicy, RpcManagerError, RpcResult};
use crate::structured_logging::StructuredLogger;

use super::errors::{BuildResult, TransactionBuilderError};
use super::output::Bundle;

/// Relay message for a bundle no leader could pick up in time
pub const DROPPED_MARKER: &str = "Bundle Dropped, no connected leader up soon";

/// Result of handing a bundle to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    /// Relay accepted the bundle under this id
    Accepted(String),
    /// No eligible block producer reachable in time; retryable with fresh state
    Dropped(String),
    /// Malformed bundle, HTTP failure or any other relay error
    TransportError(String),
}

impl BundleOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BundleOutcome::Accepted(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            BundleOutcome::Accepted(_) => "accepted",
            BundleOutcome::Dropped(_) => "dropped",
            BundleOutcome::TransportError(_) => "transport_error",
        }
    }

    /// Bundle id on acceptance, the matching builder error otherwise
    pub fn into_result(self) -> BuildResult<String> {
        match self {
            BundleOutcome::Accepted(id) => Ok(id),
            BundleOutcome::Dropped(reason) => Err(TransactionBuilderError::SubmissionDropped(reason)),
            BundleOutcome::TransportError(detail) => Err(TransactionBuilderError::Transport(detail)),
        }
    }
}

/// Classify a relay error message
pub fn classify_relay_error(message: &str) -> BundleOutcome {
    if message.contains(DROPPED_MARKER) {
        BundleOutcome::Dropped(message.to_string())
    } else {
        BundleOutcome::TransportError(message.to_string())
    }
}

/// In-flight status reported by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BundleStatus {
    Pending,
    Landed,
    Failed,
    Invalid,
}

/// Relay collaborator
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Submit envelopes in order as one atomic bundle
    async fn submit(&self, bundle: &Bundle, trace: &TraceContext) -> BundleOutcome;

    /// Current status of a submitted bundle, `None` when the relay does not
    /// know the id (yet)
    async fn bundle_status(&self, bundle_id: &str) -> RpcResult<Option<BundleStatus>>;
}

/// Submit with metrics and structured logging around the relay call
pub async fn submit_bundle<B>(bundler: &B, bundle: &Bundle, trace: &TraceContext) -> BundleOutcome
where
    B: Bundler + ?Sized,
{
    let logger = StructuredLogger::for_trace(trace);
    let timer = Timer::start();
    with_metrics(|m| m.bundles_submitted.inc());

    let outcome = bundler.submit(bundle, trace).await;
    let latency_ms = (timer.elapsed_secs() * 1000.0) as u64;
    timer.observe(|m| &m.submit_latency);

    match &outcome {
        BundleOutcome::Accepted(id) => {
            with_metrics(|m| m.bundles_accepted.inc());
            logger.log_bundle_submitted(bundle.label(), id, latency_ms);
        }
        BundleOutcome::Dropped(reason) => {
            with_metrics(|m| m.bundles_dropped.inc());
            logger.log_bundle_dropped(bundle.label(), reason);
        }
        BundleOutcome::TransportError(detail) => {
            with_metrics(|m| m.bundles_transport_errors.inc());
            logger.log_bundle_transport_error(bundle.label(), detail);
        }
    }
    outcome
}

/// Poll the relay until an accepted bundle lands or fails
///
/// `Landed` keeps the acceptance, `Failed`/`Invalid` become `Dropped`, and an
/// exhausted policy or a non-retryable relay error becomes `TransportError`.
pub async fn await_landing<B>(bundler: &B, bundle_id: &str, policy: &RetryPolicy) -> BundleOutcome
where
    B: Bundler + ?Sized,
{
    let polled = poll_until("bundle_status", policy, |_| async move {
        Ok(match bundler.bundle_status(bundle_id).await? {
            Some(BundleStatus::Pending) | None => None,
            Some(status) => Some(status),
        })
    })
    .await;

    match polled {
        Ok(Some(BundleStatus::Landed)) => BundleOutcome::Accepted(bundle_id.to_string()),
        Ok(Some(status)) => BundleOutcome::Dropped(format!("bundle {bundle_id} reported {status:?}")),
        Ok(None) => BundleOutcome::TransportError(format!(
            "bundle {bundle_id} status unknown after {} polls",
            policy.max_attempts
        )),
        Err(e) => BundleOutcome::TransportError(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct InflightStatuses {
    value: Vec<InflightStatus>,
}

#[derive(Debug, Deserialize)]
struct InflightStatus {
    bundle_id: String,
    status: BundleStatus,
}

/// Jito block engine client over JSON-RPC
#[derive(Debug, Clone)]
pub struct JitoBundler {
    http: Client,
    endpoint: String,
}

impl JitoBundler {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> BuildResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransactionBuilderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bundles_url(&self) -> String {
        format!("{}/api/v1/bundles", self.endpoint)
    }

    fn statuses_url(&self) -> String {
        format!("{}/api/v1/getInflightBundleStatuses", self.endpoint)
    }
}

#[async_trait]
impl Bundler for JitoBundler {
    async fn submit(&self, bundle: &Bundle, trace: &TraceContext) -> BundleOutcome {
        let encoded = match bundle.encoded_transactions() {
            Ok(encoded) => encoded,
            Err(e) => return BundleOutcome::TransportError(e.to_string()),
        };

        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded, { "encoding": "base64" }],
        });

        tracing::debug!(
            correlation_id = %trace.correlation_id(),
            endpoint = %self.endpoint,
            envelopes = bundle.len(),
            "Sending bundle"
        );

        let resp = match self.http.post(self.bundles_url()).json(&payload).send().await {
            Ok(resp) => resp,
            Err(e) => return BundleOutcome::TransportError(format!("relay request failed: {e}")),
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return BundleOutcome::TransportError(format!("relay response unreadable: {e}")),
        };

        match serde_json::from_str::<JsonRpcResponse<String>>(&body) {
            Ok(JsonRpcResponse { error: Some(err), .. }) => {
                classify_relay_error(&format!("{} (code {})", err.message, err.code))
            }
            Ok(JsonRpcResponse { result: Some(id), .. }) if status.is_success() => BundleOutcome::Accepted(id),
            _ => classify_relay_error(&format!("relay returned {status}: {body}")),
        }
    }

    async fn bundle_status(&self, bundle_id: &str) -> RpcResult<Option<BundleStatus>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getInflightBundleStatuses",
            "params": [[bundle_id]],
        });

        let resp = self
            .http
            .post(self.statuses_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcManagerError::Transport {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;

        let parsed: JsonRpcResponse<InflightStatuses> = resp.json().await.map_err(|e| RpcManagerError::Transport {
            endpoint: self.endpoint.clone(),
            message: format!("invalid status response: {e}"),
        })?;

        if let Some(err) = parsed.error {
            return Err(RpcManagerError::classify_message(&err.message, &self.endpoint));
        }

        Ok(parsed
            .result
            .and_then(|r| r.value.into_iter().find(|s| s.bundle_id == bundle_id))
            .map(|s| s.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::builder::{EnvelopeBuilder, EnvelopeRequest, SignerPool};
    use crate::tx_builder::context::BuildContext;
    use crate::tx_builder::instructions::tip_instruction;
    use solana_sdk::{hash::Hash, signature::Keypair, signer::Signer};

    fn bundle() -> Bundle {
        let payer = Keypair::new();
        let ctx = BuildContext::new(Hash::new_unique(), 1_000);
        let ixs = [tip_instruction(&payer.pubkey(), 1_000)];
        let env = EnvelopeBuilder::new(&ctx)
            .build(
                &EnvelopeRequest {
                    label: "tip",
                    chunk_index: 0,
                    fee_payer: payer.pubkey(),
                    instructions: &ixs,
                    compress: false,
                },
                &SignerPool::new().with(&payer),
            )
            .unwrap();
        Bundle::new("tip", vec![env]).unwrap()
    }

    #[test]
    fn test_classify_dropped_vs_transport() {
        assert!(matches!(
            classify_relay_error("Error: Bundle Dropped, no connected leader up soon"),
            BundleOutcome::Dropped(_)
        ));
        assert!(matches!(
            classify_relay_error("bundle contains an already processed transaction"),
            BundleOutcome::TransportError(_)
        ));
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(BundleOutcome::Accepted("id".into()).into_result().unwrap(), "id");
        assert!(matches!(
            BundleOutcome::Dropped("x".into()).into_result(),
            Err(TransactionBuilderError::SubmissionDropped(_))
        ));
        assert!(matches!(
            BundleOutcome::TransportError("x".into()).into_result(),
            Err(TransactionBuilderError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_jito_submit_accepted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/bundles")
            .match_body(mockito::Matcher::PartialJson(json!({ "method": "sendBundle" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","result":"b1d","id":1}"#)
            .create_async()
            .await;

        let bundler = JitoBundler::new(server.url(), Duration::from_secs(5)).unwrap();
        let outcome = bundler.submit(&bundle(), &TraceContext::new("test")).await;
        assert_eq!(outcome, BundleOutcome::Accepted("b1d".into()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_jito_submit_dropped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Bundle Dropped, no connected leader up soon"},"id":1}"#,
            )
            .create_async()
            .await;

        let bundler = JitoBundler::new(server.url(), Duration::from_secs(5)).unwrap();
        let outcome = bundler.submit(&bundle(), &TraceContext::new("test")).await;
        assert!(matches!(outcome, BundleOutcome::Dropped(_)));
    }

    #[tokio::test]
    async fn test_jito_submit_http_error_is_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let bundler = JitoBundler::new(server.url(), Duration::from_secs(5)).unwrap();
        let outcome = bundler.submit(&bundle(), &TraceContext::new("test")).await;
        assert!(matches!(outcome, BundleOutcome::TransportError(_)));
    }

    #[tokio::test]
    async fn test_jito_bundle_status_landed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/getInflightBundleStatuses")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","result":{"context":{"slot":1},"value":[{"bundle_id":"b1d","status":"Landed","landed_slot":1}]},"id":1}"#,
            )
            .create_async()
            .await;

        let bundler = JitoBundler::new(server.url(), Duration::from_secs(5)).unwrap();
        let status = bundler.bundle_status("b1d").await.unwrap();
        assert_eq!(status, Some(BundleStatus::Landed));
        let outcome = await_landing(&bundler, "b1d", &RetryPolicy::default()).await;
        assert_eq!(outcome, BundleOutcome::Accepted("b1d".into()));
    }
}
