//! Integration tests for relay submission
//!
//! This test validates:
//! - MockBundler success, dropped and failure scenarios
//! - Bundler trait interface
//! - Landing confirmation through bundle status polling
//! - Metrics collection around submission

use launch_bundler::metrics::metrics;
use launch_bundler::observability::TraceContext;
use launch_bundler::rpc_manager::RetryPolicy;
use launch_bundler::test_utils::MockBundler;
use launch_bundler::tx_builder::{
    await_landing, submit_bundle, BuildContext, Bundle, BundleBuilder, BundleOutcome, BundleStatus, Bundler,
    ReclaimRequest, TransactionBuilderError,
};
use solana_sdk::{hash::Hash, signature::Keypair};
use std::time::Duration;

fn reclaim_bundle() -> Bundle {
    let payer = Keypair::new();
    let wallets: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let ctx = BuildContext::new(Hash::new_unique(), 10_000_000);
    BundleBuilder::new(&ctx)
        .reclaim(&ReclaimRequest {
            fee_payer: &payer,
            wallets: wallets.iter().map(|w| (w, 1_000_000)).collect(),
        })
        .unwrap()
}

#[tokio::test]
async fn test_mock_bundler_success_scenario() {
    let bundler = MockBundler::new_success();
    let trace_ctx = TraceContext::new("test_bundle_success");
    let bundle = reclaim_bundle();

    let outcome = submit_bundle(&bundler, &bundle, &trace_ctx).await;

    assert!(outcome.is_accepted());
    assert_eq!(outcome.into_result().unwrap(), "mock-bundle-id");
    assert_eq!(bundler.submission_count(), 1);
    assert_eq!(bundler.submitted()[0].signatures(), bundle.signatures());
}

#[tokio::test]
async fn test_mock_bundler_dropped_scenario() {
    let bundler = MockBundler::new_dropped();
    let trace_ctx = TraceContext::new("test_bundle_dropped");

    let outcome = submit_bundle(&bundler, &reclaim_bundle(), &trace_ctx).await;

    assert_eq!(outcome.label(), "dropped");
    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, TransactionBuilderError::SubmissionDropped(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_mock_bundler_failure_scenario() {
    let bundler = MockBundler::new_failure();
    let trace_ctx = TraceContext::new("test_bundle_failure");

    let outcome = submit_bundle(&bundler, &reclaim_bundle(), &trace_ctx).await;

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, TransactionBuilderError::Transport(_)));
    assert_eq!(err.category(), "transport");
}

#[tokio::test]
async fn test_bundler_trait_object() {
    let bundler: Box<dyn Bundler> = Box::new(MockBundler::new_success());
    let trace_ctx = TraceContext::new("test_trait_object");

    let outcome = submit_bundle(bundler.as_ref(), &reclaim_bundle(), &trace_ctx).await;
    assert!(outcome.is_accepted());
}

#[tokio::test(start_paused = true)]
async fn test_landing_confirmation() {
    let policy = RetryPolicy::new(5, Duration::from_millis(500));

    let landed = MockBundler::new_success();
    assert_eq!(
        await_landing(&landed, "id", &policy).await,
        BundleOutcome::Accepted("id".into())
    );

    let failed = MockBundler::new_success().with_status(Some(BundleStatus::Failed));
    assert_eq!(await_landing(&failed, "id", &policy).await.label(), "dropped");

    let unknown = MockBundler::new_success().with_status(None);
    assert_eq!(await_landing(&unknown, "id", &policy).await.label(), "transport_error");
}

#[tokio::test]
async fn test_submission_metrics_collected() {
    let Some(m) = metrics() else {
        return;
    };
    let before = m.bundles_submitted.get();
    let bundler = MockBundler::new_success();
    submit_bundle(&bundler, &reclaim_bundle(), &TraceContext::new("metrics")).await;

    assert!(m.bundles_submitted.get() > before);
    assert!(m.render().contains("bundles_submitted"));
}
