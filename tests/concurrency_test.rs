mod common;

use common::*;
use nestpay::application::events::PaymentEvent;
use nestpay::application::orchestrator::{ProcessOptions, ReturnChannel};
use nestpay::domain::hash::HashAlgorithm;
use nestpay::domain::payment::PaymentState;
use nestpay::domain::ports::PaymentStore;
use nestpay::error::PaymentError;
use nestpay::infrastructure::in_memory::InMemoryPaymentStore;
use std::sync::Arc;
use tokio::sync::Barrier;

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_callbacks_process_once() {
    let store = InMemoryPaymentStore::new();
    pending_payment(&store, "1001").await;
    let response = approved_callback("1001");
    let barrier = Arc::new(Barrier::new(RACERS));

    let mut handles = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..RACERS {
        let (mut orchestrator, rx) = orchestrator(&store, None);
        receivers.push(rx);
        let response = response.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            orchestrator
                .process_gateway_callback(&response, ReturnChannel::OkUrl, ProcessOptions::default())
                .await
        }));
    }

    let mut processed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(payment) => {
                assert_eq!(payment.state(), PaymentState::ProcessedSuccess);
                processed += 1;
            }
            Err(PaymentError::AlreadyProcessed { oid }) => {
                assert_eq!(oid, "1001");
                rejected += 1;
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(processed, 1);
    assert_eq!(rejected, RACERS - 1);

    let events: Vec<PaymentEvent> = receivers.iter_mut().flat_map(drain).collect();
    let successes = events
        .iter()
        .filter(|e| matches!(e, PaymentEvent::Succeeded(_)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(events.len(), RACERS);

    let stored = store.load("1001").await.unwrap().unwrap();
    assert_eq!(stored.state(), PaymentState::ProcessedSuccess);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_orders_do_not_block_each_other() {
    let store = InMemoryPaymentStore::new();
    let mut handles = Vec::new();
    for i in 0..RACERS {
        let oid = format!("order-{i}");
        pending_payment(&store, &oid).await;
        let (mut orchestrator, _rx) = orchestrator(&store, None);
        let response = approved_callback(&oid);
        handles.push(tokio::spawn(async move {
            orchestrator
                .process_gateway_callback(&response, ReturnChannel::OkUrl, ProcessOptions::default())
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_processed());
    }
    assert_eq!(store.all().await.len(), RACERS);
}

#[tokio::test]
async fn test_stale_reconcile_cannot_reopen_processed_payment() {
    let store = InMemoryPaymentStore::new();
    pending_payment(&store, "1001").await;
    let gateway = FakeGateway::with_status(fields(&[("HostRefNum", "r")]));

    let (mut stale, mut stale_rx) = orchestrator(&store, Some(Box::new(gateway)));
    stale.set_working_payment("1001".into()).await.unwrap();

    let (mut winner, mut winner_rx) = orchestrator(&store, None);
    winner
        .process_gateway_callback(
            &approved_callback("1001"),
            ReturnChannel::OkUrl,
            ProcessOptions::default(),
        )
        .await
        .unwrap();

    let err = stale
        .reconcile_with_gateway(None, false, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyProcessed { .. }));
    assert!(store.load("1001").await.unwrap().unwrap().is_processed());

    let (mut replay, mut replay_rx) = orchestrator(&store, None);
    assert!(matches!(
        replay
            .process_gateway_callback(
                &approved_callback("1001"),
                ReturnChannel::OkUrl,
                ProcessOptions::default(),
            )
            .await,
        Err(PaymentError::AlreadyProcessed { .. })
    ));

    let successes = [&mut stale_rx, &mut winner_rx, &mut replay_rx]
        .into_iter()
        .flat_map(drain)
        .filter(|e| matches!(e, PaymentEvent::Succeeded(_)))
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_stale_request_build_cannot_reopen_processed_payment() {
    let store = InMemoryPaymentStore::new();
    pending_payment(&store, "1001").await;

    let (mut stale, _rx) = orchestrator(&store, None);
    stale.set_working_payment("1001".into()).await.unwrap();

    let (mut winner, _rx) = orchestrator(&store, None);
    winner
        .process_gateway_callback(
            &approved_callback("1001"),
            ReturnChannel::OkUrl,
            ProcessOptions::default(),
        )
        .await
        .unwrap();

    let err = stale
        .build_request_parameters(None, HashAlgorithm::V2)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyProcessed { .. }));
    let stored = store.load("1001").await.unwrap().unwrap();
    assert_eq!(stored.state(), PaymentState::ProcessedSuccess);
}
