#![allow(dead_code)]

use async_trait::async_trait;
use nestpay::application::events::{ChannelObserver, PaymentEvent};
use nestpay::application::orchestrator::{OrchestratorComponents, PaymentOrchestrator};
use nestpay::domain::config::MerchantConfig;
use nestpay::domain::hash::{self, HashAlgorithm, HashInput};
use nestpay::domain::payment::Payment;
use nestpay::domain::ports::{GatewayClient, GatewayClientBox, PaymentStore};
use nestpay::error::{FieldMap, PaymentError, Result};
use nestpay::infrastructure::in_memory::InMemoryPaymentStore;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub const CLIENT_ID: &str = "100";
pub const STORE_KEY: &str = "SECRET";
pub const OK_URL: &str = "https://shop.example/ok";
pub const FAIL_URL: &str = "https://shop.example/fail";

pub fn config() -> MerchantConfig {
    MerchantConfig::new(CLIENT_ID, STORE_KEY)
        .unwrap()
        .with_urls(OK_URL, FAIL_URL)
        .with_gate_url("https://gate.example/fim/est3Dgate")
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A callback signed the way the gateway signs it (`ver2`).
pub fn signed_callback(pairs: &[(&str, &str)], hash_params: &str) -> FieldMap {
    let mut response = fields(pairs);
    let values: Vec<&str> = hash_params
        .split('|')
        .map(|f| response.get(f).map(String::as_str).unwrap_or_default())
        .collect();
    let hash = hash::compute_hash(STORE_KEY, HashInput::Ordered(&values), HashAlgorithm::V2);
    response.insert("HASHPARAMS".to_string(), hash_params.to_string());
    response.insert("HASH".to_string(), hash);
    response
}

pub fn approved_callback(oid: &str) -> FieldMap {
    signed_callback(
        &[
            ("Response", "Approved"),
            ("clientid", CLIENT_ID),
            ("oid", oid),
            ("AuthCode", "123456"),
            ("mdStatus", "1"),
        ],
        "clientid|oid|Response",
    )
}

/// Orchestrator wired to a shared store and a channel observer.
pub fn orchestrator(
    store: &InMemoryPaymentStore,
    gateway: Option<GatewayClientBox>,
) -> (PaymentOrchestrator, UnboundedReceiver<PaymentEvent>) {
    let (observer, rx) = ChannelObserver::new();
    let orchestrator = PaymentOrchestrator::from_components(OrchestratorComponents {
        config: config(),
        store: Box::new(store.clone()),
        gateway,
        observer: Some(Box::new(observer)),
        working_payment: None,
    });
    (orchestrator, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<PaymentEvent>) -> Vec<PaymentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub async fn pending_payment(store: &InMemoryPaymentStore, oid: &str) -> Payment {
    let mut payment = Payment::new(oid, Decimal::new(1050, 2), "949");
    payment.mark_pending();
    store.save(&payment).await.unwrap();
    payment
}

/// Scripted gateway API that records the calls it receives.
#[derive(Clone, Default)]
pub struct FakeGateway {
    pub status: Option<FieldMap>,
    pub fail_with: Option<String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeGateway {
    pub fn with_status(status: FieldMap) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match &self.fail_with {
            Some(message) => Err(PaymentError::Gateway(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn query_status(&self, oid: &str) -> Result<Option<FieldMap>> {
        self.record(format!("query {oid}"))?;
        Ok(self.status.clone())
    }

    async fn post_authorization(&self, oid: &str, amount: Option<Decimal>) -> Result<FieldMap> {
        let amount = amount.map(|a| a.to_string()).unwrap_or_default();
        self.record(format!("postauth {oid} {amount}"))?;
        Ok(fields(&[("Response", "Approved"), ("OrderId", oid)]))
    }

    async fn void(&self, oid: &str) -> Result<FieldMap> {
        self.record(format!("void {oid}"))?;
        Ok(fields(&[("Response", "Approved"), ("OrderId", oid)]))
    }
}

/// Store whose writes always fail.
pub struct BrokenStore;

#[async_trait]
impl PaymentStore for BrokenStore {
    async fn load(&self, _oid: &str) -> Result<Option<Payment>> {
        Ok(None)
    }

    async fn save(&self, _payment: &Payment) -> Result<()> {
        Err(PaymentError::Storage("disk full".to_string()))
    }

    async fn save_processed(&self, _payment: &Payment) -> Result<bool> {
        Err(PaymentError::Storage("disk full".to_string()))
    }
}
