use super::payment::Payment;
use crate::error::{FieldMap, PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// System of record for payments, keyed by order id.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn load(&self, oid: &str) -> Result<Option<Payment>>;

    /// Persists a payment.
    ///
    /// Fails with [`PaymentError::AlreadyProcessed`] instead of replacing a
    /// processed record with an unprocessed copy. The check and the write
    /// must be atomic.
    async fn save(&self, payment: &Payment) -> Result<()>;

    /// Persists a payment that has just entered a terminal state.
    ///
    /// Must be atomic with respect to other writers of the same oid: the
    /// payment is written only if the stored copy is missing or not yet
    /// processed. Returns `false` when another writer got there first.
    async fn save_processed(&self, payment: &Payment) -> Result<bool>;

    /// Builds a new, unsaved payment from a property set.
    async fn create(&self, fields: &FieldMap) -> Result<Payment> {
        Payment::from_fields(fields)
    }
}

/// The gateway's administrative API.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Authoritative status of an order, or `None` if the gateway has no
    /// record of it.
    async fn query_status(&self, oid: &str) -> Result<Option<FieldMap>>;

    /// Captures a pre-authorized order. `None` captures the full amount.
    async fn post_authorization(&self, oid: &str, amount: Option<Decimal>) -> Result<FieldMap>;

    async fn void(&self, oid: &str) -> Result<FieldMap>;
}

/// Receives the outcome of payment processing.
///
/// Called only after the state change has been persisted.
pub trait PaymentObserver: Send + Sync {
    fn on_success(&self, _payment: &Payment) {}

    fn on_failure(&self, _payment: &Payment) {}

    fn on_error(&self, _payment: &Payment, _error: &PaymentError) {}
}

pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type GatewayClientBox = Box<dyn GatewayClient>;
pub type PaymentObserverBox = Box<dyn PaymentObserver>;
