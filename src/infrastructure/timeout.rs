use crate::domain::ports::GatewayClient;
use crate::error::{FieldMap, PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounds every call to the wrapped gateway client.
///
/// A call that does not finish in time fails with
/// [`PaymentError::GatewayTimeout`].
pub struct TimeoutGateway<G> {
    inner: G,
    timeout: Duration,
}

impl<G: GatewayClient> TimeoutGateway<G> {
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "gateway call timed out");
                Err(PaymentError::GatewayTimeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<G: GatewayClient> GatewayClient for TimeoutGateway<G> {
    async fn query_status(&self, oid: &str) -> Result<Option<FieldMap>> {
        self.bounded(self.inner.query_status(oid)).await
    }

    async fn post_authorization(&self, oid: &str, amount: Option<Decimal>) -> Result<FieldMap> {
        self.bounded(self.inner.post_authorization(oid, amount)).await
    }

    async fn void(&self, oid: &str) -> Result<FieldMap> {
        self.bounded(self.inner.void(oid)).await
    }
}
