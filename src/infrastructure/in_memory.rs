use crate::domain::payment::Payment;
use crate::domain::ports::PaymentStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payments.
///
/// Uses `Arc<RwLock<HashMap<String, Payment>>>` so clones share the same
/// records. `save` and `save_processed` hold the write lock across their
/// check and their write, which makes them atomic for every clone of the store.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<String, Payment>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored payment.
    pub async fn all(&self) -> Vec<Payment> {
        let payments = self.payments.read().await;
        payments.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn load(&self, oid: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(oid).cloned())
    }

    async fn save(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if !payment.is_processed()
            && payments
                .get(payment.oid())
                .is_some_and(|stored| stored.is_processed())
        {
            return Err(PaymentError::AlreadyProcessed {
                oid: payment.oid().to_string(),
            });
        }
        payments.insert(payment.oid().to_string(), payment.clone());
        Ok(())
    }

    async fn save_processed(&self, payment: &Payment) -> Result<bool> {
        let mut payments = self.payments.write().await;
        if payments
            .get(payment.oid())
            .is_some_and(|stored| stored.is_processed())
        {
            return Ok(false);
        }
        payments.insert(payment.oid().to_string(), payment.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentState;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_in_memory_payment_store() {
        let store = InMemoryPaymentStore::new();
        let payment = Payment::new("1001", dec!(10.5), "949");

        store.save(&payment).await.unwrap();
        let retrieved = store.load("1001").await.unwrap().unwrap();
        assert_eq!(retrieved, payment);

        assert!(store.load("1002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_processed_only_once() {
        let store = InMemoryPaymentStore::new();
        let mut payment = Payment::new("1001", dec!(10.5), "949");
        store.save(&payment).await.unwrap();

        payment.set_processed(true).unwrap();
        assert!(store.save_processed(&payment).await.unwrap());

        let mut duplicate = Payment::new("1001", dec!(10.5), "949");
        duplicate.set_processed(false).unwrap();
        assert!(!store.save_processed(&duplicate).await.unwrap());

        let stored = store.load("1001").await.unwrap().unwrap();
        assert_eq!(stored.state(), PaymentState::ProcessedSuccess);
    }

    #[tokio::test]
    async fn test_save_never_downgrades_processed_payment() {
        let store = InMemoryPaymentStore::new();
        let stale = Payment::new("1001", dec!(10.5), "949");
        let mut processed = stale.clone();
        processed.set_processed(true).unwrap();
        assert!(store.save_processed(&processed).await.unwrap());

        let err = store.save(&stale).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyProcessed { oid } if oid == "1001"));
        assert!(store.load("1001").await.unwrap().unwrap().is_processed());

        // Refreshing a processed record is still allowed.
        store.save(&processed).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_processed_inserts_unknown_payment() {
        let store = InMemoryPaymentStore::new();
        let mut payment = Payment::new("42", dec!(1), "949");
        payment.set_processed(false).unwrap();

        assert!(store.save_processed(&payment).await.unwrap());
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = InMemoryPaymentStore::new();
        let clone = store.clone();
        clone
            .save(&Payment::new("1", dec!(1), "949"))
            .await
            .unwrap();
        assert!(store.load("1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_does_not_persist() {
        let store = InMemoryPaymentStore::new();
        let mut fields = crate::error::FieldMap::new();
        fields.insert("oid".to_string(), "7".to_string());

        let payment = store.create(&fields).await.unwrap();
        assert_eq!(payment.oid(), "7");
        assert!(store.load("7").await.unwrap().is_none());
    }
}
