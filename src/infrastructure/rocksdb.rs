use crate::domain::payment::Payment;
use crate::domain::ports::PaymentStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing payments keyed by oid.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent payment store using RocksDB.
///
/// Payments are stored as JSON in the `payments` column family. RocksDB
/// locks its directory to one process, so serializing writers on an
/// in-process mutex is enough to make `save_processed` a compare-and-set and
/// to keep `save` from downgrading a processed payment.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBPaymentStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBPaymentStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn get(&self, oid: &str) -> Result<Option<Payment>> {
        let cf = self.cf()?;
        match self.db.get_cf(&cf, oid.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, payment: &Payment) -> Result<()> {
        let cf = self.cf()?;
        let value = serde_json::to_vec(payment)?;
        self.db.put_cf(&cf, payment.oid().as_bytes(), value)?;
        Ok(())
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_PAYMENTS)
            .ok_or_else(|| PaymentError::Storage("Payments column family not found".to_string()))
    }
}

#[async_trait]
impl PaymentStore for RocksDBPaymentStore {
    async fn load(&self, oid: &str) -> Result<Option<Payment>> {
        self.get(oid)
    }

    async fn save(&self, payment: &Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !payment.is_processed()
            && self
                .get(payment.oid())?
                .is_some_and(|stored| stored.is_processed())
        {
            return Err(PaymentError::AlreadyProcessed {
                oid: payment.oid().to_string(),
            });
        }
        self.put(payment)
    }

    async fn save_processed(&self, payment: &Payment) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self.get(payment.oid())?.is_some_and(|stored| stored.is_processed()) {
            return Ok(false);
        }
        self.put(payment)?;
        Ok(true)
    }
}
