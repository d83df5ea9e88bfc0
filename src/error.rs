use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Raw string fields as received from (or sent to) the gateway.
pub type FieldMap = BTreeMap<String, String>;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Why a gateway callback was rejected before its signature was checked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseRejection {
    #[error("Response field is not set")]
    MissingResponse,
    #[error("client id is empty")]
    MissingClientId,
    #[error("client id {0:?} does not match the configured merchant")]
    ClientIdMismatch(String),
    #[error("payment oid is empty")]
    MissingOid,
    #[error("invalid payment oid")]
    InvalidOid,
    #[error("HASH is empty")]
    MissingHash,
    #[error("HASHPARAMS is empty")]
    MissingHashParams,
    #[error("unsupported hash algorithm {0:?}")]
    UnsupportedHashAlgorithm(String),
}

/// Coarse grouping of [`PaymentError`] used for alerting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Authentication,
    AlreadyProcessed,
    Storage,
    Gateway,
    Unexpected,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid gateway response: {reason}")]
    InvalidResponse {
        reason: ResponseRejection,
        response: FieldMap,
    },
    #[error("Invalid value {value:?} for field {field}")]
    InvalidField { field: String, value: String },
    #[error("Payment {0} not found")]
    PaymentNotFound(String),
    #[error("HASH does not match calculated hash, possible attack (calculated {calculated:?}, received {received:?})")]
    HashMismatch {
        calculated: String,
        received: String,
        response: FieldMap,
    },
    #[error("Payment {oid} is already processed")]
    AlreadyProcessed { oid: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Gateway request timed out after {0:?}")]
    GatewayTimeout(Duration),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub fn invalid_response(reason: ResponseRejection, response: &FieldMap) -> Self {
        Self::InvalidResponse {
            reason,
            response: response.clone(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::InvalidResponse { .. } | Self::InvalidField { .. } | Self::PaymentNotFound(_) => {
                ErrorCategory::Validation
            }
            Self::HashMismatch { .. } => ErrorCategory::Authentication,
            Self::AlreadyProcessed { .. } => ErrorCategory::AlreadyProcessed,
            Self::Storage(_) => ErrorCategory::Storage,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => ErrorCategory::Storage,
            Self::Gateway(_) | Self::GatewayTimeout(_) => ErrorCategory::Gateway,
            Self::IoError(_) | Self::JsonError(_) | Self::InternalError(_) => {
                ErrorCategory::Unexpected
            }
        }
    }

    /// Storage and gateway failures may succeed on a later attempt; everything
    /// else is final for the current request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Storage | ErrorCategory::Gateway
        )
    }

    /// The raw gateway fields that triggered the error, when there are any.
    pub fn response(&self) -> Option<&FieldMap> {
        match self {
            Self::InvalidResponse { response, .. } | Self::HashMismatch { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }
}
