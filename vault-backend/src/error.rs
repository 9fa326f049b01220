//! Error taxonomy for the credential vault and webhook trust boundary.

use crate::crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("{provider} is not configured for this tenant")]
    NotConfigured { provider: String },

    #[error("{provider} credential field '{field}' could not be decrypted: {source}")]
    DecryptionFailure {
        provider: String,
        field: String,
        #[source]
        source: CryptoError,
    },

    #[error("{provider} credential field '{field}' is missing")]
    MissingField { provider: String, field: String },

    #[error("webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("stored credentials are corrupt: {0}")]
    CorruptRecord(#[from] serde_json::Error),

    #[error("concurrent upsert lost its row for {entity}")]
    RaceConditionConflict { entity: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("{provider} routing identifier '{routing_key}' is already claimed by another tenant")]
    RoutingKeyConflict { provider: String, routing_key: String },
}

pub type VaultResult<T> = Result<T, VaultError>;
