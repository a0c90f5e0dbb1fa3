use ctsql_common::types::CertificateError;
use sea_orm::DbErr;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use ctsql_storage::error::StorageError;
///
/// let err = StorageError::MissingId {
///     entity: "fqdn",
///     key: "www.example.com".to_string(),
/// };
/// assert!(err.to_string().contains("fqdn"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or statement failed in the ORM or the driver.
    #[error("Storage: database error: {0}")]
    Db(#[from] DbErr),

    /// The MySQL pool could not be opened.
    #[error("Storage: connection error: {0}")]
    Sqlx(#[from] sea_orm::sqlx::Error),

    /// The connection descriptor is not a supported `mysql+tcp://` URL.
    #[error("Storage: unsupported database descriptor '{descriptor}': {reason}")]
    InvalidDatabaseUrl { descriptor: String, reason: String },

    /// An insert collided with an existing row but the row could not be read back.
    #[error("Storage: {entity} '{key}' exists but its id could not be read")]
    MissingId { entity: &'static str, key: String },

    /// The issuer upsert lost every race within its retry bound.
    #[error("Storage: could not resolve issuer {authority_key_id} after {attempts} attempts")]
    IssuerContention {
        authority_key_id: String,
        attempts: u32,
    },

    /// The raw-certificate store rejected a write.
    #[error("Storage: failed to store raw certificate {cert_id}: {source}")]
    BlobStore {
        cert_id: i64,
        source: std::io::Error,
    },

    /// Entry bytes could not be parsed as a certificate.
    #[error("Storage: {0}")]
    Certificate(#[from] CertificateError),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
