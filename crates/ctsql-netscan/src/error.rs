use ctsql_storage::StorageError;
use std::net::IpAddr;

/// Errors raised by the enrichment pool and its lookup adapters.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A stop signal arrived before every pending name was handed to a worker.
    #[error("Netscan: signal caught: {signal}")]
    Cancelled { signal: String },

    #[error("Netscan: could not look up host {name}: {reason}")]
    Lookup { name: String, reason: String },

    #[error("Netscan: could not look up geo record for {address}: {reason}")]
    Geo { address: IpAddr, reason: String },

    #[error("Netscan: {what} timed out")]
    Timeout { what: String },

    #[error("Netscan: failed to create DNS resolver: {0}")]
    Resolver(String),

    #[error("Netscan: unable to open geo database {path}: {reason}")]
    GeoDatabase { path: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Netscan: worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
