//! Relational storage for CT log and certificate-feed ingestion.
//!
//! [`store::EntriesStore`] decomposes each certificate into issuer,
//! certificate, name and registered-domain rows inside one transaction.
//! Concurrent producers may insert the same certificate at the same time;
//! unique indexes plus insert-or-fetch keep every natural key to one row.
//! The store also keeps per-log checkpoints and the netscan queue drained by
//! the enrichment pool.

pub mod blob;
pub mod cache;
pub mod dsn;
pub mod entities;
pub mod error;
pub mod store;


pub use blob::{CertificateBlobStore, FolderBlobStore};
pub use error::{Result, StorageError};
pub use store::{EntriesStore, FilterPolicy, IngestOptions, IngestOutcome, LogCheckpoint, PendingName};
