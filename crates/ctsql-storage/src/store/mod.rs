use migration::{Migrator, MigratorTrait};
use sea_orm::sqlx::mysql::MySqlPoolOptions;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, SqlErr,
    SqlxMySqlConnector,
};
use std::future::Future;
use std::sync::Arc;

use crate::blob::CertificateBlobStore;
use crate::cache::IssuerCache;
use crate::dsn::{recombine_url_for_db, redact, STRICT_SESSION_SQL};
use crate::entities::{
    certificate, fqdn, issuer, netscan_queue, registered_domain, resolved_name,
    unexpired_certificate,
};
use crate::error::Result;

pub mod cert;
pub mod checkpoint;
pub mod ingest;
mod names;
pub mod netscan;
pub mod pageload;

mod issuers;

pub use checkpoint::LogCheckpoint;
pub use ingest::{FilterPolicy, IngestOptions, IngestOutcome};
pub use netscan::PendingName;

/// Access layer for the certificate database.
///
/// One `EntriesStore` is shared by every producer in a process. It owns the
/// connection pool, the issuer cache and the optional raw-certificate store.
pub struct EntriesStore {
    pub(crate) db: DatabaseConnection,
    pub(crate) options: IngestOptions,
    pub(crate) issuers: IssuerCache,
    pub(crate) blobs: Option<Arc<dyn CertificateBlobStore>>,
}

impl EntriesStore {
    /// Opens a MySQL pool from a `mysql+tcp://` descriptor and runs the schema
    /// migration.
    ///
    /// Every pooled session is switched to strict mode before first use.
    pub async fn connect(descriptor: &str, options: IngestOptions) -> Result<Self> {
        let url = recombine_url_for_db(descriptor)?;
        let pool = MySqlPoolOptions::new()
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sea_orm::sqlx::query(STRICT_SESSION_SQL)
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await?;

        let db = SqlxMySqlConnector::from_sqlx_mysql_pool(pool);
        db.ping().await?;
        tracing::info!(db = %redact(descriptor), "Connected to certificate database");

        Self::new(db, options).await
    }

    /// Wraps an existing connection, creating any missing tables.
    pub async fn new(db: DatabaseConnection, options: IngestOptions) -> Result<Self> {
        Migrator::up(&db, None).await?;
        tracing::debug!(backend = ?db.get_database_backend(), "Certificate schema is up to date");

        Ok(Self {
            db,
            options,
            issuers: IssuerCache::new(),
            blobs: None,
        })
    }

    /// Stores the raw DER of every certificate the pipeline writes.
    pub fn with_blob_store(mut self, blobs: Arc<dyn CertificateBlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn issuer_cache(&self) -> &IssuerCache {
        &self.issuers
    }

    pub async fn count_issuers(&self) -> Result<u64> {
        Ok(issuer::Entity::find().count(&self.db).await?)
    }

    pub async fn count_certificates(&self) -> Result<u64> {
        Ok(certificate::Entity::find().count(&self.db).await?)
    }

    pub async fn count_unexpired_certificates(&self) -> Result<u64> {
        Ok(unexpired_certificate::Entity::find().count(&self.db).await?)
    }

    pub async fn count_fqdns(&self) -> Result<u64> {
        Ok(fqdn::Entity::find().count(&self.db).await?)
    }

    pub async fn count_registered_domains(&self) -> Result<u64> {
        Ok(registered_domain::Entity::find().count(&self.db).await?)
    }

    pub async fn count_queue(&self) -> Result<u64> {
        Ok(netscan_queue::Entity::find().count(&self.db).await?)
    }

    pub async fn count_resolved_names(&self) -> Result<u64> {
        Ok(resolved_name::Entity::find().count(&self.db).await?)
    }
}

/// True when the engine rejected a statement because of a unique or primary
/// key conflict.
pub(crate) fn is_duplicate(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Optimistic insert-or-fetch on a natural key.
///
/// Runs `insert`; on a unique-constraint violation runs `fetch` to read the
/// id of the row that won. `Ok(None)` means the conflicting row was not
/// visible to `fetch`. Any other error propagates unchanged.
pub(crate) async fn insert_or_fetch<Ins, F, Fut>(
    insert: Ins,
    fetch: F,
) -> std::result::Result<Option<i64>, DbErr>
where
    Ins: Future<Output = std::result::Result<i64, DbErr>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Option<i64>, DbErr>>,
{
    match insert.await {
        Ok(id) => Ok(Some(id)),
        Err(err) if is_duplicate(&err) => fetch().await,
        Err(err) => Err(err),
    }
}

/// Runs a statement whose only expected failure is a duplicate row; duplicates
/// count as success.
pub(crate) async fn ignore_duplicate<Fut>(statement: Fut) -> std::result::Result<(), DbErr>
where
    Fut: Future<Output = std::result::Result<(), DbErr>>,
{
    match statement.await {
        Err(err) if !is_duplicate(&err) => Err(err),
        _ => Ok(()),
    }
}
