use ctsql_common::types::CertificateInfo;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QuerySelect,
};
use std::future::Future;

use crate::entities::issuer::{self, Column as IssuerCol, Entity as IssuerEntity};
use crate::error::{Result, StorageError};
use crate::store::{insert_or_fetch, EntriesStore};

impl EntriesStore {
    /// Returns the issuer id for a certificate, creating the issuer row on
    /// first sight.
    ///
    /// Runs in autocommit on the pool, never inside a certificate
    /// transaction: a freshly created issuer becomes visible to every other
    /// producer immediately, and a backoff sleep never holds a transaction
    /// open.
    pub(crate) async fn resolve_issuer_id(&self, cert: &CertificateInfo) -> Result<i64> {
        let authority_key_id = cert.authority_key_id_b64();
        if let Some(id) = self.issuers.get(&authority_key_id) {
            return Ok(id);
        }

        let id = self
            .upsert_issuer(&authority_key_id, &cert.issuer_common_name)
            .await?;
        self.issuers.insert(&authority_key_id, id);
        Ok(id)
    }

    async fn upsert_issuer(&self, authority_key_id: &str, common_name: &str) -> Result<i64> {
        let db = &self.db;
        self.upsert_issuer_with(authority_key_id, common_name, move || {
            find_issuer(db, authority_key_id)
        })
        .await
    }

    /// Bounded select, insert, re-select loop. `find` reads the issuer id by
    /// authority key id.
    pub(crate) async fn upsert_issuer_with<F, Fut>(
        &self,
        authority_key_id: &str,
        common_name: &str,
        find: F,
    ) -> Result<i64>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<Option<i64>, DbErr>>,
    {
        let attempts = self.options.retry.attempts.max(1);
        let mut backoff = self.options.retry.backoff();

        for attempt in 1..=attempts {
            if let Some(id) = find().await? {
                return Ok(id);
            }

            let model = issuer::ActiveModel {
                common_name: Set(common_name.to_string()),
                authority_key_id: Set(authority_key_id.to_string()),
                ..Default::default()
            };
            let insert = async {
                Ok::<_, DbErr>(
                    IssuerEntity::insert(model)
                        .exec(&self.db)
                        .await?
                        .last_insert_id,
                )
            };
            if let Some(id) = insert_or_fetch(insert, &find).await? {
                return Ok(id);
            }

            tracing::debug!(
                authority_key_id,
                attempt,
                "Collision on issuer, retrying"
            );
            if attempt < attempts {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }

        Err(StorageError::IssuerContention {
            authority_key_id: authority_key_id.to_string(),
            attempts,
        })
    }
}

async fn find_issuer<C: ConnectionTrait>(
    conn: &C,
    authority_key_id: &str,
) -> std::result::Result<Option<i64>, DbErr> {
    IssuerEntity::find()
        .select_only()
        .column(IssuerCol::IssuerId)
        .filter(IssuerCol::AuthorityKeyId.eq(authority_key_id))
        .into_tuple::<i64>()
        .one(conn)
        .await
}
