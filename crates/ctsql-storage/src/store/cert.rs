use chrono::Utc;
use ctsql_common::types::CertificateInfo;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter,
    QuerySelect, TransactionTrait,
};

use crate::entities::certificate::{self, Column as CertCol, Entity as CertEntity};
use crate::entities::unexpired_certificate::{self, Entity as UnexpiredEntity};
use crate::error::{Result, StorageError};
use crate::store::{ignore_duplicate, insert_or_fetch, names, EntriesStore};

impl EntriesStore {
    /// Stores one certificate and everything derived from it, returning the
    /// still-open transaction and the certificate id.
    ///
    /// The caller adds its provenance row and commits. Dropping the
    /// transaction, including on every error path here, rolls it back, so a
    /// failed call leaves nothing visible.
    ///
    /// Steps, in order: issuer id (cached, autocommit), certificate row keyed
    /// by `(serial, issuer)`, unexpired shadow row when currently valid, raw
    /// DER to the blob store, then names and registered domains.
    pub async fn insert_certificate(
        &self,
        cert: &CertificateInfo,
    ) -> Result<(DatabaseTransaction, i64)> {
        let issuer_id = self.resolve_issuer_id(cert).await?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let serial = cert.serial_hex();

        let model = certificate::ActiveModel {
            serial: Set(serial.clone()),
            issuer_id: Set(issuer_id),
            subject: Set(cert.subject_common_name.clone()),
            not_before: Set(cert.not_before.naive_utc()),
            not_after: Set(cert.not_after.naive_utc()),
            ..Default::default()
        };
        let insert = async {
            Ok::<_, DbErr>(CertEntity::insert(model).exec(&txn).await?.last_insert_id)
        };
        let fetch = || async {
            CertEntity::find()
                .select_only()
                .column(CertCol::CertId)
                .filter(CertCol::Serial.eq(serial.as_str()))
                .filter(CertCol::IssuerId.eq(issuer_id))
                .into_tuple::<i64>()
                .one(&txn)
                .await
        };
        let cert_id = match insert_or_fetch(insert, fetch).await? {
            Some(id) if id != 0 => id,
            _ => {
                return Err(StorageError::MissingId {
                    entity: "certificate",
                    key: format!("{serial}/{issuer_id}"),
                })
            }
        };

        if cert.is_valid_at(now) {
            let shadow = unexpired_certificate::ActiveModel {
                cert_id: Set(cert_id),
                issuer_id: Set(issuer_id),
                not_before: Set(cert.not_before.date_naive()),
                not_after: Set(cert.not_after.date_naive()),
            };
            ignore_duplicate(async {
                UnexpiredEntity::insert(shadow)
                    .exec_without_returning(&txn)
                    .await
                    .map(|_| ())
            })
            .await?;
        }

        if let Some(blobs) = &self.blobs {
            blobs
                .store(cert_id, &cert.raw)
                .await
                .map_err(|source| StorageError::BlobStore { cert_id, source })?;
        }

        let names = cert.names();
        names::insert_names(&txn, cert_id, &names, now.naive_utc()).await?;
        names::insert_registered_domains(&txn, cert_id, &names).await?;

        Ok((txn, cert_id))
    }
}
