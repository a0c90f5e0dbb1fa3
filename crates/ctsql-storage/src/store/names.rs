//! Name and registered-domain rows attached to a certificate.

use chrono::NaiveDateTime;
use ctsql_common::suffix::{self, RegisteredDomain};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QuerySelect,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::entities::cert_fqdn::{self, Entity as CertFqdnEntity};
use crate::entities::cert_registered_domain::{self, Entity as CertRegdomEntity};
use crate::entities::fqdn::{self, Column as FqdnCol, Entity as FqdnEntity};
use crate::entities::netscan_queue::{self, Entity as QueueEntity};
use crate::entities::registered_domain::{
    self, Column as RegdomCol, Entity as RegdomEntity,
};
use crate::error::{Result, StorageError};
use crate::store::{ignore_duplicate, insert_or_fetch};

/// Upserts every name, links it to the certificate and queues it for
/// enrichment.
pub(crate) async fn insert_names<C: ConnectionTrait>(
    conn: &C,
    cert_id: i64,
    names: &BTreeSet<String>,
    now: NaiveDateTime,
) -> Result<()> {
    for name in names {
        let name_id = upsert_fqdn(conn, name).await?;
        enqueue_for_netscan(conn, name_id, now).await?;

        let link = cert_fqdn::ActiveModel {
            cert_id: Set(cert_id),
            name_id: Set(name_id),
        };
        ignore_duplicate(async {
            CertFqdnEntity::insert(link)
                .exec_without_returning(conn)
                .await
                .map(|_| ())
        })
        .await?;
    }
    Ok(())
}

/// Links the certificate to the registered domain of each name. Names with no
/// registered domain are skipped.
pub(crate) async fn insert_registered_domains<C: ConnectionTrait>(
    conn: &C,
    cert_id: i64,
    names: &BTreeSet<String>,
) -> Result<()> {
    let mut domains: BTreeMap<String, RegisteredDomain> = BTreeMap::new();
    for name in names {
        match suffix::decompose(name) {
            Ok(regdom) => {
                domains.entry(regdom.domain.clone()).or_insert(regdom);
            }
            Err(e) => tracing::debug!(cert_id, name = %name, error = %e, "Skipping registered domain"),
        }
    }

    for regdom in domains.values() {
        let regdom_id = upsert_registered_domain(conn, regdom).await?;
        let link = cert_registered_domain::ActiveModel {
            cert_id: Set(cert_id),
            regdom_id: Set(regdom_id),
        };
        ignore_duplicate(async {
            CertRegdomEntity::insert(link)
                .exec_without_returning(conn)
                .await
                .map(|_| ())
        })
        .await?;
    }
    Ok(())
}

async fn upsert_fqdn<C: ConnectionTrait>(conn: &C, name: &str) -> Result<i64> {
    let model = fqdn::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };
    let insert = async {
        Ok::<_, DbErr>(FqdnEntity::insert(model).exec(conn).await?.last_insert_id)
    };
    let fetch = || async {
        FqdnEntity::find()
            .select_only()
            .column(FqdnCol::NameId)
            .filter(FqdnCol::Name.eq(name))
            .into_tuple::<i64>()
            .one(conn)
            .await
    };

    match insert_or_fetch(insert, fetch).await? {
        Some(id) if id != 0 => Ok(id),
        _ => Err(StorageError::MissingId {
            entity: "fqdn",
            key: name.to_string(),
        }),
    }
}

async fn upsert_registered_domain<C: ConnectionTrait>(
    conn: &C,
    regdom: &RegisteredDomain,
) -> Result<i64> {
    let model = registered_domain::ActiveModel {
        etld: Set(regdom.suffix.clone()),
        label: Set(regdom.label.clone()),
        domain: Set(regdom.domain.clone()),
        ..Default::default()
    };
    let insert = async {
        Ok::<_, DbErr>(RegdomEntity::insert(model).exec(conn).await?.last_insert_id)
    };
    let fetch = || async {
        RegdomEntity::find()
            .select_only()
            .column(RegdomCol::RegdomId)
            .filter(RegdomCol::Domain.eq(regdom.domain.as_str()))
            .into_tuple::<i64>()
            .one(conn)
            .await
    };

    match insert_or_fetch(insert, fetch).await? {
        Some(id) if id != 0 => Ok(id),
        _ => Err(StorageError::MissingId {
            entity: "registereddomain",
            key: regdom.domain.clone(),
        }),
    }
}

/// Marks a name as pending enrichment. A name already in the queue stays
/// queued once.
async fn enqueue_for_netscan<C: ConnectionTrait>(
    conn: &C,
    name_id: i64,
    now: NaiveDateTime,
) -> Result<()> {
    let row = netscan_queue::ActiveModel {
        name_id: Set(name_id),
        time_added: Set(now),
    };
    ignore_duplicate(async {
        QueueEntity::insert(row)
            .exec_without_returning(conn)
            .await
            .map(|_| ())
    })
    .await?;
    Ok(())
}
