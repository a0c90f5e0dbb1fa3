//! Enrichment queue and resolution results.

use chrono::Utc;
use ctsql_common::types::GeoPlace;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};

use crate::entities::netscan_queue::{Column as QueueCol, Entity as QueueEntity};
use crate::entities::resolved_name::{self, Column as ResolvedCol, Entity as ResolvedEntity};
use crate::entities::resolved_place::{self, Entity as PlaceEntity};
use crate::error::Result;
use crate::store::EntriesStore;

/// A queued name waiting for DNS and geo enrichment.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct PendingName {
    pub name_id: i64,
    pub name: String,
}

const PENDING_NAMES_SQL: &str = "SELECT q.name_id, f.name \
     FROM netscanqueue AS q \
     INNER JOIN fqdn AS f ON q.name_id = f.name_id \
     ORDER BY q.name_id \
     LIMIT ?";

impl EntriesStore {
    /// Up to `limit` queued names, oldest name ids first.
    pub async fn pending_names(&self, limit: u64) -> Result<Vec<PendingName>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            PENDING_NAMES_SQL,
            [limit.into()],
        );
        Ok(PendingName::find_by_statement(stmt).all(&self.db).await?)
    }

    /// Removes a name from the queue. Returns false when it was not queued.
    pub async fn unqueue_from_netscan(&self, name_id: i64) -> Result<bool> {
        let res = QueueEntity::delete_many()
            .filter(QueueCol::NameId.eq(name_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Appends a resolution record. An empty `address` records a failed or
    /// skipped lookup.
    pub async fn insert_resolved_name(&self, name_id: i64, address: &str) -> Result<()> {
        let row = resolved_name::ActiveModel {
            name_id: Set(name_id),
            time: Set(Utc::now().naive_utc()),
            ipaddr: Set(address.to_string()),
            ..Default::default()
        };
        ResolvedEntity::insert(row)
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn insert_resolved_place(&self, name_id: i64, place: &GeoPlace) -> Result<()> {
        let row = resolved_place::ActiveModel {
            name_id: Set(name_id),
            time: Set(Utc::now().naive_utc()),
            city: Set(place.city.clone()),
            country: Set(place.country.clone()),
            continent: Set(place.continent.clone()),
            ..Default::default()
        };
        PlaceEntity::insert(row).exec_without_returning(&self.db).await?;
        Ok(())
    }

    /// Every address recorded for a name, in insertion order.
    pub async fn resolved_addresses(&self, name_id: i64) -> Result<Vec<String>> {
        Ok(ResolvedEntity::find()
            .select_only()
            .column(ResolvedCol::Ipaddr)
            .filter(ResolvedCol::NameId.eq(name_id))
            .order_by_asc(ResolvedCol::Id)
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }

    pub async fn resolved_places(&self, name_id: i64) -> Result<Vec<GeoPlace>> {
        Ok(PlaceEntity::find()
            .filter(resolved_place::Column::NameId.eq(name_id))
            .order_by_asc(resolved_place::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| GeoPlace {
                city: m.city,
                country: m.country,
                continent: m.continent,
            })
            .collect())
    }
}
