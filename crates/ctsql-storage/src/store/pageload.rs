use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::firefox_pageload_is_tls::{
    self, Column as PageloadCol, Entity as PageloadEntity,
};
use crate::error::Result;
use crate::store::{is_duplicate, EntriesStore};

impl EntriesStore {
    /// Records the daily TLS pageload aggregate, replacing the counts of an
    /// existing row for the same day.
    pub async fn insert_or_update_pageload_is_tls(
        &self,
        datestamp: NaiveDate,
        count_tls: i64,
        count_pageloads: i64,
    ) -> Result<()> {
        if self
            .update_pageload(datestamp, count_tls, count_pageloads)
            .await?
        {
            return Ok(());
        }

        let row = firefox_pageload_is_tls::ActiveModel {
            datestamp: Set(datestamp),
            count_tls: Set(count_tls),
            count_pageloads: Set(count_pageloads),
            time_added: Set(Utc::now().naive_utc()),
        };
        match PageloadEntity::insert(row)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            // Another writer created the day's row first.
            Err(e) if is_duplicate(&e) => {
                self.update_pageload(datestamp, count_tls, count_pageloads)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_pageload(
        &self,
        datestamp: NaiveDate,
        count_tls: i64,
        count_pageloads: i64,
    ) -> Result<bool> {
        let res = PageloadEntity::update_many()
            .col_expr(PageloadCol::CountTls, Expr::value(count_tls))
            .col_expr(PageloadCol::CountPageloads, Expr::value(count_pageloads))
            .col_expr(PageloadCol::TimeAdded, Expr::value(Utc::now().naive_utc()))
            .filter(PageloadCol::Datestamp.eq(datestamp))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}
