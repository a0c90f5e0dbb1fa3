use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "firefoxpageloadstls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub datestamp: Date,
    pub count_tls: i64,
    pub count_pageloads: i64,
    pub time_added: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
