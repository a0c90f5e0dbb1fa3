use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ctlog")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub log_id: i64,
    #[sea_orm(unique)]
    pub url: String,
    pub max_entry: i64,
    pub last_entry_time: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
