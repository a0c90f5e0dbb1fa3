use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "resolvedname")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name_id: i64,
    pub time: DateTime,
    /// Empty when the lookup failed or the name is a wildcard.
    pub ipaddr: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
