use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "resolvedplace")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name_id: i64,
    pub time: DateTime,
    pub city: String,
    pub country: String,
    pub continent: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
