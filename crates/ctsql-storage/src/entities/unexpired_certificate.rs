use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "unexpired_certificate")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cert_id: i64,
    pub issuer_id: i64,
    pub not_before: Date,
    pub not_after: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
