use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cert_registereddomain")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cert_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub regdom_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
