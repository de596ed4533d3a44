use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Country codes an address may carry, with their display names.
pub const SUPPORTED_COUNTRIES: [(&str, &str); 2] = [
    ("uk", "United Kingdom"),
    ("us", "United States of America"),
];

pub fn is_supported_country(code: &str) -> bool {
    SUPPORTED_COUNTRIES.iter().any(|(known, _)| *known == code)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "address")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub user_id: i32,
    pub name: String,
    pub address1: String,
    pub address2: Option<String>,
    pub zip_code: String,
    pub city: String,
    pub country: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
