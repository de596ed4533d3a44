use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One row per product in a basket; `(basket_id, product_id)` carries a
/// unique index created in `setup_schema`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "basket_line")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub basket_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::basket::Entity",
        from = "Column::BasketId",
        to = "super::basket::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Basket,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Product,
}

impl Related<super::basket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Basket.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
