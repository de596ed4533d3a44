use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "product_tag")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text", default_value = "")]
    pub description: String,
    #[sea_orm(default_value = true)]
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        super::product_tag_link::Relation::Product.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::product_tag_link::Relation::Tag.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
