use sea_orm::entity::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "product_image")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub product_id: i32,
    pub file_name: String,
    #[sea_orm(unique)]
    pub path_name: String,
    pub extension: FileExtension,
    #[sea_orm(unique)]
    pub thumbnail_path_name: String,
}

impl Model {
    pub fn url(&self) -> String {
        format!("/api/image/{}", self.id)
    }

    pub fn thumbnail_url(&self) -> String {
        format!("/api/image/{}/thumbnail", self.id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "String(StringLen::N(8))",
    enum_name = "image_extension"
)]
#[serde(rename_all = "lowercase")]
pub enum FileExtension {
    #[sea_orm(string_value = "jpg")]
    Jpg,
    #[sea_orm(string_value = "png")]
    Png,
    #[sea_orm(string_value = "webp")]
    Webp,
}

impl FileExtension {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" | "image/jpg" => Some(Self::Jpg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl FromStr for FileExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            _ => Err(format!("Unsupported extension: {s}")),
        }
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ext = match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        };
        f.write_str(ext)
    }
}
