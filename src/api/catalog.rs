//! Product and tag views shared by the storefront and the admin sites.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;

use crate::entities::{product, product_image, product_tag, product_tag_link};

#[derive(Debug, Clone, Serialize)]
pub struct TagRef {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

impl From<product_tag::Model> for TagRef {
    fn from(tag: product_tag::Model) -> Self {
        TagRef {
            id: tag.id,
            name: tag.name,
            slug: tag.slug,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRef {
    pub id: i32,
    pub url: String,
    pub thumbnail_url: String,
}

impl From<&product_image::Model> for ImageRef {
    fn from(image: &product_image::Model) -> Self {
        ImageRef {
            id: image.id,
            url: image.url(),
            thumbnail_url: image.thumbnail_url(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub in_stock: bool,
    pub tags: Vec<TagRef>,
    pub images: Vec<ImageRef>,
}

/// Admin flavour: carries the flags and the caller's read-only fields.
#[derive(Debug, Serialize)]
pub struct AdminProductResponse {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub active: bool,
    pub date_updated: chrono::DateTime<chrono::Utc>,
    pub read_only_fields: Vec<&'static str>,
}

/// Loads tags (active only when `active_tags_only`) and images for the given
/// products and builds their responses in the same order.
pub async fn product_responses<C: ConnectionTrait>(
    conn: &C,
    products: Vec<product::Model>,
    active_tags_only: bool,
) -> Result<Vec<(product::Model, ProductResponse)>, DbErr> {
    let ids: Vec<i32> = products.iter().map(|p| p.id).collect();

    let mut tag_query = product_tag_link::Entity::find()
        .filter(product_tag_link::Column::ProductId.is_in(ids.clone()))
        .find_also_related(product_tag::Entity)
        .order_by_asc(product_tag_link::Column::TagId);
    if active_tags_only {
        tag_query = tag_query.filter(product_tag::Column::Active.eq(true));
    }
    let mut tags: HashMap<i32, Vec<TagRef>> = HashMap::new();
    for (link, tag) in tag_query.all(conn).await? {
        if let Some(tag) = tag {
            tags.entry(link.product_id).or_default().push(tag.into());
        }
    }

    let mut images: HashMap<i32, Vec<ImageRef>> = HashMap::new();
    for image in product_image::Entity::find()
        .filter(product_image::Column::ProductId.is_in(ids))
        .order_by_asc(product_image::Column::Id)
        .all(conn)
        .await?
    {
        images
            .entry(image.product_id)
            .or_default()
            .push(ImageRef::from(&image));
    }

    Ok(products
        .into_iter()
        .map(|model| {
            let response = ProductResponse {
                id: model.id,
                name: model.name.clone(),
                slug: model.slug.clone(),
                description: model.description.clone(),
                price: model.price,
                in_stock: model.in_stock,
                tags: tags.remove(&model.id).unwrap_or_default(),
                images: images.remove(&model.id).unwrap_or_default(),
            };
            (model, response)
        })
        .collect())
}

pub async fn product_response<C: ConnectionTrait>(
    conn: &C,
    product: product::Model,
    active_tags_only: bool,
) -> Result<ProductResponse, DbErr> {
    let mut responses = product_responses(conn, vec![product], active_tags_only).await?;
    responses
        .pop()
        .map(|(_, response)| response)
        .ok_or_else(|| DbErr::Custom("Product vanished while building response".into()))
}

/// Ids of products carrying the tag.
pub async fn product_ids_for_tag<C: ConnectionTrait>(conn: &C, tag_id: i32) -> Result<Vec<i32>, DbErr> {
    Ok(product_tag_link::Entity::find()
        .filter(product_tag_link::Column::TagId.eq(tag_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.product_id)
        .collect())
}
