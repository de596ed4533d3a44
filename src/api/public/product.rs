use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::catalog::{product_ids_for_tag, product_response, product_responses, ProductResponse};
use crate::entities::{
    product::{self, Entity as ProductEntity},
    product_tag,
};
use crate::middleware::logging::{db_error, fail, not_found, to_response, ApiError};

const DEFAULT_PAGE_SIZE: u64 = 4;
const MAX_PAGE_SIZE: u64 = 50;

pub fn product_router() -> Router {
    Router::new()
        .route("/products", get(get_products))
        .route("/product/:slug", get(get_product))
        .route("/tags", get(get_tags))
}

async fn get_products(
    Query(params): Query<GetProductsQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut half_result = ProductEntity::find().filter(product::Column::Active.eq(true));

    match params.tag.as_deref() {
        None | Some("all") => {}
        Some(slug) => {
            let tag = match product_tag::Entity::find()
                .filter(product_tag::Column::Slug.eq(slug))
                .filter(product_tag::Column::Active.eq(true))
                .one(&*db)
                .await
            {
                Ok(Some(tag)) => tag,
                Ok(None) => {
                    let tmp = format!("No tag with {slug} slug was found.");
                    return fail(StatusCode::NOT_FOUND, tmp.clone(), ApiError::General(tmp));
                }
                Err(err) => return db_error(err),
            };
            let ids = match product_ids_for_tag(&*db, tag.id).await {
                Ok(ids) => ids,
                Err(err) => return db_error(err),
            };
            half_result = half_result.filter(product::Column::Id.is_in(ids));
        }
    }

    if let Some(in_stock) = params.in_stock {
        half_result = half_result.filter(product::Column::InStock.eq(in_stock));
    }

    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        half_result = half_result.filter(product::Column::Name.contains(search));
    }

    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let paginator = half_result
        .order_by_asc(product::Column::Name)
        .paginate(&*db, page_size);
    let total = match paginator.num_items().await {
        Ok(total) => total,
        Err(err) => return db_error(err),
    };
    let products = match paginator.fetch_page(page - 1).await {
        Ok(products) => products,
        Err(err) => return db_error(err),
    };

    let items = match product_responses(&*db, products, true).await {
        Ok(items) => items.into_iter().map(|(_, response)| response).collect(),
        Err(err) => return db_error(err),
    };

    to_response(
        Json(ProductPage {
            items,
            page,
            page_size,
            total,
        }),
        Ok(()),
    )
}

async fn get_product(
    Path(slug): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let result = ProductEntity::find()
        .filter(product::Column::Slug.eq(slug.as_str()))
        .filter(product::Column::Active.eq(true))
        .one(&*db)
        .await;

    match result {
        Ok(Some(prod)) => match product_response(&*db, prod, true).await {
            Ok(response) => to_response(Json(response), Ok(())),
            Err(err) => db_error(err),
        },
        Ok(None) => not_found("product", slug),
        Err(err) => db_error(err),
    }
}

async fn get_tags(Extension(db): Extension<Arc<DatabaseConnection>>) -> Response {
    match product_tag::Entity::find()
        .filter(product_tag::Column::Active.eq(true))
        .order_by_asc(product_tag::Column::Name)
        .all(&*db)
        .await
    {
        Ok(tags) => {
            let response: Vec<TagResponse> = tags.into_iter().map(TagResponse::new).collect();
            to_response(Json(response), Ok(()))
        }
        Err(err) => db_error(err),
    }
}

#[derive(Deserialize)]
struct GetProductsQuery {
    tag: Option<String>,
    in_stock: Option<bool>,
    search: Option<String>,
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Serialize)]
struct ProductPage {
    items: Vec<ProductResponse>,
    page: u64,
    page_size: u64,
    total: u64,
}

#[derive(Serialize)]
struct TagResponse {
    id: i32,
    name: String,
    slug: String,
    description: String,
}

impl TagResponse {
    fn new(value: product_tag::Model) -> TagResponse {
        TagResponse {
            id: value.id,
            name: value.name,
            slug: value.slug,
            description: value.description,
        }
    }
}
