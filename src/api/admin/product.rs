use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::read_only_response;
use super::site::{blocked_fields, AdminSite};
use crate::api::catalog::{product_responses, AdminProductResponse};
use crate::entities::{
    product::{self, is_valid_slug, slugify, Entity as ProductEntity},
    product_tag, product_tag_link,
};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, fail, internal, not_found, to_response, ApiError, FieldErrors},
};

pub fn admin_product_router() -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/actions", post(bulk_action))
        .route("/products/:id", get(get_product).patch(patch_product))
}

async fn list_products(
    Query(params): Query<ProductListQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let mut half_result = ProductEntity::find();
    if let Some(active) = params.active {
        half_result = half_result.filter(product::Column::Active.eq(active));
    }
    if let Some(in_stock) = params.in_stock {
        half_result = half_result.filter(product::Column::InStock.eq(in_stock));
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        half_result = half_result.filter(product::Column::Name.contains(search));
    }

    let products = match half_result
        .order_by_asc(product::Column::Name)
        .all(&*db)
        .await
    {
        Ok(products) => products,
        Err(err) => return db_error(err),
    };

    let read_only = site.read_only_product_fields(user.is_superuser);
    match admin_responses(&*db, products, &read_only).await {
        Ok(response) => to_response(Json(response), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn get_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let prod = match ProductEntity::find_by_id(id).one(&*db).await {
        Ok(Some(prod)) => prod,
        Ok(None) => return not_found("product", id),
        Err(err) => return db_error(err),
    };

    let read_only = site.read_only_product_fields(user.is_superuser);
    match admin_responses(&*db, vec![prod], &read_only).await {
        Ok(mut response) => match response.pop() {
            Some(item) => to_response(Json(item), Ok(())),
            None => not_found("product", id),
        },
        Err(err) => db_error(err),
    }
}

async fn create_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateProduct>,
) -> Response {
    let read_only = site.read_only_product_fields(user.is_superuser);
    if !read_only.is_empty() {
        return read_only_response(&read_only);
    }

    let slug = payload
        .slug
        .clone()
        .unwrap_or_else(|| slugify(&payload.name));
    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    check_slug(&mut errors, &slug);
    check_price(&mut errors, payload.price);
    if !errors.is_empty() {
        return errors.into_response();
    }

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    let new_product = product::ActiveModel {
        name: Set(payload.name.trim().to_owned()),
        slug: Set(slug.clone()),
        description: Set(payload.description.unwrap_or_default()),
        price: Set(payload.price),
        in_stock: Set(payload.in_stock.unwrap_or(true)),
        active: Set(payload.active.unwrap_or(true)),
        date_updated: Set(Utc::now()),
        ..Default::default()
    };

    let model = match ProductEntity::insert(new_product)
        .exec_with_returning(&txn)
        .await
    {
        Ok(model) => model,
        Err(err) => {
            let _ = txn.rollback().await;
            return slug_conflict_or(err, &slug);
        }
    };

    if let Some(tags) = payload.tags {
        match replace_tags(&txn, model.id, &tags).await {
            Ok(Ok(())) => {}
            Ok(Err(errors)) => {
                let _ = txn.rollback().await;
                return errors.into_response();
            }
            Err(err) => {
                let _ = txn.rollback().await;
                return db_error(err);
            }
        }
    }

    let response = match admin_responses(&txn, vec![model], &read_only).await {
        Ok(mut response) => response.pop(),
        Err(err) => return db_error(err),
    };
    if let Err(err) = txn.commit().await {
        return db_error(err);
    }

    tracing::info!(slug = %slug, user_id = user.id, site = ?site, "Product created");
    match response {
        Some(item) => to_response((StatusCode::CREATED, Json(item)), Ok(())),
        None => internal(ApiError::General("Created product vanished".into())),
    }
}

async fn patch_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<PatchProduct>,
) -> Response {
    let read_only = site.read_only_product_fields(user.is_superuser);
    let blocked = blocked_fields(&payload.requested_fields(), &read_only);
    if !blocked.is_empty() {
        return read_only_response(&blocked);
    }

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    if let Some(slug) = &payload.slug {
        check_slug(&mut errors, slug);
    }
    if let Some(price) = payload.price {
        check_price(&mut errors, price);
    }
    if !errors.is_empty() {
        return errors.into_response();
    }

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    let existing = match ProductEntity::find_by_id(id).one(&txn).await {
        Ok(Some(prod)) => prod,
        Ok(None) => return not_found("product", id),
        Err(err) => return db_error(err),
    };
    let slug = payload.slug.clone().unwrap_or_else(|| existing.slug.clone());

    let mut active: product::ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_owned());
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(in_stock) = payload.in_stock {
        active.in_stock = Set(in_stock);
    }
    if let Some(is_active) = payload.active {
        active.active = Set(is_active);
    }
    active.date_updated = Set(Utc::now());

    let model = match active.update(&txn).await {
        Ok(model) => model,
        Err(err) => {
            let _ = txn.rollback().await;
            return slug_conflict_or(err, &slug);
        }
    };

    if let Some(tags) = payload.tags {
        match replace_tags(&txn, model.id, &tags).await {
            Ok(Ok(())) => {}
            Ok(Err(errors)) => {
                let _ = txn.rollback().await;
                return errors.into_response();
            }
            Err(err) => {
                let _ = txn.rollback().await;
                return db_error(err);
            }
        }
    }

    let response = match admin_responses(&txn, vec![model], &read_only).await {
        Ok(mut response) => response.pop(),
        Err(err) => return db_error(err),
    };
    if let Err(err) = txn.commit().await {
        return db_error(err);
    }

    match response {
        Some(item) => to_response(Json(item), Ok(())),
        None => not_found("product", id),
    }
}

async fn bulk_action(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<BulkAction>,
) -> Response {
    let read_only = site.read_only_product_fields(user.is_superuser);
    if read_only.contains(&"active") {
        return read_only_response(&["active"]);
    }

    let active = match payload.action.as_str() {
        "make_active" => true,
        "make_inactive" => false,
        other => {
            let tmp = format!("Unknown action {other}");
            return fail(StatusCode::BAD_REQUEST, tmp.clone(), ApiError::General(tmp));
        }
    };

    match ProductEntity::update_many()
        .col_expr(product::Column::Active, Expr::value(active))
        .col_expr(product::Column::DateUpdated, Expr::value(Utc::now()))
        .filter(product::Column::Id.is_in(payload.ids))
        .exec(&*db)
        .await
    {
        Ok(result) => {
            tracing::info!(action = %payload.action, rows = result.rows_affected, "Bulk product action");
            to_response(
                Json(json!({ "updated": result.rows_affected })),
                Ok(()),
            )
        }
        Err(err) => db_error(err),
    }
}

async fn admin_responses<C: ConnectionTrait>(
    conn: &C,
    products: Vec<product::Model>,
    read_only: &[&'static str],
) -> Result<Vec<AdminProductResponse>, DbErr> {
    Ok(product_responses(conn, products, false)
        .await?
        .into_iter()
        .map(|(model, product)| AdminProductResponse {
            product,
            active: model.active,
            date_updated: model.date_updated,
            read_only_fields: read_only.to_vec(),
        })
        .collect())
}

/// Points the product at exactly `tag_ids`. Unknown ids are a field error.
async fn replace_tags(
    txn: &DatabaseTransaction,
    product_id: i32,
    tag_ids: &[i32],
) -> Result<Result<(), FieldErrors>, DbErr> {
    let mut wanted = tag_ids.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    let found = product_tag::Entity::find()
        .filter(product_tag::Column::Id.is_in(wanted.clone()))
        .all(txn)
        .await?;
    if found.len() != wanted.len() {
        let mut errors = FieldErrors::new();
        errors.add("tags", "unknown_tag");
        return Ok(Err(errors));
    }

    product_tag_link::Entity::delete_many()
        .filter(product_tag_link::Column::ProductId.eq(product_id))
        .exec(txn)
        .await?;

    if !wanted.is_empty() {
        let links = wanted.into_iter().map(|tag_id| product_tag_link::ActiveModel {
            product_id: Set(product_id),
            tag_id: Set(tag_id),
        });
        product_tag_link::Entity::insert_many(links).exec(txn).await?;
    }
    Ok(Ok(()))
}

fn check_slug(errors: &mut FieldErrors, slug: &str) {
    if !is_valid_slug(slug) {
        errors.add("slug", "invalid_slug");
    }
}

fn check_price(errors: &mut FieldErrors, price: Decimal) {
    if price.is_sign_negative() || price.normalize().scale() > 2 {
        errors.add("price", "invalid_price");
    }
}

fn slug_conflict_or(err: DbErr, slug: &str) -> Response {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => fail(
            StatusCode::CONFLICT,
            format!("Product with slug {slug} already exists"),
            ApiError::General(format!("Duplicate product slug {slug}")),
        ),
        _ => db_error(err),
    }
}

#[derive(Deserialize)]
struct ProductListQuery {
    active: Option<bool>,
    in_stock: Option<bool>,
    search: Option<String>,
}

#[derive(Deserialize, Validate, Debug)]
struct CreateProduct {
    #[validate(length(min = 1, max = 32))]
    name: String,
    #[validate(length(min = 1, max = 48))]
    slug: Option<String>,
    description: Option<String>,
    price: Decimal,
    in_stock: Option<bool>,
    active: Option<bool>,
    tags: Option<Vec<i32>>,
}

#[derive(Deserialize, Validate, Debug, Default)]
struct PatchProduct {
    #[validate(length(min = 1, max = 32))]
    name: Option<String>,
    #[validate(length(min = 1, max = 48))]
    slug: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    in_stock: Option<bool>,
    active: Option<bool>,
    tags: Option<Vec<i32>>,
}

impl PatchProduct {
    fn requested_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.slug.is_some() {
            fields.push("slug");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.price.is_some() {
            fields.push("price");
        }
        if self.in_stock.is_some() {
            fields.push("in_stock");
        }
        if self.active.is_some() {
            fields.push("active");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        fields
    }
}

#[derive(Deserialize, Debug)]
struct BulkAction {
    action: String,
    ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sent_fields_are_requested() {
        let patch = PatchProduct {
            price: Some(Decimal::new(999, 2)),
            in_stock: Some(false),
            ..Default::default()
        };
        assert_eq!(patch.requested_fields(), vec!["price", "in_stock"]);
    }

    #[test]
    fn stock_toggle_is_allowed_for_office_staff() {
        let patch = PatchProduct {
            in_stock: Some(true),
            ..Default::default()
        };
        let read_only = AdminSite::CentralOffice.read_only_product_fields(false);
        assert!(blocked_fields(&patch.requested_fields(), &read_only).is_empty());
    }

    #[test]
    fn prices_need_two_places_and_a_sign() {
        let mut errors = FieldErrors::new();
        check_price(&mut errors, Decimal::new(1999, 2));
        assert!(errors.is_empty());
        check_price(&mut errors, Decimal::new(-100, 2));
        check_price(&mut errors, Decimal::new(1, 3));
        assert_eq!(errors.fields(), vec!["price"]);
    }
}
