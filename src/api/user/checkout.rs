use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::public::basket::{find_open_basket, BasketOwner};
use crate::api::user::order::order_responses;
use crate::entities::{address, basket, basket_line, order, order_line, product};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, fail, internal, not_found, to_response, ApiError},
};

pub fn checkout_router() -> Router {
    Router::new().route("/checkout", post(checkout))
}

/// Why a basket could not become an order.
enum CheckoutError {
    AddressNotFound(i32),
    EmptyBasket,
    Unavailable(Vec<String>),
    AlreadyOrdered,
    Db(sea_orm::DbErr),
}

impl From<sea_orm::DbErr> for CheckoutError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => CheckoutError::AlreadyOrdered,
            _ => CheckoutError::Db(err),
        }
    }
}

async fn checkout(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CheckoutForm>,
) -> Response {
    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    let order = match place_order(&txn, user.id, &payload).await {
        Ok(order) => order,
        Err(err) => {
            let _ = txn.rollback().await;
            return match err {
                CheckoutError::AddressNotFound(id) => not_found("address", id),
                CheckoutError::EmptyBasket => {
                    let tmp = "Basket is empty".to_owned();
                    fail(StatusCode::BAD_REQUEST, tmp.clone(), ApiError::General(tmp))
                }
                CheckoutError::Unavailable(names) => to_response(
                    (
                        StatusCode::CONFLICT,
                        Json(json!({
                            "error": "Some products are not available",
                            "products": names,
                        })),
                    ),
                    Err(ApiError::General(format!(
                        "Checkout blocked by unavailable products: {}",
                        names.join(", ")
                    ))),
                ),
                CheckoutError::AlreadyOrdered => {
                    let tmp = "Basket was already ordered".to_owned();
                    fail(StatusCode::CONFLICT, tmp.clone(), ApiError::General(tmp))
                }
                CheckoutError::Db(err) => db_error(err),
            };
        }
    };

    let response = match order_responses(&txn, vec![order]).await {
        Ok(mut response) => response.pop(),
        Err(err) => return db_error(err),
    };
    if let Err(err) = txn.commit().await {
        return db_error(err);
    }

    match response {
        Some(order) => {
            tracing::info!(
                order_id = order.order.id,
                user_id = user.id,
                total = %order.total,
                "Order placed"
            );
            to_response((StatusCode::CREATED, Json(order)), Ok(()))
        }
        None => internal(ApiError::General("Order vanished after checkout".into())),
    }
}

/// Converts the caller's open basket into an order inside `txn`.
async fn place_order(
    txn: &DatabaseTransaction,
    user_id: i32,
    payload: &CheckoutForm,
) -> Result<order::Model, CheckoutError> {
    let billing = owned_address(txn, user_id, payload.billing_address_id).await?;
    let shipping = owned_address(txn, user_id, payload.shipping_address_id).await?;

    let basket = find_open_basket(txn, BasketOwner::User(user_id))
        .await?
        .ok_or(CheckoutError::EmptyBasket)?;

    let rows = basket_line::Entity::find()
        .filter(basket_line::Column::BasketId.eq(basket.id))
        .find_also_related(product::Entity)
        .order_by_asc(basket_line::Column::Id)
        .all(txn)
        .await?;
    if rows.is_empty() {
        return Err(CheckoutError::EmptyBasket);
    }

    let mut lines = Vec::with_capacity(rows.len());
    let mut unavailable = Vec::new();
    for (line, product) in rows {
        match product {
            Some(product) if product.active && product.in_stock => lines.push((line, product)),
            Some(product) => unavailable.push(product.name),
            None => unavailable.push(format!("#{}", line.product_id)),
        }
    }
    if !unavailable.is_empty() {
        return Err(CheckoutError::Unavailable(unavailable));
    }

    let now = Utc::now();
    let order = order::ActiveModel {
        user_id: Set(user_id),
        basket_id: Set(basket.id),
        status: Set(order::Status::Created),
        billing_name: Set(billing.name),
        billing_address1: Set(billing.address1),
        billing_address2: Set(billing.address2),
        billing_zip_code: Set(billing.zip_code),
        billing_city: Set(billing.city),
        billing_country: Set(billing.country),
        shipping_name: Set(shipping.name),
        shipping_address1: Set(shipping.address1),
        shipping_address2: Set(shipping.address2),
        shipping_zip_code: Set(shipping.zip_code),
        shipping_city: Set(shipping.city),
        shipping_country: Set(shipping.country),
        date_added: Set(now),
        date_updated: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    for (line, product) in lines {
        order_line::ActiveModel {
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(line.quantity),
            unit_price: Set(product.price),
            ..Default::default()
        }
        .insert(txn)
        .await?;
    }

    let mut basket: basket::ActiveModel = basket.into();
    basket.status = Set(basket::Status::Submitted);
    basket.update(txn).await?;

    Ok(order)
}

async fn owned_address(
    txn: &DatabaseTransaction,
    user_id: i32,
    id: i32,
) -> Result<address::Model, CheckoutError> {
    address::Entity::find_by_id(id)
        .filter(address::Column::UserId.eq(user_id))
        .one(txn)
        .await?
        .ok_or(CheckoutError::AddressNotFound(id))
}

#[derive(Deserialize, Debug)]
struct CheckoutForm {
    billing_address_id: i32,
    shipping_address_id: i32,
}
