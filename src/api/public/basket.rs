use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{basket, basket_line, product};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, fail, internal, message, not_found, to_response, ApiError},
};

pub const BASKET_TOKEN_HEADER: &str = "x-basket-token";

/// Upper bound on a single line's quantity.
pub const MAX_LINE_QUANTITY: i32 = 999;

pub fn basket_router() -> Router {
    Router::new()
        .route("/basket", get(get_basket).post(add_to_basket))
        .route("/basket/:id", patch(patch_line).delete(remove_line))
}

/// How the caller's basket is looked up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasketOwner {
    User(i32),
    Anonymous(Option<Uuid>),
}

impl BasketOwner {
    fn from_request(user: Option<&CurrentUser>, headers: &HeaderMap) -> Self {
        match user {
            Some(CurrentUser(user)) => BasketOwner::User(user.id),
            None => BasketOwner::Anonymous(
                headers
                    .get(BASKET_TOKEN_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| Uuid::parse_str(value.trim()).ok()),
            ),
        }
    }
}

pub async fn find_open_basket<C: ConnectionTrait>(
    conn: &C,
    owner: BasketOwner,
) -> Result<Option<basket::Model>, DbErr> {
    let finder = basket::Entity::find().filter(basket::Column::Status.eq(basket::Status::Open));
    match owner {
        BasketOwner::User(user_id) => {
            finder
                .filter(basket::Column::UserId.eq(user_id))
                .order_by_desc(basket::Column::Id)
                .one(conn)
                .await
        }
        BasketOwner::Anonymous(Some(token)) => {
            finder
                .filter(basket::Column::Token.eq(token))
                .filter(basket::Column::UserId.is_null())
                .one(conn)
                .await
        }
        BasketOwner::Anonymous(None) => Ok(None),
    }
}

async fn create_basket<C: ConnectionTrait>(
    conn: &C,
    owner: BasketOwner,
) -> Result<basket::Model, DbErr> {
    let user_id = match owner {
        BasketOwner::User(user_id) => Some(user_id),
        BasketOwner::Anonymous(_) => None,
    };
    basket::ActiveModel {
        token: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        status: Set(basket::Status::Open),
        date_added: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

#[derive(Debug, Error)]
pub enum LineError {
    #[error("A basket line can hold at most 999 items")]
    TooMany,
    #[error(transparent)]
    Db(#[from] DbErr),
}

fn grown_quantity(current: i32, extra: i32) -> Option<i32> {
    current
        .checked_add(extra)
        .filter(|total| *total <= MAX_LINE_QUANTITY)
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    basket_id: i32,
    product_id: i32,
) -> Result<Option<basket_line::Model>, DbErr> {
    basket_line::Entity::find()
        .filter(basket_line::Column::BasketId.eq(basket_id))
        .filter(basket_line::Column::ProductId.eq(product_id))
        .one(conn)
        .await
}

async fn insert_line<C: ConnectionTrait>(
    conn: &C,
    basket_id: i32,
    product_id: i32,
    quantity: i32,
) -> Result<basket_line::Model, DbErr> {
    basket_line::ActiveModel {
        basket_id: Set(basket_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(conn)
    .await
}

async fn set_quantity<C: ConnectionTrait>(
    conn: &C,
    line: basket_line::Model,
    quantity: i32,
) -> Result<basket_line::Model, DbErr> {
    let mut line: basket_line::ActiveModel = line.into();
    line.quantity = Set(quantity);
    line.update(conn).await
}

/// Adds `quantity` of a product, growing the existing line if there is one.
/// A line never grows past `MAX_LINE_QUANTITY`.
pub async fn add_line<C: ConnectionTrait>(
    conn: &C,
    basket_id: i32,
    product_id: i32,
    quantity: i32,
) -> Result<basket_line::Model, LineError> {
    match find_line(conn, basket_id, product_id).await? {
        Some(line) => {
            let total = grown_quantity(line.quantity, quantity).ok_or(LineError::TooMany)?;
            Ok(set_quantity(conn, line, total).await?)
        }
        None if !(1..=MAX_LINE_QUANTITY).contains(&quantity) => Err(LineError::TooMany),
        None => Ok(insert_line(conn, basket_id, product_id, quantity).await?),
    }
}

/// Gives an anonymous basket to `user_id` on login. When the user already has
/// an open basket the anonymous lines are merged into it, capped at
/// `MAX_LINE_QUANTITY` per line.
pub async fn attach_anonymous_basket<C: ConnectionTrait>(
    conn: &C,
    token: Uuid,
    user_id: i32,
) -> Result<(), DbErr> {
    let anonymous = match find_open_basket(conn, BasketOwner::Anonymous(Some(token))).await? {
        Some(basket) => basket,
        None => return Ok(()),
    };

    match find_open_basket(conn, BasketOwner::User(user_id)).await? {
        Some(existing) => {
            let lines = anonymous
                .find_related(basket_line::Entity)
                .all(conn)
                .await?;
            for line in lines {
                match find_line(conn, existing.id, line.product_id).await? {
                    Some(current) => {
                        let total = grown_quantity(current.quantity, line.quantity)
                            .unwrap_or(MAX_LINE_QUANTITY);
                        set_quantity(conn, current, total).await?;
                    }
                    None => {
                        let quantity = line.quantity.clamp(1, MAX_LINE_QUANTITY);
                        insert_line(conn, existing.id, line.product_id, quantity).await?;
                    }
                }
            }
            anonymous.delete(conn).await?;
            tracing::info!(user_id, basket_id = existing.id, "Merged anonymous basket");
        }
        None => {
            let basket_id = anonymous.id;
            let mut anonymous: basket::ActiveModel = anonymous.into();
            anonymous.user_id = Set(Some(user_id));
            anonymous.update(conn).await?;
            tracing::info!(user_id, basket_id, "Claimed anonymous basket");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct BasketLineView {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub product_slug: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BasketView {
    pub id: Option<i32>,
    pub basket_token: Option<Uuid>,
    pub status: Option<basket::Status>,
    pub lines: Vec<BasketLineView>,
    pub count: i32,
    pub total: Decimal,
}

impl BasketView {
    pub fn empty() -> Self {
        BasketView {
            id: None,
            basket_token: None,
            status: None,
            lines: Vec::new(),
            count: 0,
            total: Decimal::ZERO,
        }
    }
}

pub async fn basket_view<C: ConnectionTrait>(
    conn: &C,
    basket: &basket::Model,
) -> Result<BasketView, DbErr> {
    let rows = basket_line::Entity::find()
        .filter(basket_line::Column::BasketId.eq(basket.id))
        .find_also_related(product::Entity)
        .order_by_asc(basket_line::Column::Id)
        .all(conn)
        .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for (line, product) in rows {
        let Some(product) = product else { continue };
        lines.push(BasketLineView {
            id: line.id,
            product_id: product.id,
            product_name: product.name,
            product_slug: product.slug,
            unit_price: product.price,
            quantity: line.quantity,
            line_total: product.price * Decimal::from(line.quantity),
        });
    }

    Ok(BasketView {
        id: Some(basket.id),
        basket_token: Some(basket.token),
        status: Some(basket.status),
        count: lines.iter().map(|line| line.quantity).sum(),
        total: lines.iter().map(|line| line.line_total).sum(),
        lines,
    })
}

async fn get_basket(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    user: Option<Extension<CurrentUser>>,
    headers: HeaderMap,
) -> Response {
    let owner = BasketOwner::from_request(user.as_ref().map(|Extension(u)| u), &headers);

    let basket = match find_open_basket(&*db, owner).await {
        Ok(basket) => basket,
        Err(err) => return db_error(err),
    };

    let view = match basket {
        Some(basket) => match basket_view(&*db, &basket).await {
            Ok(view) => view,
            Err(err) => return db_error(err),
        },
        None => BasketView::empty(),
    };
    to_response(Json(view), Ok(()))
}

async fn add_to_basket(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    user: Option<Extension<CurrentUser>>,
    headers: HeaderMap,
    Json(payload): Json<AddProduct>,
) -> Response {
    let owner = BasketOwner::from_request(user.as_ref().map(|Extension(u)| u), &headers);
    if let Err(err) = payload.validate() {
        return fail(
            StatusCode::BAD_REQUEST,
            "Quantity should be between 1 and 999",
            ApiError::ValidationFail(err.to_string()),
        );
    }
    let quantity = payload.quantity.unwrap_or(1);

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    match product::Entity::find_by_id(payload.product_id)
        .filter(product::Column::Active.eq(true))
        .one(&txn)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("product", payload.product_id),
        Err(err) => return db_error(err),
    }

    let (basket, created) = match find_open_basket(&txn, owner).await {
        Ok(Some(basket)) => (basket, false),
        Ok(None) => match create_basket(&txn, owner).await {
            Ok(basket) => (basket, true),
            Err(err) => return db_error(err),
        },
        Err(err) => return db_error(err),
    };

    match add_line(&txn, basket.id, payload.product_id, quantity).await {
        Ok(_) => {}
        Err(LineError::TooMany) => {
            let _ = txn.rollback().await;
            let tmp = LineError::TooMany.to_string();
            return fail(StatusCode::BAD_REQUEST, tmp.clone(), ApiError::General(tmp));
        }
        Err(LineError::Db(err)) => {
            let _ = txn.rollback().await;
            return db_error(err);
        }
    }

    let view = match basket_view(&txn, &basket).await {
        Ok(view) => view,
        Err(err) => return db_error(err),
    };
    if let Err(err) = txn.commit().await {
        return db_error(err);
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    to_response((status, Json(view)), Ok(()))
}

/// Loads a line only if it sits in the caller's open basket.
async fn owned_line<C: ConnectionTrait>(
    conn: &C,
    owner: BasketOwner,
    line_id: i32,
) -> Result<Option<basket_line::Model>, DbErr> {
    let Some(basket) = find_open_basket(conn, owner).await? else {
        return Ok(None);
    };
    basket_line::Entity::find_by_id(line_id)
        .filter(basket_line::Column::BasketId.eq(basket.id))
        .one(conn)
        .await
}

async fn patch_line(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    user: Option<Extension<CurrentUser>>,
    headers: HeaderMap,
    Json(payload): Json<PatchLine>,
) -> Response {
    let owner = BasketOwner::from_request(user.as_ref().map(|Extension(u)| u), &headers);
    if let Err(err) = payload.validate() {
        return fail(
            StatusCode::BAD_REQUEST,
            "Quantity should be between 0 and 999",
            ApiError::ValidationFail(err.to_string()),
        );
    }

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    let line = match owned_line(&txn, owner, id).await {
        Ok(Some(line)) => line,
        Ok(None) => return not_found("basket line", id),
        Err(err) => return db_error(err),
    };

    let result = if payload.quantity == 0 {
        line.delete(&txn).await.map(|_| ())
    } else {
        set_quantity(&txn, line, payload.quantity).await.map(|_| ())
    };

    match result {
        Ok(()) => match txn.commit().await {
            Ok(()) => message(StatusCode::OK, "Resource patched successfully"),
            Err(err) => db_error(err),
        },
        Err(err) => {
            let _ = txn.rollback().await;
            db_error(err)
        }
    }
}

async fn remove_line(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    user: Option<Extension<CurrentUser>>,
    headers: HeaderMap,
) -> Response {
    let owner = BasketOwner::from_request(user.as_ref().map(|Extension(u)| u), &headers);

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => return internal(ApiError::TransactionCreationFailed),
    };

    let line = match owned_line(&txn, owner, id).await {
        Ok(Some(line)) => line,
        Ok(None) => return not_found("basket line", id),
        Err(err) => return db_error(err),
    };

    match line.delete(&txn).await {
        Ok(_) => match txn.commit().await {
            Ok(()) => message(StatusCode::OK, "Resource deleted successfully"),
            Err(err) => db_error(err),
        },
        Err(err) => {
            let _ = txn.rollback().await;
            db_error(err)
        }
    }
}

#[derive(Deserialize, Validate, Debug)]
struct AddProduct {
    product_id: i32,
    #[validate(range(min = 1, max = 999))]
    quantity: Option<i32>,
}

#[derive(Deserialize, Validate)]
struct PatchLine {
    #[validate(range(min = 0, max = 999))]
    quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_in_user_wins_over_token_header() {
        let user = CurrentUser(crate::entities::user::Model {
            id: 3,
            email: "a@b.test".into(),
            password: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_employee: false,
            is_dispatcher: false,
            is_superuser: false,
            date_joined: Utc::now(),
        });
        let mut headers = HeaderMap::new();
        headers.insert(BASKET_TOKEN_HEADER, Uuid::new_v4().to_string().parse().unwrap());
        assert_eq!(
            BasketOwner::from_request(Some(&user), &headers),
            BasketOwner::User(3)
        );
    }

    #[test]
    fn line_growth_stops_at_the_cap() {
        assert_eq!(grown_quantity(2, 3), Some(5));
        assert_eq!(grown_quantity(990, 9), Some(MAX_LINE_QUANTITY));
        assert_eq!(grown_quantity(990, 10), None);
        assert_eq!(grown_quantity(i32::MAX, 1), None);
    }

    #[test]
    fn malformed_token_means_no_basket() {
        let mut headers = HeaderMap::new();
        headers.insert(BASKET_TOKEN_HEADER, "nope".parse().unwrap());
        assert_eq!(
            BasketOwner::from_request(None, &headers),
            BasketOwner::Anonymous(None)
        );
    }
}
