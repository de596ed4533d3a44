use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{
    order::{self, Entity as OrderEntity},
    order_line, product,
};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, not_found, to_response},
};

pub fn order_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders))
        .route("/orders/:id", get(get_order))
}

async fn get_orders(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let orders = match OrderEntity::find()
        .filter(order::Column::UserId.eq(user.id))
        .order_by_desc(order::Column::DateAdded)
        .order_by_desc(order::Column::Id)
        .all(&*db)
        .await
    {
        Ok(orders) => orders,
        Err(err) => return db_error(err),
    };

    match order_responses(&*db, orders).await {
        Ok(response) => to_response(Json(response), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let found = OrderEntity::find_by_id(id)
        .filter(order::Column::UserId.eq(user.id))
        .one(&*db)
        .await;

    match found {
        Ok(Some(model)) => match order_responses(&*db, vec![model]).await {
            Ok(mut response) => match response.pop() {
                Some(order) => to_response(Json(order), Ok(())),
                None => not_found("order", id),
            },
            Err(err) => db_error(err),
        },
        Ok(None) => not_found("order", id),
        Err(err) => db_error(err),
    }
}

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: order::Model,
    pub lines: Vec<OrderLineResponse>,
    pub total: Decimal,
}

/// Attaches lines and totals to each order, keeping the given order.
pub async fn order_responses<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderResponse>, DbErr> {
    let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let rows = order_line::Entity::find()
        .filter(order_line::Column::OrderId.is_in(ids))
        .find_also_related(product::Entity)
        .order_by_asc(order_line::Column::Id)
        .all(conn)
        .await?;

    let mut lines: HashMap<i32, Vec<OrderLineResponse>> = HashMap::new();
    for (line, product) in rows {
        lines.entry(line.order_id).or_default().push(OrderLineResponse {
            id: line.id,
            product_id: line.product_id,
            product_name: product.map(|p| p.name).unwrap_or_default(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.total(),
        });
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let lines = lines.remove(&order.id).unwrap_or_default();
            OrderResponse {
                total: lines.iter().map(|line| line.line_total).sum(),
                order,
                lines,
            }
        })
        .collect())
}
