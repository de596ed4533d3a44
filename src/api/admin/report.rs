use axum::{
    extract::{Extension, Query},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::entities::{order, order_line, product};
use crate::middleware::logging::{db_error, to_response, FieldErrors};
use crate::reports::{
    is_valid_period, most_bought, orders_per_day, window_start, Series,
    ORDERS_PER_DAY_WINDOW_DAYS, PERIOD_CHOICES,
};

pub fn report_router() -> Router {
    Router::new()
        .route("/orders_per_day", get(get_orders_per_day))
        .route(
            "/most_bought_products",
            get(get_most_bought_products).post(post_most_bought_products),
        )
}

async fn get_orders_per_day(Extension(db): Extension<Arc<DatabaseConnection>>) -> Response {
    let series = match orders_per_day_series(&db).await {
        Ok(series) => series,
        Err(err) => return db_error(err),
    };

    to_response(
        Json(json!({
            "title": "Orders per day",
            "labels": series.labels,
            "values": series.values,
        })),
        Ok(()),
    )
}

async fn get_most_bought_products(
    Query(params): Query<PeriodQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    match params.period {
        None => render_most_bought(None, None),
        Some(raw) => match parse_period(&Value::String(raw)) {
            Ok(days) => most_bought_for(&db, days).await,
            Err(errors) => errors.into_response(),
        },
    }
}

async fn post_most_bought_products(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<PeriodForm>,
) -> Response {
    let raw = payload.period.unwrap_or(Value::Null);
    match parse_period(&raw) {
        Ok(days) => most_bought_for(&db, days).await,
        Err(errors) => errors.into_response(),
    }
}

async fn most_bought_for(db: &DatabaseConnection, days: u32) -> Response {
    match most_bought_series(db, days).await {
        Ok(series) => {
            tracing::info!(period = days, products = series.labels.len(), "Most bought products report");
            render_most_bought(Some(days), Some(series))
        }
        Err(err) => db_error(err),
    }
}

async fn orders_per_day_series(db: &DatabaseConnection) -> Result<Series, DbErr> {
    let since = window_start(Utc::now(), ORDERS_PER_DAY_WINDOW_DAYS);
    let day = Expr::cust("date(date_added)");
    let rows: Vec<(String, i64)> = order::Entity::find()
        .select_only()
        .column_as(day.clone(), "day")
        .column_as(order::Column::Id.count(), "orders")
        .filter(order::Column::DateAdded.gt(since))
        .group_by(day.clone())
        .order_by_asc(day)
        .into_tuple()
        .all(db)
        .await?;

    Ok(orders_per_day(rows))
}

async fn most_bought_series(db: &DatabaseConnection, days: u32) -> Result<Series, DbErr> {
    let since = window_start(Utc::now(), i64::from(days));
    let rows: Vec<(String, i64)> = order_line::Entity::find()
        .select_only()
        .column(product::Column::Name)
        .column_as(order_line::Column::Quantity.sum(), "quantity")
        .inner_join(order::Entity)
        .inner_join(product::Entity)
        .filter(order::Column::DateAdded.gt(since))
        .group_by(product::Column::Name)
        .into_tuple()
        .all(db)
        .await?;

    Ok(most_bought(rows))
}

fn render_most_bought(period: Option<u32>, series: Option<Series>) -> Response {
    let (labels, values) = match series {
        Some(series) => (Some(series.labels), Some(series.values)),
        None => (None, None),
    };
    to_response(
        Json(json!({
            "title": "Most bought products",
            "period": period,
            "period_choices": PERIOD_CHOICES,
            "labels": labels,
            "values": values,
        })),
        Ok(()),
    )
}

/// Accepts the period as a number or a numeric string.
fn parse_period(raw: &Value) -> Result<u32, FieldErrors> {
    let mut errors = FieldErrors::new();
    let days = match raw {
        Value::Null => {
            errors.add("period", "required");
            return Err(errors);
        }
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };

    match days {
        Some(days) if is_valid_period(days) => Ok(days),
        _ => {
            errors.add("period", "invalid_choice");
            Err(errors)
        }
    }
}

#[derive(Deserialize)]
struct PeriodQuery {
    period: Option<String>,
}

#[derive(Deserialize)]
struct PeriodForm {
    period: Option<Value>,
}
