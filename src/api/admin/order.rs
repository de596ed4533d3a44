use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::{read_only_response, PageQuery};
use super::site::{blocked_fields, AdminSite};
use crate::api::user::address::check_country;
use crate::api::user::order::order_responses;
use crate::entities::{
    order::{self, Entity as OrderEntity, Status},
    order_line, product, user,
};
use crate::middleware::logging::{
    db_error, fail, not_found, to_response, ApiError, FieldErrors,
};

const BILLING_FIELDS: [&str; 6] = [
    "billing_name",
    "billing_address1",
    "billing_address2",
    "billing_zip_code",
    "billing_city",
    "billing_country",
];

pub fn admin_order_router() -> Router {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order).patch(patch_order))
}

async fn list_orders(
    Query(params): Query<OrderListQuery>,
    Query(paging): Query<PageQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
) -> Response {
    let mut half_result = scoped(site);
    if let Some(status) = params.status {
        half_result = half_result.filter(order::Column::Status.eq(status));
    }
    if let Some(country) = params.shipping_country.as_deref() {
        half_result = half_result.filter(order::Column::ShippingCountry.eq(country));
    }
    if let Some(from) = params.date_from {
        half_result = half_result.filter(order::Column::DateAdded.gte(start_of_day(from)));
    }
    if let Some(to) = params.date_to {
        if let Some(next) = to.succ_opt() {
            half_result = half_result.filter(order::Column::DateAdded.lt(start_of_day(next)));
        }
    }

    let paginator = half_result
        .order_by_desc(order::Column::DateAdded)
        .order_by_desc(order::Column::Id)
        .paginate(&*db, paging.page_size());
    let total = match paginator.num_items().await {
        Ok(total) => total,
        Err(err) => return db_error(err),
    };
    let orders = match paginator.fetch_page(paging.page() - 1).await {
        Ok(orders) => orders,
        Err(err) => return db_error(err),
    };

    render(&db, site, orders, &paging, total).await
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
) -> Response {
    match scoped(site)
        .filter(order::Column::Id.eq(id))
        .one(&*db)
        .await
    {
        Ok(Some(model)) => render_one(&db, site, model).await,
        Ok(None) => not_found("order", id),
        Err(err) => db_error(err),
    }
}

async fn patch_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Json(payload): Json<PatchOrder>,
) -> Response {
    let blocked = blocked_fields(&payload.requested_fields(), &read_only_order_fields(site));
    if !blocked.is_empty() {
        return read_only_response(&blocked);
    }

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    for (field, country) in [
        ("billing_country", &payload.billing_country),
        ("shipping_country", &payload.shipping_country),
    ] {
        if let Some(country) = country {
            check_country(&mut errors, field, country);
        }
    }
    if !errors.is_empty() {
        return errors.into_response();
    }

    let existing = match scoped(site).filter(order::Column::Id.eq(id)).one(&*db).await {
        Ok(Some(model)) => model,
        Ok(None) => return not_found("order", id),
        Err(err) => return db_error(err),
    };

    if let Some(next) = payload.status {
        if !existing.status.can_transition_to(next) {
            let tmp = format!("Order can not go from {} to {}", existing.status, next);
            return fail(StatusCode::CONFLICT, tmp.clone(), ApiError::General(tmp));
        }
    }

    if let Some(user_id) = payload.user_id {
        match user::Entity::find_by_id(user_id).one(&*db).await {
            Ok(Some(_)) => {}
            Ok(None) => return not_found("user", user_id),
            Err(err) => return db_error(err),
        }
    }

    let previous = existing.status;
    let mut active: order::ActiveModel = existing.into();
    payload.apply_to(&mut active);
    active.date_updated = Set(Utc::now());

    let model = match active.update(&*db).await {
        Ok(model) => model,
        Err(err) => return db_error(err),
    };
    if previous != model.status {
        tracing::info!(
            order_id = model.id,
            from = %previous,
            to = %model.status,
            site = ?site,
            "Order status changed"
        );
    }

    render_one(&db, site, model).await
}

/// Orders the site is allowed to see at all.
fn scoped(site: AdminSite) -> Select<OrderEntity> {
    let finder = OrderEntity::find();
    if site.restricts_orders_to_paid() {
        finder.filter(order::Column::Status.eq(Status::Paid))
    } else {
        finder
    }
}

fn read_only_order_fields(site: AdminSite) -> Vec<&'static str> {
    let mut fields = vec!["lines"];
    if !site.can_reassign_order_user() {
        fields.push("user_id");
    }
    if !site.shows_billing_and_prices() {
        fields.push("status");
        fields.extend(BILLING_FIELDS);
    }
    fields
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

async fn render(
    db: &DatabaseConnection,
    site: AdminSite,
    orders: Vec<order::Model>,
    paging: &PageQuery,
    total: u64,
) -> Response {
    if site.shows_billing_and_prices() {
        match order_responses(db, orders).await {
            Ok(items) => to_response(Json(paging.wrap(items, total)), Ok(())),
            Err(err) => db_error(err),
        }
    } else {
        match shipping_views(db, orders).await {
            Ok(items) => to_response(Json(paging.wrap(items, total)), Ok(())),
            Err(err) => db_error(err),
        }
    }
}

async fn render_one(db: &DatabaseConnection, site: AdminSite, order: order::Model) -> Response {
    let id = order.id;
    if site.shows_billing_and_prices() {
        match order_responses(db, vec![order]).await {
            Ok(mut response) => match response.pop() {
                Some(item) => to_response(Json(item), Ok(())),
                None => not_found("order", id),
            },
            Err(err) => db_error(err),
        }
    } else {
        match shipping_views(db, vec![order]).await {
            Ok(mut response) => match response.pop() {
                Some(item) => to_response(Json(item), Ok(())),
                None => not_found("order", id),
            },
            Err(err) => db_error(err),
        }
    }
}

async fn shipping_views(
    db: &DatabaseConnection,
    orders: Vec<order::Model>,
) -> Result<Vec<ShippingOrder>, DbErr> {
    let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let rows = order_line::Entity::find()
        .filter(order_line::Column::OrderId.is_in(ids))
        .find_also_related(product::Entity)
        .order_by_asc(order_line::Column::Id)
        .all(db)
        .await?;

    let mut lines: HashMap<i32, Vec<ShippingLine>> = HashMap::new();
    for (line, product) in rows {
        lines.entry(line.order_id).or_default().push(ShippingLine {
            product_id: line.product_id,
            product_name: product.map(|p| p.name).unwrap_or_default(),
            quantity: line.quantity,
        });
    }

    Ok(orders
        .into_iter()
        .map(|order| ShippingOrder {
            lines: lines.remove(&order.id).unwrap_or_default(),
            id: order.id,
            date_added: order.date_added,
            status: order.status,
            shipping_name: order.shipping_name,
            shipping_address1: order.shipping_address1,
            shipping_address2: order.shipping_address2,
            shipping_zip_code: order.shipping_zip_code,
            shipping_city: order.shipping_city,
            shipping_country: order.shipping_country,
        })
        .collect())
}

#[derive(Deserialize)]
struct OrderListQuery {
    status: Option<Status>,
    shipping_country: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

#[derive(Deserialize, Validate, Default)]
struct PatchOrder {
    status: Option<Status>,
    user_id: Option<i32>,
    lines: Option<serde_json::Value>,

    #[validate(length(min = 1, max = 60))]
    billing_name: Option<String>,
    #[validate(length(min = 1, max = 60))]
    billing_address1: Option<String>,
    #[validate(length(max = 60))]
    billing_address2: Option<String>,
    #[validate(length(min = 1, max = 12))]
    billing_zip_code: Option<String>,
    #[validate(length(min = 1, max = 60))]
    billing_city: Option<String>,
    billing_country: Option<String>,

    #[validate(length(min = 1, max = 60))]
    shipping_name: Option<String>,
    #[validate(length(min = 1, max = 60))]
    shipping_address1: Option<String>,
    #[validate(length(max = 60))]
    shipping_address2: Option<String>,
    #[validate(length(min = 1, max = 12))]
    shipping_zip_code: Option<String>,
    #[validate(length(min = 1, max = 60))]
    shipping_city: Option<String>,
    shipping_country: Option<String>,
}

impl PatchOrder {
    fn requested_fields(&self) -> Vec<&'static str> {
        let present = [
            ("status", self.status.is_some()),
            ("user_id", self.user_id.is_some()),
            ("lines", self.lines.is_some()),
            ("billing_name", self.billing_name.is_some()),
            ("billing_address1", self.billing_address1.is_some()),
            ("billing_address2", self.billing_address2.is_some()),
            ("billing_zip_code", self.billing_zip_code.is_some()),
            ("billing_city", self.billing_city.is_some()),
            ("billing_country", self.billing_country.is_some()),
            ("shipping_name", self.shipping_name.is_some()),
            ("shipping_address1", self.shipping_address1.is_some()),
            ("shipping_address2", self.shipping_address2.is_some()),
            ("shipping_zip_code", self.shipping_zip_code.is_some()),
            ("shipping_city", self.shipping_city.is_some()),
            ("shipping_country", self.shipping_country.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(field, set)| set.then_some(field))
            .collect()
    }

    fn apply_to(self, active: &mut order::ActiveModel) {
        if let Some(status) = self.status {
            active.status = Set(status);
        }
        if let Some(user_id) = self.user_id {
            active.user_id = Set(user_id);
        }
        if let Some(value) = self.billing_name {
            active.billing_name = Set(value);
        }
        if let Some(value) = self.billing_address1 {
            active.billing_address1 = Set(value);
        }
        if let Some(value) = self.billing_address2 {
            active.billing_address2 = Set(Some(value).filter(|v| !v.trim().is_empty()));
        }
        if let Some(value) = self.billing_zip_code {
            active.billing_zip_code = Set(value);
        }
        if let Some(value) = self.billing_city {
            active.billing_city = Set(value);
        }
        if let Some(value) = self.billing_country {
            active.billing_country = Set(value);
        }
        if let Some(value) = self.shipping_name {
            active.shipping_name = Set(value);
        }
        if let Some(value) = self.shipping_address1 {
            active.shipping_address1 = Set(value);
        }
        if let Some(value) = self.shipping_address2 {
            active.shipping_address2 = Set(Some(value).filter(|v| !v.trim().is_empty()));
        }
        if let Some(value) = self.shipping_zip_code {
            active.shipping_zip_code = Set(value);
        }
        if let Some(value) = self.shipping_city {
            active.shipping_city = Set(value);
        }
        if let Some(value) = self.shipping_country {
            active.shipping_country = Set(value);
        }
    }
}

/// What a dispatcher sees: where it goes and what is in it.
#[derive(Serialize)]
struct ShippingOrder {
    id: i32,
    date_added: DateTime<Utc>,
    status: Status,
    shipping_name: String,
    shipping_address1: String,
    shipping_address2: Option<String>,
    shipping_zip_code: String,
    shipping_city: String,
    shipping_country: String,
    lines: Vec<ShippingLine>,
}

#[derive(Serialize)]
struct ShippingLine {
    product_id: i32,
    product_name: String,
    quantity: i32,
}
