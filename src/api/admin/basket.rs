use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::PageQuery;
use crate::api::public::basket::{basket_view, find_open_basket, BasketOwner, BasketView};
use crate::entities::{
    basket::{self, Entity as BasketEntity},
    basket_line, order,
};
use crate::middleware::logging::{db_error, fail, not_found, to_response, ApiError};

pub fn admin_basket_router() -> Router {
    Router::new()
        .route("/baskets", get(list_baskets))
        .route("/baskets/:id", get(get_basket).patch(patch_basket))
}

async fn list_baskets(
    Query(params): Query<BasketListQuery>,
    Query(paging): Query<PageQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut half_result = BasketEntity::find();
    if let Some(status) = params.status {
        half_result = half_result.filter(basket::Column::Status.eq(status));
    }

    let paginator = half_result
        .order_by_asc(basket::Column::Id)
        .paginate(&*db, paging.page_size());
    let total = match paginator.num_items().await {
        Ok(total) => total,
        Err(err) => return db_error(err),
    };
    let baskets = match paginator.fetch_page(paging.page() - 1).await {
        Ok(baskets) => baskets,
        Err(err) => return db_error(err),
    };

    let ids: Vec<i32> = baskets.iter().map(|b| b.id).collect();
    let lines = match basket_line::Entity::find()
        .filter(basket_line::Column::BasketId.is_in(ids))
        .all(&*db)
        .await
    {
        Ok(lines) => lines,
        Err(err) => return db_error(err),
    };
    let mut counts: HashMap<i32, i32> = HashMap::new();
    for line in lines {
        *counts.entry(line.basket_id).or_default() += line.quantity;
    }

    let items: Vec<BasketSummary> = baskets
        .into_iter()
        .map(|basket| BasketSummary {
            id: basket.id,
            user_id: basket.user_id,
            status: basket.status,
            count: counts.get(&basket.id).copied().unwrap_or_default(),
            date_added: basket.date_added,
        })
        .collect();
    to_response(Json(paging.wrap(items, total)), Ok(()))
}

async fn get_basket(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let basket = match BasketEntity::find_by_id(id).one(&*db).await {
        Ok(Some(basket)) => basket,
        Ok(None) => return not_found("basket", id),
        Err(err) => return db_error(err),
    };

    match basket_view(&*db, &basket).await {
        Ok(view) => to_response(
            Json(AdminBasket {
                user_id: basket.user_id,
                view,
            }),
            Ok(()),
        ),
        Err(err) => db_error(err),
    }
}

async fn patch_basket(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<PatchBasket>,
) -> Response {
    let existing = match BasketEntity::find_by_id(id).one(&*db).await {
        Ok(Some(basket)) => basket,
        Ok(None) => return not_found("basket", id),
        Err(err) => return db_error(err),
    };

    if !existing.is_open() && payload.status == basket::Status::Open {
        if let Some(conflict) = reopen_conflict(&db, &existing).await {
            return conflict;
        }
    }

    let mut active: basket::ActiveModel = existing.into();
    active.status = Set(payload.status);
    let basket = match active.update(&*db).await {
        Ok(basket) => basket,
        Err(err) => return db_error(err),
    };

    match basket_view(&*db, &basket).await {
        Ok(view) => to_response(
            Json(AdminBasket {
                user_id: basket.user_id,
                view,
            }),
            Ok(()),
        ),
        Err(err) => db_error(err),
    }
}

/// A submitted basket stays closed once an order was made from it, and a user
/// never ends up with two open baskets.
async fn reopen_conflict(db: &DatabaseConnection, basket: &basket::Model) -> Option<Response> {
    match order::Entity::find()
        .filter(order::Column::BasketId.eq(basket.id))
        .one(db)
        .await
    {
        Ok(Some(order)) => {
            let tmp = format!("Basket {} was already converted to order {}", basket.id, order.id);
            return Some(fail(StatusCode::CONFLICT, tmp.clone(), ApiError::General(tmp)));
        }
        Ok(None) => {}
        Err(err) => return Some(db_error(err)),
    }

    let Some(user_id) = basket.user_id else {
        return None;
    };
    match find_open_basket(db, BasketOwner::User(user_id)).await {
        Ok(Some(open)) => {
            let tmp = format!("User {user_id} already has open basket {}", open.id);
            Some(fail(StatusCode::CONFLICT, tmp.clone(), ApiError::General(tmp)))
        }
        Ok(None) => None,
        Err(err) => Some(db_error(err)),
    }
}

#[derive(Deserialize)]
struct BasketListQuery {
    status: Option<basket::Status>,
}

#[derive(Deserialize)]
struct PatchBasket {
    status: basket::Status,
}

#[derive(Serialize)]
struct BasketSummary {
    id: i32,
    user_id: Option<i32>,
    status: basket::Status,
    count: i32,
    date_added: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct AdminBasket {
    user_id: Option<i32>,
    #[serde(flatten)]
    view: BasketView,
}
