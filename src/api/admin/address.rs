use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use std::sync::Arc;

use super::read_only_response;
use crate::api::user::address::PatchAddress;
use crate::entities::address::{self, Entity as AddressEntity};
use crate::middleware::logging::{db_error, not_found, to_response};

pub fn admin_address_router() -> Router {
    Router::new()
        .route("/addresses", get(list_addresses))
        .route("/addresses/:id", get(get_address).patch(patch_address))
}

async fn list_addresses(
    Query(params): Query<AddressListQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut half_result = AddressEntity::find();
    if let Some(user_id) = params.user_id {
        half_result = half_result.filter(address::Column::UserId.eq(user_id));
    }

    match half_result.order_by_asc(address::Column::Id).all(&*db).await {
        Ok(addresses) => to_response(Json(addresses), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn get_address(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    match AddressEntity::find_by_id(id).one(&*db).await {
        Ok(Some(address)) => to_response(Json(address), Ok(())),
        Ok(None) => not_found("address", id),
        Err(err) => db_error(err),
    }
}

/// Same rules as the owner's own edit; the owning user cannot be changed.
async fn patch_address(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<AdminPatchAddress>,
) -> Response {
    if payload.user_id.is_some() {
        return read_only_response(&["user_id"]);
    }
    let errors = payload.fields.errors();
    if !errors.is_empty() {
        return errors.into_response();
    }

    let existing = match AddressEntity::find_by_id(id).one(&*db).await {
        Ok(Some(address)) => address,
        Ok(None) => return not_found("address", id),
        Err(err) => return db_error(err),
    };

    let mut active: address::ActiveModel = existing.into();
    payload.fields.apply_to(&mut active);
    match active.update(&*db).await {
        Ok(model) => {
            tracing::info!(address_id = model.id, "Address edited by staff");
            to_response(Json(model), Ok(()))
        }
        Err(err) => db_error(err),
    }
}

#[derive(Deserialize)]
struct AddressListQuery {
    user_id: Option<i32>,
}

#[derive(Deserialize)]
struct AdminPatchAddress {
    user_id: Option<i32>,
    #[serde(flatten)]
    fields: PatchAddress,
}
