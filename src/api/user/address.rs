use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::entities::address::{self, is_supported_country, Entity as AddressEntity};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, message, not_found, to_response, FieldErrors},
};

pub fn address_router() -> Router {
    Router::new()
        .route("/address", get(get_addresses).post(create_address))
        .route(
            "/address/:id",
            get(get_address).patch(patch_address).delete(delete_address),
        )
}

async fn get_addresses(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    match AddressEntity::find()
        .filter(address::Column::UserId.eq(user.id))
        .order_by_asc(address::Column::Id)
        .all(&*db)
        .await
    {
        Ok(addresses) => to_response(Json(addresses), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn get_address(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    match find_owned(&db, user.id, id).await {
        Ok(Some(address)) => to_response(Json(address), Ok(())),
        Ok(None) => not_found("address", id),
        Err(err) => db_error(err),
    }
}

async fn create_address(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<AddressForm>,
) -> Response {
    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    check_country(&mut errors, "country", &payload.country);
    if !errors.is_empty() {
        return errors.into_response();
    }

    let new_address = address::ActiveModel {
        user_id: Set(user.id),
        name: Set(payload.name.trim().to_owned()),
        address1: Set(payload.address1.trim().to_owned()),
        address2: Set(blank_to_none(payload.address2)),
        zip_code: Set(payload.zip_code.trim().to_owned()),
        city: Set(payload.city.trim().to_owned()),
        country: Set(payload.country),
        ..Default::default()
    };

    match new_address.insert(&*db).await {
        Ok(model) => to_response((StatusCode::CREATED, Json(model)), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn patch_address(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<PatchAddress>,
) -> Response {
    let errors = payload.errors();
    if !errors.is_empty() {
        return errors.into_response();
    }

    let existing = match find_owned(&db, user.id, id).await {
        Ok(Some(address)) => address,
        Ok(None) => return not_found("address", id),
        Err(err) => return db_error(err),
    };

    let mut active: address::ActiveModel = existing.into();
    payload.apply_to(&mut active);

    match active.update(&*db).await {
        Ok(model) => to_response(Json(model), Ok(())),
        Err(err) => db_error(err),
    }
}

async fn delete_address(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let existing = match find_owned(&db, user.id, id).await {
        Ok(Some(address)) => address,
        Ok(None) => return not_found("address", id),
        Err(err) => return db_error(err),
    };

    match existing.delete(&*db).await {
        Ok(_) => message(StatusCode::OK, "Resource deleted successfully"),
        Err(err) => db_error(err),
    }
}

/// Another user's address is reported exactly like a missing one.
pub async fn find_owned(
    db: &DatabaseConnection,
    user_id: i32,
    id: i32,
) -> Result<Option<address::Model>, sea_orm::DbErr> {
    AddressEntity::find_by_id(id)
        .filter(address::Column::UserId.eq(user_id))
        .one(db)
        .await
}

/// Files an `unsupported_country` error under `field`.
pub fn check_country(errors: &mut FieldErrors, field: &str, country: &str) {
    if !is_supported_country(country) {
        errors.add(field, "unsupported_country");
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Deserialize, Validate, Debug)]
struct AddressForm {
    #[validate(length(min = 1, max = 60))]
    name: String,
    #[validate(length(min = 1, max = 60))]
    address1: String,
    #[validate(length(max = 60))]
    address2: Option<String>,
    #[validate(length(min = 1, max = 12))]
    zip_code: String,
    #[validate(length(min = 1, max = 60))]
    city: String,
    country: String,
}

#[derive(Deserialize, Validate, Debug)]
pub struct PatchAddress {
    #[validate(length(min = 1, max = 60))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub address1: Option<String>,
    #[validate(length(max = 60))]
    pub address2: Option<String>,
    #[validate(length(min = 1, max = 12))]
    pub zip_code: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub city: Option<String>,
    pub country: Option<String>,
}

impl PatchAddress {
    /// Validation problems, including the country check.
    pub fn errors(&self) -> FieldErrors {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(err) => FieldErrors::from(&err),
        };
        if let Some(country) = &self.country {
            check_country(&mut errors, "country", country);
        }
        errors
    }

    pub fn apply_to(self, active: &mut address::ActiveModel) {
        if let Some(name) = self.name {
            active.name = Set(name.trim().to_owned());
        }
        if let Some(address1) = self.address1 {
            active.address1 = Set(address1.trim().to_owned());
        }
        if let Some(address2) = self.address2 {
            active.address2 = Set(blank_to_none(Some(address2)));
        }
        if let Some(zip_code) = self.zip_code {
            active.zip_code = Set(zip_code.trim().to_owned());
        }
        if let Some(city) = self.city {
            active.city = Set(city.trim().to_owned());
        }
        if let Some(country) = self.country {
            active.country = Set(country);
        }
    }
}
