use axum::{
    extract::Extension,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::entities::user;
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, to_response, FieldErrors},
};

pub fn profile_router() -> Router {
    Router::new().route("/profile", get(get_profile).patch(patch_profile))
}

async fn get_profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Response {
    to_response(Json(ProfileResponse::new(user)), Ok(()))
}

async fn patch_profile(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<PatchProfile>,
) -> Response {
    if let Err(err) = payload.validate() {
        return FieldErrors::from(&err).into_response();
    }

    let mut active: user::ActiveModel = user.into();
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }

    match active.update(&*db).await {
        Ok(model) => to_response(Json(ProfileResponse::new(model)), Ok(())),
        Err(err) => db_error(err),
    }
}

#[derive(Deserialize, Validate)]
struct PatchProfile {
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
}

#[derive(Serialize)]
struct ProfileResponse {
    id: i32,
    email: String,
    first_name: String,
    last_name: String,
    full_name: String,
    date_joined: chrono::DateTime<chrono::Utc>,
}

impl ProfileResponse {
    fn new(value: user::Model) -> ProfileResponse {
        ProfileResponse {
            id: value.id,
            full_name: value.full_name(),
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            date_joined: value.date_joined,
        }
    }
}
