use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::entities::user::{self, hash_password, normalize_email, Entity as UserEntity};
use crate::middleware::logging::{
    db_error, fail, internal, not_found, to_response, ApiError, FieldErrors,
};

pub fn admin_user_router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).patch(patch_user))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut half_result = UserEntity::find();
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        half_result = half_result.filter(
            Condition::any()
                .add(user::Column::Email.contains(search))
                .add(user::Column::FirstName.contains(search))
                .add(user::Column::LastName.contains(search)),
        );
    }

    match half_result.order_by_asc(user::Column::Email).all(&*db).await {
        Ok(users) => {
            let response: Vec<UserResponse> = users.into_iter().map(UserResponse::new).collect();
            to_response(Json(response), Ok(()))
        }
        Err(err) => db_error(err),
    }
}

async fn get_user(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    match UserEntity::find_by_id(id).one(&*db).await {
        Ok(Some(model)) => to_response(Json(UserResponse::new(model)), Ok(())),
        Ok(None) => not_found("user", id),
        Err(err) => db_error(err),
    }
}

async fn create_user(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<CreateUser>,
) -> Response {
    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    if payload.password != payload.password_confirm {
        errors.add("password_confirm", "password_mismatch");
    }
    if !errors.is_empty() {
        return errors.into_response();
    }

    let password = match hash_password(&payload.password) {
        Ok(password) => password,
        Err(err) => return internal(ApiError::PasswordHashFailed(err.to_string())),
    };

    let email = normalize_email(&payload.email);
    let new_user = user::ActiveModel {
        email: Set(email.clone()),
        password: Set(password),
        first_name: Set(payload.first_name.unwrap_or_default()),
        last_name: Set(payload.last_name.unwrap_or_default()),
        is_active: Set(payload.is_active.unwrap_or(true)),
        is_employee: Set(payload.is_employee.unwrap_or(false)),
        is_dispatcher: Set(payload.is_dispatcher.unwrap_or(false)),
        is_superuser: Set(payload.is_superuser.unwrap_or(false)),
        date_joined: Set(Utc::now()),
        ..Default::default()
    };

    match UserEntity::insert(new_user).exec_with_returning(&*db).await {
        Ok(model) => {
            tracing::info!(user_id = model.id, "User created from the owners site");
            to_response((StatusCode::CREATED, Json(UserResponse::new(model))), Ok(()))
        }
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => fail(
                StatusCode::CONFLICT,
                "Email already registered",
                ApiError::General(format!("Duplicate user {email}")),
            ),
            _ => db_error(err),
        },
    }
}

async fn patch_user(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<PatchUser>,
) -> Response {
    if let Err(err) = payload.validate() {
        return FieldErrors::from(&err).into_response();
    }

    let existing = match UserEntity::find_by_id(id).one(&*db).await {
        Ok(Some(model)) => model,
        Ok(None) => return not_found("user", id),
        Err(err) => return db_error(err),
    };

    let mut active: user::ActiveModel = existing.into();
    if let Some(password) = payload.password {
        match hash_password(&password) {
            Ok(hash) => active.password = Set(hash),
            Err(err) => return internal(ApiError::PasswordHashFailed(err.to_string())),
        }
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(is_employee) = payload.is_employee {
        active.is_employee = Set(is_employee);
    }
    if let Some(is_dispatcher) = payload.is_dispatcher {
        active.is_dispatcher = Set(is_dispatcher);
    }
    if let Some(is_superuser) = payload.is_superuser {
        active.is_superuser = Set(is_superuser);
    }

    match active.update(&*db).await {
        Ok(model) => to_response(Json(UserResponse::new(model)), Ok(())),
        Err(err) => db_error(err),
    }
}

#[derive(Deserialize)]
struct UserListQuery {
    search: Option<String>,
}

#[derive(Deserialize, Validate)]
struct CreateUser {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    password_confirm: String,
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
    is_active: Option<bool>,
    is_employee: Option<bool>,
    is_dispatcher: Option<bool>,
    is_superuser: Option<bool>,
}

#[derive(Deserialize, Validate)]
struct PatchUser {
    #[validate(length(min = 8, max = 128))]
    password: Option<String>,
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
    is_active: Option<bool>,
    is_employee: Option<bool>,
    is_dispatcher: Option<bool>,
    is_superuser: Option<bool>,
}

/// Never carries the password hash.
#[derive(Serialize)]
struct UserResponse {
    id: i32,
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_employee: bool,
    is_dispatcher: bool,
    is_superuser: bool,
    date_joined: DateTime<Utc>,
}

impl UserResponse {
    fn new(value: user::Model) -> Self {
        UserResponse {
            id: value.id,
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            is_active: value.is_active,
            is_employee: value.is_employee,
            is_dispatcher: value.is_dispatcher,
            is_superuser: value.is_superuser,
            date_joined: value.date_joined,
        }
    }
}
