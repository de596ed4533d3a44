use axum::{extract::Extension, http::StatusCode, response::Response, routing::post, Json, Router};
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::api::public::basket::attach_anonymous_basket;
use crate::config::Config;
use crate::entities::user::{self, hash_password, normalize_email, Entity as UserEntity};
use crate::middleware::{
    auth::generate_token,
    logging::{db_error, fail, internal, to_response, ApiError, FieldErrors},
};

pub fn auth_router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

async fn signup(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(config): Extension<Arc<Config>>,
    Json(payload): Json<SignupForm>,
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
        is_active: Set(true),
        is_employee: Set(false),
        is_dispatcher: Set(false),
        is_superuser: Set(false),
        date_joined: Set(Utc::now()),
        ..Default::default()
    };

    let model = match UserEntity::insert(new_user).exec_with_returning(&*db).await {
        Ok(model) => model,
        Err(err) => {
            return match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => fail(
                    StatusCode::CONFLICT,
                    "Email already registered",
                    ApiError::General(format!("Duplicate signup for {email}")),
                ),
                _ => db_error(err),
            };
        }
    };

    tracing::info!(user_id = model.id, "New signup");
    match generate_token(&model, &config.secret, config.token_ttl_hours) {
        Ok(token) => to_response(
            (
                StatusCode::CREATED,
                Json(json!({
                    "message": "User registered successfully",
                    "token": token
                })),
            ),
            Ok(()),
        ),
        Err(err) => internal(ApiError::TokenGenerationFailed(err.to_string())),
    }
}

async fn login(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(config): Extension<Arc<Config>>,
    Json(payload): Json<LoginForm>,
) -> Response {
    let email = normalize_email(&payload.email);
    let result = UserEntity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&*db)
        .await;

    let model = match result {
        Ok(Some(model)) if model.is_active && model.check_hash(&payload.password).is_ok() => model,
        Ok(_) => {
            return fail(
                StatusCode::UNAUTHORIZED,
                "Invalid email or password",
                ApiError::ValidationFail(format!("Login refused for {email}")),
            )
        }
        Err(err) => return db_error(err),
    };

    if let Some(token) = payload.basket_token {
        let txn = match db.begin().await {
            Ok(txn) => txn,
            Err(_) => return internal(ApiError::TransactionCreationFailed),
        };
        if let Err(err) = attach_anonymous_basket(&txn, token, model.id).await {
            let _ = txn.rollback().await;
            return db_error(err);
        }
        if let Err(err) = txn.commit().await {
            return db_error(err);
        }
    }

    match generate_token(&model, &config.secret, config.token_ttl_hours) {
        Ok(token) => to_response((StatusCode::OK, Json(json!({ "token": token }))), Ok(())),
        Err(err) => internal(ApiError::TokenGenerationFailed(err.to_string())),
    }
}

#[derive(Deserialize, Validate, Debug)]
struct SignupForm {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    password_confirm: String,
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LoginForm {
    email: String,
    password: String,
    basket_token: Option<Uuid>,
}
