use crate::api::admin::site::AdminSite;
use crate::entities::user::{self, Entity as UserEntity};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub email: String,
    pub exp: usize,
}

/// The signed-in user, loaded fresh from the database on every request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub user::Model);

/// Who may pass a given middleware instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Any active account.
    Customer,
    /// Active account holding the site's role flag.
    Site(AdminSite),
}

impl Gate {
    pub fn admits(&self, user: &user::Model) -> bool {
        if !user.is_active {
            return false;
        }
        match self {
            Gate::Customer => true,
            Gate::Site(site) => site.has_permission(user),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub secret: Arc<str>,
    pub gate: Gate,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match bearer_token(req.headers()) {
        Some(token) => token,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    let user = match resolve_user(&state.db, &state.secret, &token).await {
        Ok(user) => user,
        Err(AuthMiddlewareError::InternalServerError) => {
            return Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(err) => {
            tracing::debug!(error = %err, "Rejected bearer token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    if !state.gate.admits(&user) {
        tracing::warn!(user_id = user.id, gate = ?state.gate, "Access denied");
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Lets anonymous requests through, but a token that is present must be valid.
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(token) = bearer_token(req.headers()) {
        let user = match resolve_user(&state.db, &state.secret, &token).await {
            Ok(user) if state.gate.admits(&user) => user,
            Ok(_) => return Err(StatusCode::UNAUTHORIZED),
            Err(AuthMiddlewareError::InternalServerError) => {
                return Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(_) => return Err(StatusCode::UNAUTHORIZED),
        };
        req.extensions_mut().insert(CurrentUser(user));
    }
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

async fn resolve_user(
    db: &DatabaseConnection,
    secret: &str,
    token: &str,
) -> Result<user::Model, AuthMiddlewareError> {
    let claims = validate_token(secret, token)?;

    match UserEntity::find_by_id(claims.user_id).one(db).await {
        Ok(Some(user)) if user.email == claims.email => Ok(user),
        Ok(_) => Err(AuthMiddlewareError::InvalidUser),
        Err(err) => {
            tracing::error!(error = %err, "User lookup failed during authentication");
            Err(AuthMiddlewareError::InternalServerError)
        }
    }
}

pub fn generate_token(
    user: &user::Model,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, AuthMiddlewareError> {
    let ttl = Duration::try_hours(ttl_hours).ok_or(AuthMiddlewareError::GenerationFail)?;
    let exp = Utc::now()
        .checked_add_signed(ttl)
        .ok_or(AuthMiddlewareError::GenerationFail)?
        .timestamp() as usize;

    let claims = Claims {
        user_id: user.id,
        email: user.email.clone(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthMiddlewareError::GenerationFail)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, AuthMiddlewareError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthMiddlewareError::TokenExpired,
        _ => AuthMiddlewareError::ValidationFail,
    })
}

#[derive(Error, Debug)]
pub enum AuthMiddlewareError {
    #[error("Unknown user for token")]
    InvalidUser,
    #[error("Token expired")]
    TokenExpired,
    #[error("Failed to validate token")]
    ValidationFail,
    #[error("Failed to generate token")]
    GenerationFail,
    #[error("Internal server error")]
    InternalServerError,
}
