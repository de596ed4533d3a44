use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};
use validator::ValidationErrors;

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = start.elapsed();
    match response.extensions().get::<Result<(), ApiError>>() {
        Some(Ok(_)) => info!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request"
        ),
        Some(Err(value)) => error!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %value,
            "Failed to process request"
        ),
        None => debug!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request without an outcome extension"
        ),
    }

    response
}

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("Failed to create transaction")]
    TransactionCreationFailed,
    #[error("Failed to hash password {0}")]
    PasswordHashFailed(String),
    #[error("{0}")]
    General(String),
    #[error("Failed to generate token: {0}")]
    TokenGenerationFailed(String),
    #[error("Database error: {0}")]
    DbError(String),
    #[error("Failed to validate: {0}")]
    ValidationFail(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Media storage error: {0}")]
    Storage(String),
}

pub fn to_response<T: IntoResponse>(
    response: T,               //The response that we are sending + StatusCode
    ext: Result<(), ApiError>, //The extension, that we want to give logging middleware
) -> Response {
    let mut response = response.into_response();

    response.extensions_mut().insert(ext);

    response
}

pub fn message(status: StatusCode, text: &str) -> Response {
    to_response((status, Json(json!({ "message": text }))), Ok(()))
}

pub fn fail(status: StatusCode, text: impl Into<String>, err: ApiError) -> Response {
    to_response((status, Json(json!({ "error": text.into() }))), Err(err))
}

/// 500 with a generic body; the real cause only goes to the log.
pub fn internal(err: ApiError) -> Response {
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", err)
}

pub fn db_error(err: sea_orm::DbErr) -> Response {
    internal(ApiError::DbError(err.to_string()))
}

pub fn not_found(what: &str, id: impl std::fmt::Display) -> Response {
    let tmp = format!("No {what} with {id} id was found.");
    fail(StatusCode::NOT_FOUND, tmp.clone(), ApiError::General(tmp))
}

/// Field name -> list of error codes, the shape every form error uses.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, code: &str) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(code.to_owned());
    }

    pub fn merge(&mut self, errors: &ValidationErrors) {
        for (field, list) in errors.field_errors() {
            for error in list.iter() {
                self.add(&field.to_string(), &error.code);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn into_response(self) -> Response {
        let summary = self.fields().join(", ");
        to_response(
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "Validation failed",
                    "fields": self.0,
                })),
            ),
            Err(ApiError::ValidationFail(summary)),
        )
    }
}

impl From<&ValidationErrors> for FieldErrors {
    fn from(errors: &ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        fields.merge(errors);
        fields
    }
}
