use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::middleware::{
    auth::CurrentUser,
    logging::{message, to_response, FieldErrors},
};

pub fn pages_router() -> Router {
    Router::new()
        .route("/contact-us", post(contact_us))
        .route("/about-us", get(about_us))
}

async fn contact_us(
    user: Option<Extension<CurrentUser>>,
    Json(payload): Json<ContactForm>,
) -> Response {
    if let Err(err) = payload.validate() {
        return FieldErrors::from(&err).into_response();
    }

    // Messages are not persisted; support reads them from the log.
    tracing::info!(
        name = %payload.name.trim(),
        user_id = ?user.map(|Extension(CurrentUser(u))| u.id),
        message = %payload.message.trim(),
        "Contact form submitted"
    );

    message(StatusCode::ACCEPTED, "Thanks for getting in touch")
}

async fn about_us() -> Response {
    to_response(
        Json(json!({
            "name": "BookTime",
            "description": "An online bookshop with a hand-picked catalog.",
            "email": "support@booktime.test"
        })),
        Ok(()),
    )
}

#[derive(Deserialize, Validate, Debug)]
struct ContactForm {
    #[validate(length(min = 1, max = 32))]
    name: String,
    #[validate(length(min = 1, max = 4000))]
    message: String,
}
