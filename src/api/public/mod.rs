pub mod auth;
pub mod basket;
pub mod pages;
pub mod product;
pub mod uploads;

use axum::{middleware::from_fn_with_state, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::middleware::auth::{optional_auth_middleware, AuthState, Gate};
use basket::basket_router;
use pages::pages_router;
use product::product_router;
use uploads::uploads_router;

/// Storefront routes. Basket and contact routes know the caller when a bearer
/// token is sent, but do not require one.
pub fn public_api_router(db: Arc<DatabaseConnection>, secret: Arc<str>) -> Router {
    let auth_state = AuthState {
        db,
        secret,
        gate: Gate::Customer,
    };

    let shopper_router = Router::new()
        .merge(basket_router())
        .merge(pages_router())
        .layer(from_fn_with_state(auth_state, optional_auth_middleware));

    Router::new()
        .merge(product_router())
        .merge(uploads_router())
        .merge(shopper_router)
}
