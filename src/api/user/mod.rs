pub mod address;
pub mod checkout;
pub mod order;
pub mod profile;

use axum::{middleware::from_fn_with_state, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::middleware::auth::{auth_middleware, AuthState, Gate};
use address::address_router;
use checkout::checkout_router;
use order::order_router;
use profile::profile_router;

pub fn user_api_router(db: Arc<DatabaseConnection>, secret: Arc<str>) -> Router {
    Router::new()
        .merge(profile_router())
        .merge(address_router())
        .merge(checkout_router())
        .merge(order_router())
        .layer(from_fn_with_state(
            AuthState {
                db,
                secret,
                gate: Gate::Customer,
            },
            auth_middleware,
        ))
}
