pub mod api;
pub mod config;
pub mod entities;
pub mod media;
pub mod middleware;
pub mod reports;

use axum::Router;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;

use crate::api::create_api_router;
use crate::config::Config;
use crate::entities::{seed_owner, setup_schema};

/// Connects, creates missing tables and seeds the owner account when one is
/// configured.
pub async fn prepare_database(config: &Config) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let db = Database::connect(&config.database_url).await?;
    setup_schema(&db).await?;

    if let (Some(email), Some(password)) = (&config.owner_email, &config.owner_password) {
        seed_owner(&db, email, password).await?;
    }
    Ok(db)
}

pub fn app(db: DatabaseConnection, config: Config) -> Router {
    create_api_router(Arc::new(db), Arc::new(config))
}
