pub mod admin;
pub mod catalog;
pub mod public;
pub mod user;

use axum::{extract::Extension, middleware, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::media::MediaStore;
use crate::middleware::logging::logging_middleware;
use admin::{admin_site_router, site::AdminSite};
use public::{auth::auth_router, public_api_router};
use user::user_api_router;

pub fn create_api_router(shared_db: Arc<DatabaseConnection>, config: Arc<Config>) -> Router {
    let secret: Arc<str> = Arc::from(config.secret.as_str());
    let media = MediaStore::new(config.media_root.clone());

    let api_router = Router::new()
        .merge(public_api_router(shared_db.clone(), secret.clone()))
        .merge(user_api_router(shared_db.clone(), secret.clone()));

    let mut router = Router::new()
        .merge(auth_router())
        .nest("/api", api_router);

    for site in AdminSite::ALL {
        router = router.nest(
            site.prefix(),
            admin_site_router(
                shared_db.clone(),
                secret.clone(),
                config.file_size_limit,
                site,
            ),
        );
    }

    router
        .layer(Extension(shared_db))
        .layer(Extension(config))
        .layer(Extension(media))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}
