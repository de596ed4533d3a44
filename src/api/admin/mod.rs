pub mod address;
pub mod basket;
pub mod image;
pub mod order;
pub mod product;
pub mod report;
pub mod site;
pub mod tag;
pub mod user;

use axum::{
    extract::Extension, http::StatusCode, middleware::from_fn_with_state, response::Response,
    routing::get, Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::middleware::{
    auth::{auth_middleware, AuthState, CurrentUser, Gate},
    logging::{to_response, ApiError},
};
use site::{AdminSite, Resource, REPORTING_PAGES};

const DEFAULT_PAGE_SIZE: u64 = 25;
const MAX_PAGE_SIZE: u64 = 100;

/// One admin site: index, reports and the resources the site registers,
/// behind a gate that only lets the site's role in.
pub fn admin_site_router(
    db: Arc<DatabaseConnection>,
    secret: Arc<str>,
    file_size_limit: usize,
    site: AdminSite,
) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .merge(report::report_router());

    for resource in site.resources() {
        router = router.merge(match resource {
            Resource::Users => user::admin_user_router(),
            Resource::Products => product::admin_product_router(),
            Resource::Tags => tag::admin_tag_router(),
            Resource::Images => image::admin_image_router(file_size_limit),
            Resource::Addresses => address::admin_address_router(),
            Resource::Baskets => basket::admin_basket_router(),
            Resource::Orders => order::admin_order_router(),
        });
    }

    router.layer(Extension(site)).layer(from_fn_with_state(
        AuthState {
            db,
            secret,
            gate: Gate::Site(site),
        },
        auth_middleware,
    ))
}

async fn index(
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let (site_header_color, module_caption_color) = site.colors();
    to_response(
        Json(json!({
            "site": site,
            "site_header": site.header(),
            "site_header_color": site_header_color,
            "module_caption_color": module_caption_color,
            "user": user.email,
            "resources": site.resources(),
            "reporting_pages": REPORTING_PAGES,
        })),
        Ok(()),
    )
}

/// 403 naming the fields the caller tried to change but may not.
pub fn read_only_response(fields: &[&str]) -> Response {
    to_response(
        (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Read-only fields",
                "fields": fields,
            })),
        ),
        Err(ApiError::Forbidden(format!(
            "Attempt to change read-only fields: {}",
            fields.join(", ")
        ))),
    )
}

/// `?page=&page_size=` for the admin lists that can grow without bound.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

impl PageQuery {
    /// One-based.
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: u64) -> Page<T> {
        Page {
            items,
            page: self.page(),
            page_size: self.page_size(),
            total,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}
