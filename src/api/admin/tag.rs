use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::read_only_response;
use super::site::{blocked_fields, AdminSite};
use crate::entities::{
    product::{is_valid_slug, slugify},
    product_tag::{self, Entity as TagEntity},
};
use crate::middleware::{
    auth::CurrentUser,
    logging::{db_error, fail, not_found, to_response, ApiError, FieldErrors},
};

pub fn admin_tag_router() -> Router {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/:id", get(get_tag).patch(patch_tag))
}

async fn list_tags(
    Query(params): Query<TagListQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let mut half_result = TagEntity::find();
    if let Some(active) = params.active {
        half_result = half_result.filter(product_tag::Column::Active.eq(active));
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        half_result = half_result.filter(product_tag::Column::Name.contains(search));
    }

    match half_result
        .order_by_asc(product_tag::Column::Name)
        .all(&*db)
        .await
    {
        Ok(tags) => {
            let read_only = site.read_only_tag_fields(user.is_superuser);
            let response: Vec<AdminTagResponse> = tags
                .into_iter()
                .map(|tag| AdminTagResponse::new(tag, &read_only))
                .collect();
            to_response(Json(response), Ok(()))
        }
        Err(err) => db_error(err),
    }
}

async fn get_tag(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    match TagEntity::find_by_id(id).one(&*db).await {
        Ok(Some(tag)) => {
            let read_only = site.read_only_tag_fields(user.is_superuser);
            to_response(Json(AdminTagResponse::new(tag, &read_only)), Ok(()))
        }
        Ok(None) => not_found("tag", id),
        Err(err) => db_error(err),
    }
}

async fn create_tag(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateTag>,
) -> Response {
    let read_only = site.read_only_tag_fields(user.is_superuser);
    if !read_only.is_empty() {
        return read_only_response(&read_only);
    }

    let slug = payload
        .slug
        .clone()
        .unwrap_or_else(|| slugify(&payload.name));
    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    if !is_valid_slug(&slug) {
        errors.add("slug", "invalid_slug");
    }
    if !errors.is_empty() {
        return errors.into_response();
    }

    let new_tag = product_tag::ActiveModel {
        name: Set(payload.name.trim().to_owned()),
        slug: Set(slug.clone()),
        description: Set(payload.description.unwrap_or_default()),
        active: Set(payload.active.unwrap_or(true)),
        ..Default::default()
    };

    match TagEntity::insert(new_tag).exec_with_returning(&*db).await {
        Ok(tag) => to_response(
            (
                StatusCode::CREATED,
                Json(AdminTagResponse::new(tag, &read_only)),
            ),
            Ok(()),
        ),
        Err(err) => slug_conflict_or(err, &slug),
    }
}

async fn patch_tag(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(site): Extension<AdminSite>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<PatchTag>,
) -> Response {
    let read_only = site.read_only_tag_fields(user.is_superuser);
    let mut requested = Vec::new();
    if payload.name.is_some() {
        requested.push("name");
    }
    if payload.slug.is_some() {
        requested.push("slug");
    }
    let blocked = blocked_fields(&requested, &read_only);
    if !blocked.is_empty() {
        return read_only_response(&blocked);
    }

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => FieldErrors::from(&err),
    };
    if let Some(slug) = &payload.slug {
        if !is_valid_slug(slug) {
            errors.add("slug", "invalid_slug");
        }
    }
    if !errors.is_empty() {
        return errors.into_response();
    }

    let existing = match TagEntity::find_by_id(id).one(&*db).await {
        Ok(Some(tag)) => tag,
        Ok(None) => return not_found("tag", id),
        Err(err) => return db_error(err),
    };
    let slug = payload.slug.clone().unwrap_or_else(|| existing.slug.clone());

    let mut active: product_tag::ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_owned());
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(is_active) = payload.active {
        active.active = Set(is_active);
    }

    match active.update(&*db).await {
        Ok(tag) => to_response(Json(AdminTagResponse::new(tag, &read_only)), Ok(())),
        Err(err) => slug_conflict_or(err, &slug),
    }
}

fn slug_conflict_or(err: DbErr, slug: &str) -> Response {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => fail(
            StatusCode::CONFLICT,
            format!("Tag with slug {slug} already exists"),
            ApiError::General(format!("Duplicate tag slug {slug}")),
        ),
        _ => db_error(err),
    }
}

#[derive(Deserialize)]
struct TagListQuery {
    active: Option<bool>,
    search: Option<String>,
}

#[derive(Deserialize, Validate)]
struct CreateTag {
    #[validate(length(min = 1, max = 40))]
    name: String,
    #[validate(length(min = 1, max = 48))]
    slug: Option<String>,
    description: Option<String>,
    active: Option<bool>,
}

#[derive(Deserialize, Validate)]
struct PatchTag {
    #[validate(length(min = 1, max = 40))]
    name: Option<String>,
    #[validate(length(min = 1, max = 48))]
    slug: Option<String>,
    description: Option<String>,
    active: Option<bool>,
}

#[derive(Serialize)]
struct AdminTagResponse {
    #[serde(flatten)]
    tag: product_tag::Model,
    read_only_fields: Vec<&'static str>,
}

impl AdminTagResponse {
    fn new(tag: product_tag::Model, read_only: &[&'static str]) -> Self {
        AdminTagResponse {
            tag,
            read_only_fields: read_only.to_vec(),
        }
    }
}
