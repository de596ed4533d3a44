use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{delete, get},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::entities::{
    product,
    product_image::{self, Entity as ImageEntity, FileExtension},
};
use crate::media::{MediaError, MediaStore};
use crate::middleware::logging::{db_error, fail, internal, message, not_found, to_response, ApiError};

static FILE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._ -]{0,99}$").expect("Invalid file name regex"));

/// Room for the multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn admin_image_router(file_size_limit: usize) -> Router {
    Router::new()
        .route("/images", get(list_images).post(upload))
        .route("/images/:id", delete(delete_image))
        .layer(DefaultBodyLimit::max(file_size_limit + MULTIPART_OVERHEAD))
}

struct Upload {
    file_name: String,
    extension: FileExtension,
    data: Vec<u8>,
}

async fn upload(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(config): Extension<Arc<Config>>,
    Extension(media): Extension<MediaStore>,
    mut multipart: Multipart,
) -> Response {
    let mut product_id: Option<i32> = None;
    let mut upload: Option<Upload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                return fail(
                    status,
                    err.body_text(),
                    ApiError::General(format!("Multipart error: {err}")),
                );
            }
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("product_id") => {
                let text = match field.text().await {
                    Ok(text) => text,
                    Err(err) => return bad_request(format!("Unreadable product_id: {err}")),
                };
                match text.trim().parse::<i32>() {
                    Ok(id) => product_id = Some(id),
                    Err(_) => return bad_request("product_id should be a number".to_owned()),
                }
            }
            Some("image") => {
                let extension = match field
                    .content_type()
                    .and_then(FileExtension::from_content_type)
                {
                    Some(extension) => extension,
                    None => return bad_request("Unsupported content type.".to_owned()),
                };

                let file_name = field.file_name().unwrap_or("upload").trim().to_owned();
                if !FILE_NAME_REGEX.is_match(&file_name) {
                    return bad_request(
                        "Invalid file name. It should contain only Latin letters, numbers, '.', '-', '_' or spaces."
                            .to_owned(),
                    );
                }

                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(err) => {
                        return fail(
                            err.status(),
                            err.body_text(),
                            ApiError::General(format!("Multipart error: {err}")),
                        )
                    }
                };
                if data.len() > config.file_size_limit {
                    let tmp = "Payload too large";
                    return fail(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        tmp,
                        ApiError::General(tmp.to_owned()),
                    );
                }

                upload = Some(Upload {
                    file_name,
                    extension,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let (Some(product_id), Some(upload)) = (product_id, upload) else {
        return bad_request("Both product_id and image are required.".to_owned());
    };

    match product::Entity::find_by_id(product_id).one(&*db).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("product", product_id),
        Err(err) => return db_error(err),
    }

    let stored = match media.save(upload.data, upload.extension).await {
        Ok(stored) => stored,
        Err(MediaError::Decode(reason)) => return bad_request(format!("Invalid image: {reason}")),
        Err(err) => return internal(ApiError::Storage(err.to_string())),
    };

    let new_image = product_image::ActiveModel {
        product_id: Set(product_id),
        file_name: Set(upload.file_name),
        path_name: Set(stored.path_name.clone()),
        extension: Set(upload.extension),
        thumbnail_path_name: Set(stored.thumbnail_path_name.clone()),
        ..Default::default()
    };

    match new_image.insert(&*db).await {
        Ok(model) => {
            tracing::info!(image_id = model.id, product_id, "Product image uploaded");
            to_response(
                (StatusCode::CREATED, Json(ImageResponse::new(model))),
                Ok(()),
            )
        }
        Err(err) => {
            let orphan = product_image::Model {
                id: 0,
                product_id,
                file_name: String::new(),
                path_name: stored.path_name,
                extension: upload.extension,
                thumbnail_path_name: stored.thumbnail_path_name,
            };
            if let Err(cleanup) = media.remove(&orphan).await {
                tracing::warn!(error = %cleanup, "Failed to clean up files of a rejected upload");
            }
            db_error(err)
        }
    }
}

async fn list_images(
    Query(params): Query<ImageListQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut half_result = ImageEntity::find();
    if let Some(product_id) = params.product_id {
        half_result = half_result.filter(product_image::Column::ProductId.eq(product_id));
    }

    match half_result
        .order_by_asc(product_image::Column::Id)
        .all(&*db)
        .await
    {
        Ok(images) => {
            let response: Vec<ImageResponse> = images.into_iter().map(ImageResponse::new).collect();
            to_response(Json(response), Ok(()))
        }
        Err(err) => db_error(err),
    }
}

async fn delete_image(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(media): Extension<MediaStore>,
) -> Response {
    let image = match ImageEntity::find_by_id(id).one(&*db).await {
        Ok(Some(image)) => image,
        Ok(None) => return not_found("image", id),
        Err(err) => return db_error(err),
    };

    if let Err(err) = image.clone().delete(&*db).await {
        return db_error(err);
    }
    if let Err(err) = media.remove(&image).await {
        tracing::error!(image_id = id, error = %err, "Image row deleted but files remain");
    }

    message(StatusCode::OK, "Resource deleted successfully")
}

fn bad_request(text: String) -> Response {
    fail(StatusCode::BAD_REQUEST, text.clone(), ApiError::General(text))
}

#[derive(Deserialize)]
struct ImageListQuery {
    product_id: Option<i32>,
}

#[derive(Serialize)]
struct ImageResponse {
    id: i32,
    product_id: i32,
    file_name: String,
    extension: FileExtension,
    url: String,
    thumbnail_url: String,
}

impl ImageResponse {
    fn new(value: product_image::Model) -> Self {
        ImageResponse {
            url: value.url(),
            thumbnail_url: value.thumbnail_url(),
            id: value.id,
            product_id: value.product_id,
            file_name: value.file_name,
            extension: value.extension,
        }
    }
}
