use axum::routing::get;
use axum::{
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Router,
};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::entities::product_image::{self, Entity as ImageEntity};
use crate::media::MediaStore;
use crate::middleware::logging::{db_error, fail, not_found, to_response, ApiError};

pub fn uploads_router() -> Router {
    Router::new()
        .route("/image/:id", get(print_image))
        .route("/image/:id/thumbnail", get(print_thumbnail))
}

async fn print_image(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(media): Extension<MediaStore>,
) -> Response {
    match ImageEntity::find_by_id(id).one(&*db).await {
        Ok(Some(model)) => {
            let path = media.image_path(&model.path_name, model.extension);
            stream_file(path, &model).await
        }
        Ok(None) => not_found("image", id),
        Err(err) => db_error(err),
    }
}

async fn print_thumbnail(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(media): Extension<MediaStore>,
) -> Response {
    match ImageEntity::find_by_id(id).one(&*db).await {
        Ok(Some(model)) => {
            let path = media.thumbnail_path(&model.thumbnail_path_name);
            stream_file(path, &model).await
        }
        Ok(None) => not_found("image", id),
        Err(err) => db_error(err),
    }
}

async fn stream_file(path: PathBuf, model: &product_image::Model) -> Response {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            return fail(
                StatusCode::NOT_FOUND,
                "Not found",
                ApiError::Storage(format!("Image {} missing on disk: {err}", model.id)),
            )
        }
    };

    let content_type = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    let stream = ReaderStream::new(file);
    let body = axum::body::Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline"),
    );

    to_response((headers, body), Ok(()))
}
