use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::product_image::{self, FileExtension};

/// Thumbnails fit in a square of this many pixels; aspect ratio is kept.
pub const THUMBNAIL_SIZE: u32 = 300;
const JPEG_QUALITY: u8 = 80;

const IMAGE_DIR: &str = "product-images";
const THUMBNAIL_DIR: &str = "product-thumbnails";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Invalid image: {0}")]
    Decode(String),
    #[error("Thumbnail encoding failed: {0}")]
    Encode(String),
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image worker failed: {0}")]
    Worker(String),
}

/// File names chosen for a freshly stored upload.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path_name: String,
    pub thumbnail_path_name: String,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaStore { root: root.into() }
    }

    pub fn image_path(&self, path_name: &str, extension: FileExtension) -> PathBuf {
        self.root
            .join(IMAGE_DIR)
            .join(format!("{path_name}.{extension}"))
    }

    pub fn thumbnail_path(&self, thumbnail_path_name: &str) -> PathBuf {
        self.root
            .join(THUMBNAIL_DIR)
            .join(format!("{thumbnail_path_name}.jpg"))
    }

    /// Validates the upload by decoding it, then writes the original and its
    /// thumbnail under fresh uuid names.
    pub async fn save(
        &self,
        data: Vec<u8>,
        extension: FileExtension,
    ) -> Result<StoredImage, MediaError> {
        let (data, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumbnail = make_thumbnail(&data)?;
            Ok::<_, MediaError>((data, thumbnail))
        })
        .await
        .map_err(|err| MediaError::Worker(err.to_string()))??;

        let path_name = Uuid::new_v4().to_string();
        let thumbnail_path_name = format!("{path_name}-thumb");

        tokio::fs::create_dir_all(self.root.join(IMAGE_DIR)).await?;
        tokio::fs::create_dir_all(self.root.join(THUMBNAIL_DIR)).await?;
        tokio::fs::write(self.image_path(&path_name, extension), data).await?;
        tokio::fs::write(self.thumbnail_path(&thumbnail_path_name), thumbnail).await?;

        tracing::info!(path_name = %path_name, "Stored product image");
        Ok(StoredImage {
            path_name,
            thumbnail_path_name,
        })
    }

    /// Missing files are not an error: the row is what matters.
    pub async fn remove(&self, image: &product_image::Model) -> Result<(), MediaError> {
        for path in [
            self.image_path(&image.path_name, image.extension),
            self.thumbnail_path(&image.thumbnail_path_name),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "Image file already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

pub fn make_thumbnail(data: &[u8]) -> Result<Vec<u8>, MediaError> {
    let img = image::load_from_memory(data).map_err(|e| MediaError::Decode(e.to_string()))?;
    let thumb = img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        thumb
            .write_with_encoder(encoder)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn thumbnail_fits_the_box_and_keeps_aspect() {
        let thumb = make_thumbnail(&png(900, 450)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.width(), 300);
        assert_eq!(decoded.height(), 150);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            make_thumbnail(b"definitely not an image"),
            Err(MediaError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn save_and_remove_round_trip() {
        let root = std::env::temp_dir().join(format!("booktime-media-{}", Uuid::new_v4()));
        let store = MediaStore::new(&root);

        let stored = store.save(png(40, 40), FileExtension::Png).await.unwrap();
        let original = store.image_path(&stored.path_name, FileExtension::Png);
        let thumb = store.thumbnail_path(&stored.thumbnail_path_name);
        assert!(original.exists());
        assert!(thumb.exists());

        let model = product_image::Model {
            id: 1,
            product_id: 1,
            file_name: "cover".into(),
            path_name: stored.path_name,
            extension: FileExtension::Png,
            thumbnail_path_name: stored.thumbnail_path_name,
        };
        store.remove(&model).await.unwrap();
        assert!(!original.exists());
        assert!(!thumb.exists());

        // second removal only warns
        store.remove(&model).await.unwrap();
        let _ = std::fs::remove_dir_all(root);
    }
}
