use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::{
    constants::{IMAGE_EXTENSIONS, RECIPE_IMAGE_DIR},
    error::{Error, HttpError},
};

/// Image submitted inline as `data:image/<ext>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl TryFrom<&str> for ImagePayload {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (header, payload) = value
            .split_once(";base64,")
            .ok_or("Image must be a base64 encoded data URL.")?;

        let extension = header
            .strip_prefix("data:image/")
            .map(str::to_lowercase)
            .ok_or("Image must be a base64 encoded data URL.")?;

        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err("Unsupported image format.");
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| "Image payload is not valid base64.")?;

        if bytes.is_empty() {
            return Err("The submitted image is empty.");
        }

        Ok(Self { bytes, extension })
    }
}

/// Writes the image under the media root and returns its path relative to it.
pub async fn store_image(media_root: &Path, image: &ImagePayload) -> Result<String, Error> {
    let relative = format!("{RECIPE_IMAGE_DIR}/{}.{}", Uuid::new_v4(), image.extension);
    let path = media_root.join(&relative);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HttpError::InternalServerError.new(&format!("Media root: {e}")))?;
    }

    tokio::fs::write(&path, &image.bytes)
        .await
        .map_err(|e| HttpError::InternalServerError.new(&format!("Failed to store image: {e}")))?;

    Ok(relative)
}

pub async fn remove_image(media_root: &Path, relative: &str) {
    if let Err(e) = tokio::fs::remove_file(media_root.join(relative)).await {
        log::warn!("Failed to remove image {relative}: {e}");
    }
}

pub fn image_url(media_url: &str, relative: &str) -> String {
    format!("{media_url}{relative}")
}
