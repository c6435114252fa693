//! Image rotation collaborator, guarded by scope `image`.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use image::ImageFormat;

use crate::errors::AppError;
use crate::middleware::auth::require_scope;
use crate::AppState;

pub const IMAGE_SCOPE: &str = "image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// 90° counter-clockwise
    Left,
    Flip,
    /// 90° clockwise
    Right,
}

impl Rotation {
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "left" => Some(Rotation::Left),
            "flip" => Some(Rotation::Flip),
            "right" => Some(Rotation::Right),
            _ => None,
        }
    }
}

/// Supported content types and their codec.
pub fn format_for(content_type: &str) -> Option<(&'static str, ImageFormat)> {
    match content_type {
        "image/jpeg" => Some(("image/jpeg", ImageFormat::Jpeg)),
        "image/png" => Some(("image/png", ImageFormat::Png)),
        "image/tiff" => Some(("image/tiff", ImageFormat::Tiff)),
        _ => None,
    }
}

/// POST /image/:command — body is the raw image, response is the rotated
/// image in the same format.
pub async fn rotate_image(
    State(state): State<Arc<AppState>>,
    Path(command): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_scope(&state, &headers, IMAGE_SCOPE).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("(None)");
    let (mime, format) = format_for(content_type)
        .ok_or_else(|| AppError::BadRequest("Invalid image type".to_string()))?;
    let rotation = Rotation::from_command(&command)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid command \"{}\"", command)))?;

    let rotated = tokio::task::spawn_blocking(move || rotate(&body, format, rotation))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("rotation task failed: {}", e)))??;

    tracing::debug!(%command, mime, bytes = rotated.len(), "image rotated");
    Ok(([(header::CONTENT_TYPE, mime)], rotated).into_response())
}

pub fn rotate(data: &[u8], format: ImageFormat, rotation: Rotation) -> Result<Vec<u8>, AppError> {
    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| AppError::BadRequest(format!("Unable to decode image: {}", e)))?;

    let rotated = match rotation {
        Rotation::Left => img.rotate270(),
        Rotation::Flip => img.rotate180(),
        Rotation::Right => img.rotate90(),
    };

    let mut out = Cursor::new(Vec::new());
    rotated
        .write_to(&mut out, format)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("image encode failed: {}", e)))?;
    Ok(out.into_inner())
}
