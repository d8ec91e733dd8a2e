//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading textures and models.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The file does not exist.
    #[error("asset not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Failed to decode an image.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    /// Failed to import the glTF document or its buffers.
    #[error("glTF import error: {0}")]
    Gltf(#[from] gltf::Error),
    /// An image uses a pixel format the renderer cannot upload.
    #[error("unsupported pixel format {format} in '{name}'")]
    UnsupportedFormat { name: String, format: String },
    /// A primitive is missing data the renderer needs.
    #[error("mesh {mesh} primitive {primitive}: {reason}")]
    InvalidPrimitive {
        mesh: usize,
        primitive: usize,
        reason: String,
    },
}

pub type ResourceResult<T> = Result<T, ResourceError>;
