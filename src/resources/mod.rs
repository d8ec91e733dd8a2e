//! Resource management
//!
//! CPU-side meshes, textures and models, plus the GPU wrappers built from them.

mod error;
mod framebuffer;
mod mesh;
mod model;
mod texture;

pub use error::*;
pub use framebuffer::*;
pub use mesh::*;
pub use model::*;
pub use texture::*;
