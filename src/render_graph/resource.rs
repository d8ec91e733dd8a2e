//! Virtual resources for the render graph

use crate::backend::traits::{TextureHandle, TextureViewHandle};
use crate::backend::types::*;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) u32);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Virtual texture resource in the render graph
#[derive(Debug, Clone)]
pub struct VirtualTexture {
    pub id: ResourceId,
    pub desc: TextureDescriptor,
    pub name: String,
}

/// Resource type enumeration
#[derive(Debug, Clone)]
pub enum VirtualResource {
    Texture(VirtualTexture),
    /// External resource (like the swapchain image), bound per frame
    External { id: ResourceId, name: String },
}

impl VirtualResource {
    pub fn id(&self) -> ResourceId {
        match self {
            VirtualResource::Texture(t) => t.id,
            VirtualResource::External { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VirtualResource::Texture(t) => &t.name,
            VirtualResource::External { name, .. } => name,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, VirtualResource::External { .. })
    }
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Sampled or loaded in a shader
    TextureRead,
    /// Color attachment whose previous contents are discarded or cleared
    RenderTarget,
    /// Color attachment whose previous contents are kept
    RenderTargetLoad,
    /// Depth attachment tested against
    DepthStencilRead,
    /// Depth attachment written
    DepthStencilWrite,
    /// Source of a texture copy
    CopySrc,
    /// Destination of a texture copy
    CopyDst,
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::TextureRead
                | ResourceUsage::RenderTargetLoad
                | ResourceUsage::DepthStencilRead
                | ResourceUsage::CopySrc
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::RenderTarget
                | ResourceUsage::RenderTargetLoad
                | ResourceUsage::DepthStencilWrite
                | ResourceUsage::CopyDst
        )
    }
}

/// Describes texture dimensions that can be relative to screen size
#[derive(Debug, Clone, Copy)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to screen size (1.0 = full screen)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn resolve(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        let (width, height) = match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                ((screen_width as f32) * width_scale) as u32,
                ((screen_height as f32) * height_scale) as u32,
            ),
        };
        (width.max(1), height.max(1))
    }
}

/// A texture the executor allocated for a virtual resource
#[derive(Debug, Clone, Copy)]
pub struct AllocatedTexture {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_size_never_zero() {
        let size = TextureSize::Relative {
            width_scale: 0.5,
            height_scale: 0.5,
        };
        assert_eq!(size.resolve(1920, 1024), (960, 512));
        assert_eq!(size.resolve(1, 1), (1, 1));
    }

    #[test]
    fn test_load_counts_as_read_and_write() {
        let access = ResourceAccess {
            resource: ResourceId(0),
            usage: ResourceUsage::RenderTargetLoad,
        };
        assert!(access.is_read());
        assert!(access.is_write());
    }
}
