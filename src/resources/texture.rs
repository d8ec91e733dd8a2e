//! Texture loading and management

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::error::{ResourceError, ResourceResult};
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Loaded texture data, always tightly packed RGBA8
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
    /// The source image carried an alpha channel
    pub has_alpha: bool,
}

impl TextureData {
    /// Load texture from file
    ///
    /// `srgb` selects the sRGB view of the pixels; use it for color textures only.
    pub fn from_file<P: AsRef<Path>>(path: P, srgb: bool) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::NotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name, srgb))
    }

    /// Load texture from encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], name: &str, srgb: bool) -> ResourceResult<Self> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name, srgb))
    }

    /// Create texture from a decoded image
    pub fn from_image(img: DynamicImage, name: &str, srgb: bool) -> Self {
        let (width, height) = img.dimensions();
        let has_alpha = img.color().has_alpha();
        let data = img.to_rgba8().into_raw();

        Self {
            width,
            height,
            format: Self::rgba_format(srgb),
            data,
            name: name.to_string(),
            has_alpha,
        }
    }

    /// Create from raw RGBA8 pixels
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>, name: &str, srgb: bool, has_alpha: bool) -> Self {
        Self {
            width,
            height,
            format: Self::rgba_format(srgb),
            data,
            name: name.to_string(),
            has_alpha,
        }
    }

    fn rgba_format(srgb: bool) -> TextureFormat {
        if srgb {
            TextureFormat::Rgba8UnormSrgb
        } else {
            TextureFormat::Rgba8Unorm
        }
    }

    /// Create a 1x1 texture
    pub fn solid_color(color: [u8; 4], name: &str, srgb: bool) -> Self {
        Self::from_rgba8(1, 1, color.to_vec(), name, srgb, false)
    }

    /// Diffuse fallback: white, so the albedo is untouched
    pub fn default_diffuse() -> Self {
        Self::solid_color([255, 255, 255, 255], "default_diffuse", true)
    }

    /// Specular fallback: mid grey
    pub fn default_specular() -> Self {
        Self::solid_color([128, 128, 128, 255], "default_specular", false)
    }

    /// Normal fallback: (0, 0, 1) in tangent space
    pub fn default_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "default_normal", false)
    }

    /// Height fallback: flat, so parallax mapping does nothing
    pub fn default_height() -> Self {
        Self::solid_color([0, 0, 0, 255], "default_height", false)
    }

    /// Create a checkerboard texture
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self::from_rgba8(size, size, data, "checkerboard", true, false)
    }
}

/// GPU texture with associated view and sampler
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub name: String,
}

impl GpuTexture {
    /// Sampler address mode for a texture: textures with alpha clamp so their
    /// transparent borders do not bleed, the rest repeat
    pub fn address_mode(data: &TextureData) -> AddressMode {
        if data.has_alpha {
            AddressMode::ClampToEdge
        } else {
            AddressMode::Repeat
        }
    }

    /// Create and upload texture to GPU
    pub fn create(backend: &mut dyn GraphicsBackend, data: &TextureData) -> BackendResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;

        let view = backend.create_texture_view(handle)?;
        backend.write_texture(handle, &data.data, data.width, data.height);

        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some(format!("{} sampler", data.name)),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode: Self::address_mode(data),
        })?;

        log::trace!(
            "Uploaded texture '{}' {}x{} {:?}",
            data.name,
            data.width,
            data.height,
            data.format
        );

        Ok(Self {
            handle,
            view,
            sampler,
            width: data.width,
            height: data.height,
            format: data.format,
            name: data.name.clone(),
        })
    }

    pub fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_sampler(self.sampler);
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_role_defaults() {
        assert_eq!(TextureData::default_diffuse().format, TextureFormat::Rgba8UnormSrgb);
        assert_eq!(TextureData::default_normal().data, vec![128, 128, 255, 255]);
        assert_eq!(TextureData::default_height().data[0], 0);
        assert!(!TextureData::default_specular().format.is_srgb());
    }

    #[test]
    fn test_from_bytes_keeps_alpha_flag() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 40]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let tex = TextureData::from_bytes(&png, "alpha", true).unwrap();
        assert!(tex.has_alpha);
        assert_eq!(tex.data.len(), 16);
        assert_eq!(GpuTexture::address_mode(&tex), AddressMode::ClampToEdge);

        let rgb = TextureData::from_image(
            DynamicImage::ImageRgb8(image::RgbImage::new(2, 2)),
            "rgb",
            false,
        );
        assert!(!rgb.has_alpha);
        assert_eq!(GpuTexture::address_mode(&rgb), AddressMode::Repeat);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = TextureData::from_file("does/not/exist.png", true).unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(_)));
    }

    #[test]
    fn test_create_and_destroy() {
        let mut backend = RecordingBackend::new(4, 4);
        let texture = GpuTexture::create(&mut backend, &TextureData::checkerboard(16, [0; 4], [255; 4])).unwrap();
        assert_eq!(backend.live_resources(), 3);
        texture.destroy(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
