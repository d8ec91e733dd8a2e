//! Models: meshes with their material textures, loaded from glTF
//!
//! Texture roles follow the lighting model rather than glTF's PBR one:
//! base color becomes the diffuse map, the metallic-roughness map becomes a
//! specular map (`1 - roughness`) and the normal map is used as is. glTF has no
//! height role, so imported meshes use the flat default height map.

use crate::backend::types::Vertex;
use crate::resources::error::{ResourceError, ResourceResult};
use crate::resources::mesh::Mesh;
use crate::resources::texture::TextureData;
use glam::{Vec2, Vec3, Vec4};
use std::collections::HashMap;
use std::path::Path;

/// Which texture slot of the geometry shader a texture feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Diffuse,
    Specular,
    Normal,
    Height,
}

impl TextureRole {
    /// Only diffuse textures hold colors
    pub fn is_srgb(&self) -> bool {
        matches!(self, TextureRole::Diffuse)
    }
}

/// Indices into [`Model::textures`]; `None` uses the role's default texture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub diffuse: Option<usize>,
    pub specular: Option<usize>,
    pub normal: Option<usize>,
    pub height: Option<usize>,
}

impl MaterialTextures {
    pub fn get(&self, role: TextureRole) -> Option<usize> {
        match role {
            TextureRole::Diffuse => self.diffuse,
            TextureRole::Specular => self.specular,
            TextureRole::Normal => self.normal,
            TextureRole::Height => self.height,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelMesh {
    pub mesh: Mesh,
    pub textures: MaterialTextures,
}

/// A list of meshes sharing one de-duplicated texture list
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<ModelMesh>,
    pub textures: Vec<TextureData>,
}

impl Model {
    /// Model with a single untextured mesh
    pub fn from_mesh(mesh: Mesh) -> Self {
        Self {
            name: mesh.name.clone(),
            meshes: vec![ModelMesh {
                mesh,
                textures: MaterialTextures::default(),
            }],
            textures: Vec::new(),
        }
    }

    /// Unit cube with default textures
    pub fn cube() -> Self {
        Self::from_mesh(Mesh::cube())
    }

    /// Add a texture for a role to every mesh of the model
    pub fn with_texture(mut self, role: TextureRole, texture: TextureData) -> Self {
        let index = self.textures.len();
        self.textures.push(texture);
        for mesh in &mut self.meshes {
            let slot = match role {
                TextureRole::Diffuse => &mut mesh.textures.diffuse,
                TextureRole::Specular => &mut mesh.textures.specular,
                TextureRole::Normal => &mut mesh.textures.normal,
                TextureRole::Height => &mut mesh.textures.height,
            };
            *slot = Some(index);
        }
        self
    }

    /// Import every triangle mesh of a glTF file
    pub fn load_gltf<P: AsRef<Path>>(path: P) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::NotFound(path.to_path_buf()));
        }
        let (document, buffers, images) = gltf::import(path)?;
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("model")
            .to_string();

        let mut loader = TextureLoader {
            images: &images,
            textures: Vec::new(),
            loaded: HashMap::new(),
        };
        let mut meshes = Vec::new();

        for gltf_mesh in document.meshes() {
            for primitive in gltf_mesh.primitives() {
                let invalid = |reason: &str| ResourceError::InvalidPrimitive {
                    mesh: gltf_mesh.index(),
                    primitive: primitive.index(),
                    reason: reason.to_string(),
                };

                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    return Err(invalid("only triangle lists are supported"));
                }

                let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));

                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .ok_or_else(|| invalid("missing POSITION"))?
                    .map(Vec3::from)
                    .collect();
                let normals: Vec<Vec3> = reader
                    .read_normals()
                    .ok_or_else(|| invalid("missing NORMAL"))?
                    .map(Vec3::from)
                    .collect();
                let uvs: Vec<Vec2> = reader
                    .read_tex_coords(0)
                    .map(|tc| tc.into_f32().map(Vec2::from).collect())
                    .unwrap_or_else(|| vec![Vec2::ZERO; positions.len()]);
                let tangents: Option<Vec<Vec4>> =
                    reader.read_tangents().map(|t| t.map(Vec4::from).collect());

                if normals.len() != positions.len() || uvs.len() != positions.len() {
                    return Err(invalid("attribute counts differ"));
                }

                let vertices = positions
                    .iter()
                    .zip(&normals)
                    .zip(&uvs)
                    .enumerate()
                    .map(|(i, ((&position, &normal), &uv))| Vertex {
                        position,
                        normal,
                        uv,
                        tangent: tangents.as_ref().and_then(|t| t.get(i).copied()).unwrap_or(Vec4::ZERO),
                    })
                    .collect();

                let indices = match reader.read_indices() {
                    Some(indices) => indices.into_u32().collect(),
                    None => (0..positions.len() as u32).collect(),
                };

                let mut mesh = Mesh {
                    vertices,
                    indices,
                    name: gltf_mesh
                        .name()
                        .map(String::from)
                        .unwrap_or_else(|| format!("{}_{}", name, meshes.len())),
                };
                if tangents.is_none() {
                    mesh.compute_tangents();
                }

                let material = primitive.material();
                let pbr = material.pbr_metallic_roughness();
                let textures = MaterialTextures {
                    diffuse: pbr
                        .base_color_texture()
                        .map(|t| loader.load(t.texture().source().index(), TextureRole::Diffuse))
                        .transpose()?,
                    specular: pbr
                        .metallic_roughness_texture()
                        .map(|t| loader.load(t.texture().source().index(), TextureRole::Specular))
                        .transpose()?,
                    normal: material
                        .normal_texture()
                        .map(|t| loader.load(t.texture().source().index(), TextureRole::Normal))
                        .transpose()?,
                    height: None,
                };

                meshes.push(ModelMesh { mesh, textures });
            }
        }

        log::info!(
            "Loaded model '{}': {} meshes, {} textures",
            name,
            meshes.len(),
            loader.textures.len()
        );

        Ok(Self {
            name,
            meshes,
            textures: loader.textures,
        })
    }
}

/// Decodes each (image, role) pair once
struct TextureLoader<'a> {
    images: &'a [gltf::image::Data],
    textures: Vec<TextureData>,
    loaded: HashMap<(usize, TextureRole), usize>,
}

impl<'a> TextureLoader<'a> {
    fn load(&mut self, image: usize, role: TextureRole) -> ResourceResult<usize> {
        if let Some(&index) = self.loaded.get(&(image, role)) {
            return Ok(index);
        }
        let data = self.images.get(image).ok_or_else(|| ResourceError::UnsupportedFormat {
            name: format!("image{}", image),
            format: "missing image data".into(),
        })?;

        let name = format!("image{}_{:?}", image, role);
        let (mut pixels, has_alpha) = to_rgba8(data, &name)?;
        if role == TextureRole::Specular {
            specular_from_roughness(&mut pixels);
        }

        let index = self.textures.len();
        self.textures.push(TextureData::from_rgba8(
            data.width,
            data.height,
            pixels,
            &name,
            role.is_srgb(),
            has_alpha,
        ));
        self.loaded.insert((image, role), index);
        Ok(index)
    }
}

/// Expand 8-bit glTF pixel data to RGBA8
fn to_rgba8(data: &gltf::image::Data, name: &str) -> ResourceResult<(Vec<u8>, bool)> {
    use gltf::image::Format;

    let pixels = &data.pixels;
    let rgba = match data.format {
        Format::R8 => pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        Format::R8G8 => pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8B8A8 => pixels.clone(),
        other => {
            return Err(ResourceError::UnsupportedFormat {
                name: name.to_string(),
                format: format!("{:?}", other),
            })
        }
    };
    Ok((rgba, data.format == Format::R8G8B8A8))
}

/// Turn a metallic-roughness map into a specular intensity map in place
fn specular_from_roughness(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let specular = 255 - px[1];
        px[0] = specular;
        px[1] = specular;
        px[2] = specular;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_model_uses_defaults() {
        let model = Model::cube();
        assert_eq!(model.meshes.len(), 1);
        assert!(model.textures.is_empty());
        assert_eq!(model.meshes[0].textures, MaterialTextures::default());
    }

    #[test]
    fn test_with_texture_assigns_every_mesh() {
        let model = Model::cube().with_texture(TextureRole::Normal, TextureData::default_normal());
        assert_eq!(model.meshes[0].textures.get(TextureRole::Normal), Some(0));
        assert_eq!(model.meshes[0].textures.get(TextureRole::Diffuse), None);
    }

    #[test]
    fn test_specular_from_roughness() {
        let mut pixels = vec![0, 64, 255, 255];
        specular_from_roughness(&mut pixels);
        assert_eq!(pixels, vec![191, 191, 191, 255]);
    }

    #[test]
    fn test_rgb_expansion() {
        let data = gltf::image::Data {
            pixels: vec![1, 2, 3, 4, 5, 6],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };
        let (rgba, has_alpha) = to_rgba8(&data, "rgb").unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(!has_alpha);
    }

    #[test]
    fn test_missing_gltf_file() {
        assert!(matches!(
            Model::load_gltf("missing/model.gltf"),
            Err(ResourceError::NotFound(_))
        ));
    }
}
