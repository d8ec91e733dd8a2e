//! GPU-side mirror of the scene
//!
//! Owns every buffer, texture and bind group the passes draw with. Models and
//! objects are uploaded the first time they are seen; the scene is append-only,
//! so comparing lengths is enough to find new entries.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::renderer::RendererResult;
use crate::resources::{GpuTexture, Model, TextureData, TextureRole};
use crate::scene::{
    Camera, CameraUniformData, GpuPointLight, ModelId, ObjectUniforms, Scene, SceneError,
};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Per-frame shader parameters, bound next to the camera
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    pub use_normal_map: u32,
    pub min_layers: f32,
    pub max_layers: f32,
    pub height_scale: f32,
    pub light_count: u32,
    pub _pad: [u32; 3],
}

/// Index and vertex buffers of one mesh plus its material bind group
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub material: BindGroupHandle,
}

impl GpuMesh {
    /// Bind the mesh buffers and issue one indexed draw
    pub fn draw(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_vertex_buffer(0, self.vertex_buffer, 0);
        backend.set_index_buffer(self.index_buffer, 0, IndexFormat::Uint32);
        backend.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[derive(Debug)]
pub struct GpuModel {
    pub meshes: Vec<GpuMesh>,
    textures: Vec<GpuTexture>,
}

/// Uniform buffer and bind group of one renderable or emissive
#[derive(Debug)]
pub struct GpuObject {
    pub model: usize,
    pub buffer: BufferHandle,
    pub bind_group: BindGroupHandle,
}

/// Fallback textures, indexed like [`TextureRole`]
#[derive(Debug)]
struct DefaultTextures {
    diffuse: GpuTexture,
    specular: GpuTexture,
    normal: GpuTexture,
    height: GpuTexture,
}

impl DefaultTextures {
    fn get(&self, role: TextureRole) -> &GpuTexture {
        match role {
            TextureRole::Diffuse => &self.diffuse,
            TextureRole::Specular => &self.specular,
            TextureRole::Normal => &self.normal,
            TextureRole::Height => &self.height,
        }
    }
}

const TEXTURE_ROLES: [TextureRole; 4] = [
    TextureRole::Diffuse,
    TextureRole::Specular,
    TextureRole::Normal,
    TextureRole::Height,
];

pub struct GpuScene {
    /// Group 0: camera and frame parameters
    pub frame_layout: BindGroupLayoutHandle,
    /// Group 1: per-object uniforms
    pub object_layout: BindGroupLayoutHandle,
    /// Group 2: diffuse, specular, normal and height maps with their samplers
    pub material_layout: BindGroupLayoutHandle,
    pub frame_bind_group: BindGroupHandle,
    /// Storage buffer of [`GpuPointLight`] records read by the lighting pass
    pub lights_buffer: BufferHandle,
    camera_buffer: BufferHandle,
    params_buffer: BufferHandle,
    max_lights: usize,
    light_count: u32,
    /// Over-capacity light count last reported
    overflow_warned: Option<usize>,
    defaults: DefaultTextures,
    models: Vec<GpuModel>,
    objects: Vec<GpuObject>,
    emissives: Vec<GpuObject>,
}

impl GpuScene {
    pub fn new(backend: &mut dyn GraphicsBackend, max_lights: usize) -> BackendResult<Self> {
        let uniform = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        };
        let frame_layout = backend.create_bind_group_layout(&[uniform(0), uniform(1)])?;
        let object_layout = backend.create_bind_group_layout(&[uniform(0)])?;

        let mut material_entries: Vec<BindGroupLayoutEntry> = (0..4)
            .map(|binding| BindGroupLayoutEntry {
                binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                },
            })
            .collect();
        material_entries.extend((4..8).map(|binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler { filtering: true },
        }));
        let material_layout = backend.create_bind_group_layout(&material_entries)?;

        let camera_buffer =
            backend.create_buffer(&BufferDescriptor::uniform::<CameraUniformData>("Camera Uniforms"))?;
        let params_buffer =
            backend.create_buffer(&BufferDescriptor::uniform::<FrameParams>("Frame Params"))?;
        let frame_bind_group = backend.create_bind_group(
            frame_layout,
            &[
                (0, BindGroupEntry::buffer(camera_buffer)),
                (1, BindGroupEntry::buffer(params_buffer)),
            ],
        )?;

        let max_lights = max_lights.max(1);
        let lights_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Point Lights".into()),
            size: (max_lights * std::mem::size_of::<GpuPointLight>()) as u64,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;

        let defaults = DefaultTextures {
            diffuse: GpuTexture::create(backend, &TextureData::default_diffuse())?,
            specular: GpuTexture::create(backend, &TextureData::default_specular())?,
            normal: GpuTexture::create(backend, &TextureData::default_normal())?,
            height: GpuTexture::create(backend, &TextureData::default_height())?,
        };

        Ok(Self {
            frame_layout,
            object_layout,
            material_layout,
            frame_bind_group,
            lights_buffer,
            camera_buffer,
            params_buffer,
            max_lights,
            light_count: 0,
            overflow_warned: None,
            defaults,
            models: Vec::new(),
            objects: Vec::new(),
            emissives: Vec::new(),
        })
    }

    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    /// Lights written by the last [`GpuScene::update`]
    pub fn light_count(&self) -> u32 {
        self.light_count
    }

    pub fn model(&self, index: usize) -> Option<&GpuModel> {
        self.models.get(index)
    }

    pub fn objects(&self) -> &[GpuObject] {
        &self.objects
    }

    pub fn emissives(&self) -> &[GpuObject] {
        &self.emissives
    }

    /// Upload models, renderables and emissives added since the last call
    pub fn sync(&mut self, backend: &mut dyn GraphicsBackend, scene: &Scene) -> RendererResult<()> {
        for model in scene.models().iter().skip(self.models.len()) {
            let gpu_model = self.upload_model(backend, model)?;
            self.models.push(gpu_model);
        }

        for renderable in scene.geometry().iter().skip(self.objects.len()) {
            let model = self.check_model(renderable.model.0)?;
            let object = self.create_object(backend, model, "Object Uniforms")?;
            self.objects.push(object);
        }

        for emissive in scene.emissives().iter().skip(self.emissives.len()) {
            let model = self.check_model(emissive.model.0)?;
            let object = self.create_object(backend, model, "Emissive Uniforms")?;
            self.emissives.push(object);
        }

        Ok(())
    }

    fn check_model(&self, index: usize) -> RendererResult<usize> {
        if index < self.models.len() {
            Ok(index)
        } else {
            Err(SceneError::UnknownModel(ModelId(index)).into())
        }
    }

    fn create_object(
        &self,
        backend: &mut dyn GraphicsBackend,
        model: usize,
        label: &str,
    ) -> BackendResult<GpuObject> {
        let buffer = backend.create_buffer(&BufferDescriptor::uniform::<ObjectUniforms>(label))?;
        let bind_group =
            backend.create_bind_group(self.object_layout, &[(0, BindGroupEntry::buffer(buffer))])?;
        Ok(GpuObject {
            model,
            buffer,
            bind_group,
        })
    }

    fn upload_model(&self, backend: &mut dyn GraphicsBackend, model: &Model) -> RendererResult<GpuModel> {
        let textures = model
            .textures
            .iter()
            .map(|data| GpuTexture::create(backend, data))
            .collect::<BackendResult<Vec<_>>>()?;

        let mut meshes = Vec::with_capacity(model.meshes.len());
        for model_mesh in &model.meshes {
            let mesh = &model_mesh.mesh;
            let vertex_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} vertices", mesh.name)),
                    size: mesh.vertex_bytes().len() as u64,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                },
                mesh.vertex_bytes(),
            )?;
            let index_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} indices", mesh.name)),
                    size: mesh.index_bytes().len() as u64,
                    usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                },
                mesh.index_bytes(),
            )?;

            let bound: Vec<&GpuTexture> = TEXTURE_ROLES
                .iter()
                .map(|&role| {
                    model_mesh
                        .textures
                        .get(role)
                        .and_then(|i| textures.get(i))
                        .unwrap_or_else(|| self.defaults.get(role))
                })
                .collect();
            let mut entries: Vec<(u32, BindGroupEntry)> = bound
                .iter()
                .enumerate()
                .map(|(i, t)| (i as u32, BindGroupEntry::Texture(t.view)))
                .collect();
            entries.extend(
                bound
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (i as u32 + 4, BindGroupEntry::Sampler(t.sampler))),
            );
            let material = backend.create_bind_group(self.material_layout, &entries)?;

            meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count() as u32,
                material,
            });
        }

        log::debug!(
            "Uploaded model '{}': {} meshes, {} textures",
            model.name,
            meshes.len(),
            textures.len()
        );

        Ok(GpuModel { meshes, textures })
    }

    /// True once per distinct light count above capacity
    fn note_light_overflow(&mut self, count: usize) -> bool {
        if count <= self.max_lights {
            self.overflow_warned = None;
            return false;
        }
        self.overflow_warned.replace(count) != Some(count)
    }

    /// Write camera, parameters, lights and object uniforms for this frame
    pub fn update(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &Scene,
        camera: &Camera,
        aspect: f32,
        mut params: FrameParams,
    ) -> RendererResult<()> {
        let lights = scene.lights();
        if self.note_light_overflow(lights.len()) {
            log::warn!(
                "Scene has {} lights, only the first {} are shaded",
                lights.len(),
                self.max_lights
            );
        }
        let records: Vec<GpuPointLight> = lights
            .iter()
            .take(self.max_lights)
            .map(|l| l.to_gpu())
            .collect();
        if !records.is_empty() {
            backend.write_buffer(self.lights_buffer, 0, bytemuck::cast_slice(&records));
        }
        self.light_count = records.len() as u32;
        params.light_count = self.light_count;

        backend.write_buffer(
            self.camera_buffer,
            0,
            bytemuck::bytes_of(&camera.uniform_data(aspect)),
        );
        backend.write_buffer(self.params_buffer, 0, bytemuck::bytes_of(&params));

        for (renderable, object) in scene.geometry().iter().zip(&self.objects) {
            let uniforms = ObjectUniforms::new(&renderable.transform, Vec3::ZERO);
            backend.write_buffer(object.buffer, 0, bytemuck::bytes_of(&uniforms));
        }

        for (emissive, object) in scene.emissives().iter().zip(&self.emissives) {
            let light = scene.light(emissive.light)?;
            let uniforms = ObjectUniforms::new(&emissive.transform, light.color());
            backend.write_buffer(object.buffer, 0, bytemuck::bytes_of(&uniforms));
        }

        Ok(())
    }

    /// Destroy every resource the scene owns
    pub fn destroy(&mut self, backend: &mut dyn GraphicsBackend) {
        for object in self.objects.drain(..).chain(self.emissives.drain(..)) {
            backend.destroy_bind_group(object.bind_group);
            backend.destroy_buffer(object.buffer);
        }
        for model in self.models.drain(..) {
            for mesh in model.meshes {
                backend.destroy_bind_group(mesh.material);
                backend.destroy_buffer(mesh.vertex_buffer);
                backend.destroy_buffer(mesh.index_buffer);
            }
            for texture in model.textures {
                texture.destroy(backend);
            }
        }
        for role in TEXTURE_ROLES {
            self.defaults.get(role).destroy(backend);
        }
        backend.destroy_bind_group(self.frame_bind_group);
        backend.destroy_buffer(self.camera_buffer);
        backend.destroy_buffer(self.params_buffer);
        backend.destroy_buffer(self.lights_buffer);
        backend.destroy_bind_group_layout(self.frame_layout);
        backend.destroy_bind_group_layout(self.object_layout);
        backend.destroy_bind_group_layout(self.material_layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::Model;
    use crate::scene::{Emissive, PointLight, Renderable, Transform};

    fn demo_scene() -> Scene {
        let mut scene = Scene::new();
        let cube = scene.add_model(Model::cube());
        scene.push_geometry(Renderable::new(cube, Transform::identity())).unwrap();
        let light = scene.push_light(PointLight::new("l", Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), Vec3::Y));
        scene
            .push_emissive(Emissive::new(cube, light, Transform::from_position(Vec3::Y)))
            .unwrap();
        scene
    }

    #[test]
    fn test_sync_is_incremental() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut gpu = GpuScene::new(&mut backend, 4).unwrap();
        let mut scene = demo_scene();

        gpu.sync(&mut backend, &scene).unwrap();
        let after_first = backend.live_resources();
        gpu.sync(&mut backend, &scene).unwrap();
        assert_eq!(backend.live_resources(), after_first);

        let cube = crate::scene::ModelId(0);
        scene.push_geometry(Renderable::new(cube, Transform::identity())).unwrap();
        gpu.sync(&mut backend, &scene).unwrap();
        assert_eq!(gpu.objects().len(), 2);
        assert_eq!(gpu.emissives().len(), 1);
        assert_eq!(backend.live_resources(), after_first + 2);
    }

    #[test]
    fn test_update_writes_emissive_color_and_lights() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut gpu = GpuScene::new(&mut backend, 4).unwrap();
        let scene = demo_scene();
        gpu.sync(&mut backend, &scene).unwrap();
        gpu.update(&mut backend, &scene, &Camera::default(), 1.0, FrameParams::zeroed())
            .unwrap();

        assert_eq!(gpu.light_count(), 1);
        let data = backend.buffer_data(gpu.emissives()[0].buffer).unwrap();
        let uniforms: ObjectUniforms =
            bytemuck::pod_read_unaligned(&data[..std::mem::size_of::<ObjectUniforms>()]);
        assert_eq!(uniforms.color.truncate(), Vec3::new(5.0, 0.0, 0.0));

        let params = backend.buffer_data(gpu.params_buffer).unwrap();
        let params: FrameParams =
            bytemuck::pod_read_unaligned(&params[..std::mem::size_of::<FrameParams>()]);
        assert_eq!(params.light_count, 1);
    }

    #[test]
    fn test_lights_clamped_to_capacity() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut gpu = GpuScene::new(&mut backend, 2).unwrap();
        let mut scene = Scene::new();
        for light in crate::scene::scatter_point_lights(5, 1) {
            scene.push_light(light);
        }
        gpu.update(&mut backend, &scene, &Camera::default(), 1.0, FrameParams::zeroed())
            .unwrap();
        assert_eq!(gpu.light_count(), 2);
    }

    #[test]
    fn test_light_overflow_reported_once_per_count() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut gpu = GpuScene::new(&mut backend, 2).unwrap();
        assert!(!gpu.note_light_overflow(2));
        assert!(gpu.note_light_overflow(5));
        assert!(!gpu.note_light_overflow(5));
        assert!(gpu.note_light_overflow(6));
        assert!(!gpu.note_light_overflow(1));
        assert!(gpu.note_light_overflow(6));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut gpu = GpuScene::new(&mut backend, 4).unwrap();
        gpu.sync(&mut backend, &demo_scene()).unwrap();
        gpu.destroy(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
