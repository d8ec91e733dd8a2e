//! Scene management
//!
//! The scene is an append-only registry: models, geometry objects, point lights
//! and emissive markers are pushed once at startup and drawn every frame in the
//! order they were pushed.

mod camera;
mod camera_controller;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
pub use transform::*;

use crate::resources::Model;
use glam::Vec3;
use thiserror::Error;

/// Scene error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("No light with id {0:?}")]
    UnknownLight(LightId),
    #[error("No model with id {0:?}")]
    UnknownModel(ModelId),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Index of a model registered with [`Scene::add_model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub(crate) usize);

/// Index of a light registered with [`Scene::push_light`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub(crate) usize);

/// A model drawn into the G-buffer
#[derive(Debug, Clone)]
pub struct Renderable {
    pub model: ModelId,
    pub transform: Transform,
}

impl Renderable {
    pub fn new(model: ModelId, transform: Transform) -> Self {
        Self { model, transform }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }
}

/// A model drawn unlit in the color of a point light
#[derive(Debug, Clone)]
pub struct Emissive {
    pub model: ModelId,
    pub light: LightId,
    pub transform: Transform,
}

impl Emissive {
    pub fn new(model: ModelId, light: LightId, transform: Transform) -> Self {
        Self {
            model,
            light,
            transform,
        }
    }
}

/// The scene containing all renderable content
#[derive(Debug, Default)]
pub struct Scene {
    models: Vec<Model>,
    geometry: Vec<Renderable>,
    lights: Vec<PointLight>,
    emissives: Vec<Emissive>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, model: Model) -> ModelId {
        log::debug!("Scene: added model '{}' ({} meshes)", model.name, model.meshes.len());
        self.models.push(model);
        ModelId(self.models.len() - 1)
    }

    /// Add a renderable drawn by the geometry pass; its model must already
    /// be registered
    pub fn push_geometry(&mut self, renderable: Renderable) -> SceneResult<usize> {
        self.model(renderable.model)?;
        self.geometry.push(renderable);
        Ok(self.geometry.len() - 1)
    }

    pub fn push_light(&mut self, light: PointLight) -> LightId {
        self.lights.push(light);
        LightId(self.lights.len() - 1)
    }

    /// Add an emissive; its light and model must already be registered
    pub fn push_emissive(&mut self, emissive: Emissive) -> SceneResult<usize> {
        self.light(emissive.light)?;
        self.model(emissive.model)?;
        self.emissives.push(emissive);
        Ok(self.emissives.len() - 1)
    }

    /// Move a light; the only mutation lights allow
    pub fn set_light_position(&mut self, id: LightId, position: Vec3) -> SceneResult<()> {
        let light = self
            .lights
            .get_mut(id.0)
            .ok_or(SceneError::UnknownLight(id))?;
        light.set_position(position);
        Ok(())
    }

    pub fn model(&self, id: ModelId) -> SceneResult<&Model> {
        self.models.get(id.0).ok_or(SceneError::UnknownModel(id))
    }

    pub fn light(&self, id: LightId) -> SceneResult<&PointLight> {
        self.lights.get(id.0).ok_or(SceneError::UnknownLight(id))
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn geometry(&self) -> &[Renderable] {
        &self.geometry
    }

    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn emissives(&self) -> &[Emissive] {
        &self.emissives
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut scene = Scene::new();
        let cube = scene.add_model(Model::cube());
        for x in [-3.0, 0.0, 3.0] {
            scene
                .push_geometry(Renderable::new(
                    cube,
                    Transform::from_position(Vec3::new(x, 0.0, 0.0)),
                ))
                .unwrap();
        }
        let xs: Vec<f32> = scene.geometry().iter().map(|r| r.position().x).collect();
        assert_eq!(xs, vec![-3.0, 0.0, 3.0]);
    }

    #[test]
    fn test_emissive_needs_known_light() {
        let mut scene = Scene::new();
        let cube = scene.add_model(Model::cube());
        let err = scene
            .push_emissive(Emissive::new(cube, LightId(0), Transform::identity()))
            .unwrap_err();
        assert_eq!(err, SceneError::UnknownLight(LightId(0)));

        let light = scene.push_light(PointLight::new("l", Vec3::ZERO, Vec3::ONE, Vec3::ZERO));
        assert_eq!(
            scene.push_emissive(Emissive::new(cube, light, Transform::identity())),
            Ok(0)
        );
        assert!(matches!(
            scene.push_emissive(Emissive::new(ModelId(7), light, Transform::identity())),
            Err(SceneError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_geometry_needs_known_model() {
        let mut other = Scene::new();
        other.add_model(Model::cube());
        let foreign = other.add_model(Model::cube());

        let mut scene = Scene::new();
        let cube = scene.add_model(Model::cube());
        assert_eq!(
            scene.push_geometry(Renderable::new(foreign, Transform::identity())),
            Err(SceneError::UnknownModel(foreign))
        );
        assert!(scene.geometry().is_empty());
        assert_eq!(scene.push_geometry(Renderable::new(cube, Transform::identity())), Ok(0));
    }

    #[test]
    fn test_set_light_position() {
        let mut scene = Scene::new();
        let id = scene.push_light(PointLight::new("l", Vec3::ZERO, Vec3::ONE, Vec3::ZERO));
        scene.set_light_position(id, Vec3::Y).unwrap();
        assert_eq!(scene.lights()[0].position(), Vec3::Y);
        assert!(scene.set_light_position(LightId(3), Vec3::Y).is_err());
    }
}
