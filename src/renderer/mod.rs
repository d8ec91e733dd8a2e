//! Frame driver
//!
//! [`Renderer`] owns the backend, the GPU copy of the scene and the deferred
//! render graph, and runs one graph execution per frame.

mod gpu_scene;

pub use gpu_scene::*;

use crate::backend::traits::*;
use crate::pipeline::{build_deferred_graph, CompositePass, DeferredPasses, TonemapOperator};
use crate::render_graph::{CompiledGraph, GraphError, RenderGraph, RenderGraphExecutor};
use crate::resources::ResourceError;
use crate::scene::{Camera, Scene, SceneError};
use crate::RendererConfig;
use thiserror::Error;

/// Renderer error type
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Renderer used after teardown")]
    TornDown,
}

impl RendererError {
    /// Errors after which no further frame can be drawn
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RendererError::TornDown
                | RendererError::Backend(BackendError::OutOfMemory)
                | RendererError::Backend(BackendError::DeviceCreationFailed(_))
                | RendererError::Backend(BackendError::InitializationFailed(_))
        )
    }
}

pub type RendererResult<T> = Result<T, RendererError>;

/// Deferred renderer over any [`GraphicsBackend`]
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    graph: RenderGraph,
    compiled: CompiledGraph,
    executor: RenderGraphExecutor,
    passes: DeferredPasses,
    gpu: GpuScene,
    width: u32,
    height: u32,
    use_normal_map: bool,
    torn_down: bool,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, config: RendererConfig) -> RendererResult<Self> {
        let (width, height) = backend.surface_size();
        let gpu = GpuScene::new(&mut backend, config.max_lights)?;
        let (graph, passes) = build_deferred_graph(width, height, &config)?;
        let compiled = graph.compile()?;

        let mut renderer = Self {
            backend,
            config,
            graph,
            compiled,
            executor: RenderGraphExecutor::new(),
            passes,
            gpu,
            width,
            height,
            use_normal_map: true,
            torn_down: false,
        };
        renderer.allocate()?;

        log::info!(
            "Renderer ready: {}x{}, {:?}, up to {} lights",
            width,
            height,
            renderer.backend.swapchain_format(),
            renderer.config.max_lights
        );
        Ok(renderer)
    }

    /// Allocate graph textures and let passes build their pipelines
    fn allocate(&mut self) -> RendererResult<()> {
        self.executor
            .allocate_resources(&self.graph, &self.compiled, &mut self.backend)?;
        let format = self.backend.swapchain_format();
        self.executor
            .prepare(&mut self.graph, &mut self.backend, &self.gpu, format)?;
        Ok(())
    }

    fn rebuild(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.executor.cleanup(&mut self.graph, &mut self.backend);
        let (graph, passes) = build_deferred_graph(width, height, &self.config)?;
        self.compiled = graph.compile()?;
        self.graph = graph;
        self.passes = passes;
        self.width = width;
        self.height = height;
        self.allocate()
    }

    /// Draw one frame of `scene` as seen from `camera` and present it
    pub fn render_frame(&mut self, scene: &Scene, camera: &Camera) -> RendererResult<()> {
        if self.torn_down {
            return Err(RendererError::TornDown);
        }

        self.gpu.sync(&mut self.backend, scene)?;

        let frame = match self.backend.begin_frame() {
            Ok(frame) => frame,
            Err(BackendError::SurfaceLost) => {
                log::warn!("Surface lost, reconfiguring and skipping this frame");
                let (width, height) = self.backend.surface_size();
                self.backend.resize(width, height);
                return Ok(());
            }
            Err(BackendError::SurfaceTimeout) => {
                log::warn!("Swapchain image not ready, skipping this frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if (frame.width, frame.height) != (self.width, self.height) {
            self.rebuild(frame.width, frame.height)?;
        }

        let aspect = self.width as f32 / self.height.max(1) as f32;
        let params = self.frame_params();
        self.gpu.update(&mut self.backend, scene, camera, aspect, params)?;

        self.executor
            .set_external_view(self.passes.swapchain, frame.swapchain_view);
        self.executor.execute(
            &self.graph,
            &self.compiled,
            &mut self.backend,
            &self.gpu,
            self.width,
            self.height,
        )?;

        self.backend.end_frame()?;
        Ok(())
    }

    fn frame_params(&self) -> FrameParams {
        FrameParams {
            use_normal_map: self.use_normal_map as u32,
            min_layers: self.config.min_layers,
            max_layers: self.config.max_layers,
            height_scale: self.config.height_scale,
            light_count: 0,
            _pad: [0; 3],
        }
    }

    /// Handle window resize; zero sizes (minimized windows) are ignored
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 || self.torn_down {
            return Ok(());
        }
        self.backend.resize(width, height);

        // The surface may clamp to device limits
        let (width, height) = self.backend.surface_size();
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }

        log::debug!("Resizing render targets to {}x{}", width, height);
        self.rebuild(width, height)
    }

    pub fn use_normal_map(&self) -> bool {
        self.use_normal_map
    }

    /// Flip normal mapping, returning the new state
    pub fn toggle_normal_map(&mut self) -> bool {
        self.use_normal_map = !self.use_normal_map;
        log::info!(
            "Normal mapping {}",
            if self.use_normal_map { "enabled" } else { "disabled" }
        );
        self.use_normal_map
    }

    pub fn set_tonemap(&mut self, operator: TonemapOperator) -> RendererResult<()> {
        self.config.tonemap = operator;
        self.graph
            .pass_mut::<CompositePass>(self.passes.composite)?
            .set_operator(operator);
        Ok(())
    }

    pub fn set_exposure(&mut self, exposure: f32) -> RendererResult<()> {
        self.config.exposure = exposure;
        self.graph
            .pass_mut::<CompositePass>(self.passes.composite)?
            .set_exposure(exposure);
        Ok(())
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn passes(&self) -> &DeferredPasses {
        &self.passes
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn gpu_scene(&self) -> &GpuScene {
        &self.gpu
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Destroy every GPU object the renderer created. Safe to call twice.
    pub fn teardown(&mut self) {
        if std::mem::replace(&mut self.torn_down, true) {
            return;
        }
        self.executor.cleanup(&mut self.graph, &mut self.backend);
        self.gpu.destroy(&mut self.backend);
        log::debug!("Renderer torn down");
    }
}

impl<B: GraphicsBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_toggle_normal_map() {
        let mut renderer =
            Renderer::new(RecordingBackend::new(32, 16), RendererConfig::default()).unwrap();
        assert!(renderer.use_normal_map());
        assert!(!renderer.toggle_normal_map());
        assert_eq!(renderer.frame_params().use_normal_map, 0);
        assert!(renderer.toggle_normal_map());
    }

    #[test]
    fn test_resize_ignores_zero_and_same_size() {
        let mut renderer =
            Renderer::new(RecordingBackend::new(32, 16), RendererConfig::default()).unwrap();
        let before = renderer.backend().live_resources();
        renderer.resize(0, 10).unwrap();
        renderer.resize(32, 16).unwrap();
        assert_eq!(renderer.backend().live_resources(), before);

        renderer.resize(64, 64).unwrap();
        assert_eq!(renderer.dimensions(), (64, 64));
        assert_eq!(renderer.backend().live_resources(), before);
    }

    #[test]
    fn test_only_unrecoverable_errors_are_fatal() {
        assert!(RendererError::TornDown.is_fatal());
        assert!(RendererError::Backend(BackendError::OutOfMemory).is_fatal());
        assert!(!RendererError::Backend(BackendError::AcquireImageFailed("busy".into())).is_fatal());
        assert!(!RendererError::Scene(SceneError::UnknownModel(crate::scene::ModelId(3))).is_fatal());
    }

    #[test]
    fn test_render_after_teardown_fails() {
        let mut renderer =
            Renderer::new(RecordingBackend::new(32, 16), RendererConfig::default()).unwrap();
        renderer.teardown();
        renderer.teardown();
        assert_eq!(renderer.backend().live_resources(), 0);
        assert!(matches!(
            renderer.render_frame(&Scene::new(), &Camera::default()),
            Err(RendererError::TornDown)
        ));
    }
}
