//! Deferred Renderer - a render graph-based deferred shading renderer on wgpu
//!
//! # Features
//! - Render graph that validates pass ordering from declared reads and writes
//! - Deferred pipeline: G-buffer, screen-space lighting, emissive light boxes
//! - Ping-pong Gaussian bloom and HDR tonemapping
//! - Parallax-occlusion and normal mapping from glTF materials
//! - Handle-based backend with a recording implementation for GPU-free tests

pub mod backend;
pub mod pipeline;
pub mod render_graph;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod window;

pub use backend::wgpu_backend::WgpuBackend;
pub use pipeline::TonemapOperator;
pub use renderer::{Renderer, RendererError, RendererResult};
pub use window::Window;

/// Configuration for the renderer and its window
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Multiplier applied to HDR color before tonemapping
    pub exposure: f32,
    /// Applied only when the surface format is not sRGB
    pub gamma: f32,
    pub tonemap: TonemapOperator,
    /// Ping-pong blur iterations; 0 blooms the unblurred bright part
    pub blur_iterations: u32,
    /// Add the blurred bright part before tonemapping
    pub bloom: bool,
    /// Lights beyond this are not shaded
    pub max_lights: usize,
    pub clear_color: [f32; 4],
    pub near: f32,
    pub far: f32,
    /// Parallax-occlusion layer counts, blended by view angle
    pub min_layers: f32,
    pub max_layers: f32,
    pub height_scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Renderer".to_string(),
            width: 1920,
            height: 1024,
            vsync: true,
            exposure: 0.01,
            gamma: 2.2,
            tonemap: TonemapOperator::Exposure,
            blur_iterations: 10,
            bloom: true,
            max_lights: 64,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            near: 0.1,
            far: 100.0,
            min_layers: 16.0,
            max_layers: 64.0,
            height_scale: 0.025,
        }
    }
}
