//! Deferred shading demo
//!
//! Nine cubes lit by a seeded scatter of colored point lights, each drawn as a
//! small emissive box, with bloom and exposure tonemapping.
//!
//! Run with:
//!   cargo run --example deferred_demo
//!   cargo run --example deferred_demo -- --lights 32 --tonemap aces
//!   cargo run --example deferred_demo -- --model path/to/model.gltf
//!
//! Controls:
//!   WASD        - Move camera
//!   Space/Ctrl  - Move up/down
//!   Shift       - Sprint (8x speed)
//!   Mouse       - Look around
//!   Scroll      - Zoom
//!   T           - Toggle normal mapping
//!   Escape      - Exit

use clap::Parser;
use deferred_renderer::{
    resources::Model,
    scene::{scatter_point_lights, Camera, Emissive, FlyController, Renderable, Scene, Transform},
    window::{self, Window},
    Renderer, RendererConfig, TonemapOperator, WgpuBackend,
};
use glam::Vec3;
use std::path::PathBuf;
use winit::keyboard::KeyCode;

#[derive(Parser, Debug)]
#[command(name = "deferred_demo", about = "Deferred shading with bloom")]
struct Args {
    /// Window width
    #[arg(long, default_value = "1920")]
    width: u32,

    /// Window height
    #[arg(long, default_value = "1024")]
    height: u32,

    /// Exposure applied before tonemapping
    #[arg(long, default_value = "0.01")]
    exposure: f32,

    /// Gaussian blur iterations for bloom
    #[arg(long, default_value = "10")]
    blur_iterations: u32,

    /// Number of point lights
    #[arg(long, default_value = "16")]
    lights: usize,

    /// Seed for light placement and colors
    #[arg(long, default_value = "13")]
    seed: u32,

    /// glTF model used instead of the cube
    #[arg(long)]
    model: Option<PathBuf>,

    /// Disable vsync
    #[arg(long)]
    no_vsync: bool,

    /// Tonemapping operator: exposure, reinhard or aces
    #[arg(long, default_value = "exposure")]
    tonemap: TonemapOperator,
}

fn build_scene(args: &Args) -> Result<Scene, Box<dyn std::error::Error>> {
    let mut scene = Scene::new();

    let cube = scene.add_model(Model::cube());
    let object_model = match &args.model {
        Some(path) => {
            log::info!("Loading model {}", path.display());
            scene.add_model(Model::load_gltf(path)?)
        }
        None => cube,
    };

    for x in [-3.0, 0.0, 3.0] {
        for z in [-3.0, 0.0, 3.0] {
            let transform = Transform::from_position(Vec3::new(x, -0.5, z));
            scene.push_geometry(Renderable::new(object_model, transform))?;
        }
    }

    for light in scatter_point_lights(args.lights, args.seed) {
        let transform = Transform::from_position(light.position()).with_scale(Vec3::splat(0.25));
        let id = scene.push_light(light);
        scene.push_emissive(Emissive::new(cube, id, transform))?;
    }

    log::info!(
        "Scene: {} objects, {} lights",
        scene.geometry().len(),
        scene.lights().len()
    );
    Ok(scene)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RendererConfig {
        width: args.width,
        height: args.height,
        vsync: !args.no_vsync,
        exposure: args.exposure,
        tonemap: args.tonemap,
        blur_iterations: args.blur_iterations,
        max_lights: args.lights.max(1),
        ..Default::default()
    };

    let scene = build_scene(&args)?;

    let event_loop = window::create_event_loop()?;
    let window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;

    let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0)).with_clip_planes(config.near, config.far);
    let mut controller = FlyController::new();
    let mut renderer = Renderer::new(backend, config)?;

    window::run(event_loop, window, move |window| {
        if window.was_resized() {
            let (width, height) = window.dimensions();
            if let Err(e) = renderer.resize(width, height) {
                log::error!("Resize failed: {}", e);
                return false;
            }
            window.clear_resize_flag();
        }

        if window.input.take_pressed(KeyCode::KeyT) {
            renderer.toggle_normal_map();
        }

        let input = window.input.take_camera_input();
        controller.update(&mut camera, &input, window.delta_time());

        match renderer.render_frame(&scene, &camera) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Frame failed: {}", e);
                !e.is_fatal()
            }
        }
    })?;

    Ok(())
}
