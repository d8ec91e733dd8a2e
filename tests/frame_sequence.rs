//! Drives whole frames through the recording backend and checks the pass sequence

use deferred_renderer::backend::{Command, LoadOp, RecordingBackend, TextureFormat};
use deferred_renderer::resources::Model;
use deferred_renderer::scene::{
    scatter_point_lights, Camera, Emissive, Renderable, Scene, Transform,
};
use deferred_renderer::{Renderer, RendererConfig, RendererError};
use glam::Vec3;

fn demo_scene(lights: usize) -> Scene {
    let mut scene = Scene::new();
    let cube = scene.add_model(Model::cube());
    for x in [-3.0, 0.0, 3.0] {
        for z in [-3.0, 0.0, 3.0] {
            scene
                .push_geometry(Renderable::new(
                    cube,
                    Transform::from_position(Vec3::new(x, -0.5, z)),
                ))
                .unwrap();
        }
    }
    for light in scatter_point_lights(lights, 13) {
        let transform = Transform::from_position(light.position()).with_scale(Vec3::splat(0.25));
        let id = scene.push_light(light);
        scene.push_emissive(Emissive::new(cube, id, transform)).unwrap();
    }
    scene
}

fn renderer(config: RendererConfig) -> Renderer<RecordingBackend> {
    Renderer::new(RecordingBackend::new(160, 90), config).unwrap()
}

fn count_draws(commands: &[&Command]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, Command::DrawIndexed { .. }))
        .count()
}

fn position_of(commands: &[Command], predicate: impl Fn(&Command) -> bool) -> usize {
    commands.iter().position(predicate).unwrap()
}

#[test]
fn test_passes_run_in_fixed_order() {
    let mut renderer = renderer(RendererConfig::default());
    let scene = demo_scene(4);
    renderer.render_frame(&scene, &Camera::default()).unwrap();

    let mut expected = vec!["Geometry Pass", "Lighting Pass", "Emissive Pass"];
    for i in 0..10 {
        expected.push(if i % 2 == 0 { "Blur Pong" } else { "Blur Ping" });
    }
    expected.push("Composite Pass");
    assert_eq!(renderer.backend().pass_labels(), expected);

    let commands = renderer.backend().commands();
    assert_eq!(commands.first(), Some(&Command::BeginFrame));
    assert_eq!(commands.last(), Some(&Command::EndFrame));
}

#[test]
fn test_depth_is_copied_between_lighting_and_emissive() {
    let mut renderer = renderer(RendererConfig::default());
    renderer.render_frame(&demo_scene(2), &Camera::default()).unwrap();
    let commands = renderer.backend().commands();

    let is_begin = |label: &'static str| {
        move |c: &Command| matches!(c, Command::BeginPass { label: Some(l), .. } if l == label)
    };
    let lighting = position_of(commands, is_begin("Lighting Pass"));
    let copy = position_of(commands, |c| matches!(c, Command::CopyTexture { .. }));
    let emissive = position_of(commands, is_begin("Emissive Pass"));
    assert!(lighting < copy && copy < emissive);

    let Command::CopyTexture { src, dst, width, height } = &commands[copy] else {
        unreachable!()
    };
    assert_eq!((*width, *height), (160, 90));
    let backend = renderer.backend();
    assert_eq!(backend.texture(*src).unwrap().format, TextureFormat::Depth32Float);
    assert_eq!(backend.texture(*dst).unwrap().format, TextureFormat::Depth32Float);
}

#[test]
fn test_geometry_and_emissive_draw_every_object() {
    let mut renderer = renderer(RendererConfig::default());
    renderer.render_frame(&demo_scene(5), &Camera::default()).unwrap();
    let backend = renderer.backend();

    let geometry = backend.pass_commands("Geometry Pass");
    assert_eq!(count_draws(&geometry), 9);
    match geometry[0] {
        Command::BeginPass {
            color_views,
            color_loads,
            depth_view,
            ..
        } => {
            assert_eq!(color_views.len(), 3);
            assert!(color_loads.iter().all(|l| matches!(l, LoadOp::Clear(_))));
            assert!(depth_view.is_some());
        }
        other => panic!("expected BeginPass, got {:?}", other),
    }

    let emissive = backend.pass_commands("Emissive Pass");
    assert_eq!(count_draws(&emissive), 5);
    match emissive[0] {
        Command::BeginPass {
            color_views,
            color_loads,
            depth_load,
            ..
        } => {
            assert_eq!(color_views.len(), 2);
            assert!(color_loads.iter().all(|l| *l == LoadOp::Load));
            assert_eq!(depth_load, &Some(LoadOp::Load));
        }
        other => panic!("expected BeginPass, got {:?}", other),
    }
}

#[test]
fn test_lighting_and_composite_are_fullscreen_triangles() {
    let mut renderer = renderer(RendererConfig::default());
    renderer.render_frame(&demo_scene(3), &Camera::default()).unwrap();
    let backend = renderer.backend();

    for label in ["Lighting Pass", "Composite Pass"] {
        let commands = backend.pass_commands(label);
        assert!(commands.contains(&&Command::Draw {
            vertices: 0..3,
            instances: 0..1
        }));
    }

    let composite = backend.pass_commands("Composite Pass");
    match composite[0] {
        Command::BeginPass { color_views, .. } => {
            assert_eq!(color_views, &vec![backend.swapchain_view().unwrap()]);
        }
        other => panic!("expected BeginPass, got {:?}", other),
    }
}

#[test]
fn test_zero_blur_iterations_skips_blur() {
    let mut renderer = renderer(RendererConfig {
        blur_iterations: 0,
        ..Default::default()
    });
    renderer.render_frame(&demo_scene(2), &Camera::default()).unwrap();
    assert_eq!(
        renderer.backend().pass_labels(),
        vec!["Geometry Pass", "Lighting Pass", "Emissive Pass", "Composite Pass"]
    );
}

#[test]
fn test_lights_beyond_capacity_are_dropped() {
    let mut renderer = renderer(RendererConfig {
        max_lights: 4,
        ..Default::default()
    });
    renderer.render_frame(&demo_scene(7), &Camera::default()).unwrap();
    assert_eq!(renderer.gpu_scene().light_count(), 4);
    // Emissive boxes are still drawn for every light
    assert_eq!(count_draws(&renderer.backend().pass_commands("Emissive Pass")), 7);
}

#[test]
fn test_surface_lost_skips_frame() {
    let mut renderer = renderer(RendererConfig::default());
    let scene = demo_scene(2);

    renderer.backend_mut().lose_surface();
    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert!(renderer.backend().pass_labels().is_empty());

    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert_eq!(renderer.backend().pass_labels().len(), 14);
}

#[test]
fn test_surface_timeout_skips_frame() {
    let mut renderer = renderer(RendererConfig::default());
    let scene = demo_scene(2);

    renderer.backend_mut().time_out_surface();
    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert!(renderer.backend().commands().is_empty());
    assert_eq!(renderer.dimensions(), (160, 90));

    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert_eq!(renderer.backend().pass_labels().len(), 14);
}

#[test]
fn test_scene_growth_between_frames() {
    let mut renderer = renderer(RendererConfig::default());
    let mut scene = demo_scene(1);
    renderer.render_frame(&scene, &Camera::default()).unwrap();

    let cube = scene.geometry()[0].model;
    scene
        .push_geometry(Renderable::new(cube, Transform::from_position(Vec3::Y)))
        .unwrap();
    renderer.backend_mut().clear_commands();
    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert_eq!(count_draws(&renderer.backend().pass_commands("Geometry Pass")), 10);
}

#[test]
fn test_resize_then_teardown_releases_everything() {
    let mut renderer = renderer(RendererConfig::default());
    let scene = demo_scene(3);
    renderer.render_frame(&scene, &Camera::default()).unwrap();

    renderer.resize(320, 200).unwrap();
    renderer.render_frame(&scene, &Camera::default()).unwrap();
    assert_eq!(renderer.dimensions(), (320, 200));

    renderer.teardown();
    assert_eq!(renderer.backend().live_resources(), 0);
    assert!(matches!(
        renderer.render_frame(&scene, &Camera::default()),
        Err(RendererError::TornDown)
    ));
}

#[test]
fn test_pipelines_match_framebuffer_targets() {
    let backend = RecordingBackend::new(160, 90).with_format(TextureFormat::Bgra8Unorm);
    let mut renderer = Renderer::new(backend, RendererConfig::default()).unwrap();
    renderer.render_frame(&demo_scene(2), &Camera::default()).unwrap();
    let backend = renderer.backend();

    let bound_pipeline = |label: &str| {
        backend
            .pass_commands(label)
            .into_iter()
            .find_map(|c| match c {
                Command::SetPipeline(handle) => backend.pipeline(*handle),
                _ => None,
            })
            .unwrap()
    };

    assert_eq!(bound_pipeline("Geometry Pass").color_targets.len(), 3);
    assert_eq!(bound_pipeline("Lighting Pass").color_targets.len(), 2);
    assert_eq!(bound_pipeline("Emissive Pass").color_targets.len(), 2);
    let composite = bound_pipeline("Composite Pass");
    assert_eq!(composite.color_targets.len(), 1);
    assert_eq!(composite.color_targets[0].format, TextureFormat::Bgra8Unorm);
}
