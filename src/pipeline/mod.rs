//! Deferred rendering pipeline
//!
//! The frame is a fixed sequence of passes:
//! 1. Geometry pass - renderables into the G-buffer
//! 2. Lighting pass - fullscreen shading into the two HDR attachments
//! 3. Depth blit - G-buffer depth into the HDR depth buffer
//! 4. Emissive pass - light boxes on top of the lit scene
//! 5. Blur pass - ping-pong Gaussian over the bright attachment
//! 6. Composite pass - bloom, tone mapping and gamma onto the swapchain

pub mod depth_blit_pass;
pub mod emissive_pass;
pub mod geometry_pass;
pub mod lighting_pass;
pub mod postprocess;

pub use depth_blit_pass::DepthBlitPass;
pub use emissive_pass::EmissivePass;
pub use geometry_pass::{GBufferTargets, GeometryPass};
pub use lighting_pass::{HdrTargets, LightingPass};
pub use postprocess::{BlurPass, CompositePass, CompositeSettings, TonemapOperator};

use crate::render_graph::{GraphError, GraphResult, PassId, PassType, RenderGraph, ResourceId};
use crate::RendererConfig;

/// Fullscreen triangle; `uv` has its origin at the top left
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// Luminance threshold shared by the lighting and emissive passes
pub const BRIGHT_PART_SHADER: &str = r#"
fn bright_part(color: vec3<f32>) -> vec4<f32> {
    let brightness = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    if brightness > 1.0 {
        return vec4<f32>(color, 1.0);
    }
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
"#;

/// Prepend the fullscreen vertex stage and shared helpers to a fragment shader
pub fn fullscreen_shader(fragment: &str) -> String {
    format!("{}{}{}", FULLSCREEN_VERTEX_SHADER, BRIGHT_PART_SHADER, fragment)
}

/// Pass ids of the deferred graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredPasses {
    pub geometry: PassId,
    pub lighting: PassId,
    pub depth_blit: PassId,
    pub emissive: PassId,
    pub blur: PassId,
    pub composite: PassId,
    /// External resource the composite pass renders into
    pub swapchain: ResourceId,
}

/// Build the deferred render graph for a `width` x `height` surface
pub fn build_deferred_graph(
    width: u32,
    height: u32,
    config: &RendererConfig,
) -> GraphResult<(RenderGraph, DeferredPasses)> {
    let mut graph = RenderGraph::new();
    let swapchain = graph.register_external("swapchain");

    let geometry = graph.add_pass(GeometryPass::new(), PassType::Graphics, width, height);
    let gbuffer = graph
        .pass::<GeometryPass>(geometry)?
        .targets()
        .ok_or(GraphError::UnknownPass(geometry))?;

    let lighting = graph.add_pass(
        LightingPass::new(gbuffer, config.clear_color),
        PassType::Graphics,
        width,
        height,
    );
    let hdr = graph
        .pass::<LightingPass>(lighting)?
        .targets()
        .ok_or(GraphError::UnknownPass(lighting))?;

    let depth_blit = graph.add_pass(
        DepthBlitPass::new(gbuffer.depth, hdr.depth),
        PassType::Transfer,
        width,
        height,
    );
    let emissive = graph.add_pass(EmissivePass::new(hdr), PassType::Graphics, width, height);

    let blur = graph.add_pass(
        BlurPass::new(hdr.bright, config.blur_iterations),
        PassType::Graphics,
        width,
        height,
    );
    let bloom = graph.pass::<BlurPass>(blur)?.output();

    let settings = CompositeSettings {
        operator: config.tonemap,
        exposure: config.exposure,
        gamma: config.gamma,
        bloom: config.bloom,
        clear_color: config.clear_color,
    };
    let composite = graph.add_pass(
        CompositePass::new(hdr.color, bloom, swapchain, settings),
        PassType::Graphics,
        width,
        height,
    );

    log::debug!(
        "Built deferred graph {}x{} with {} blur iterations",
        width,
        height,
        config.blur_iterations
    );

    Ok((
        graph,
        DeferredPasses {
            geometry,
            lighting,
            depth_blit,
            emissive,
            blur,
            composite,
            swapchain,
        },
    ))
}

/// Parse and validate a WGSL module the way wgpu does at pipeline creation
#[cfg(test)]
pub(crate) fn validate_shader(label: &str, source: &str) -> naga::Module {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(e) => panic!("{} failed to parse:\n{}", label, e.emit_to_string(source)),
    };
    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    if let Err(e) = validator.validate(&module) {
        panic!("{} failed validation: {:?}", label, e);
    }
    module
}

/// Number of `@location` outputs of the module's `fs_main`
#[cfg(test)]
pub(crate) fn fragment_outputs(module: &naga::Module) -> usize {
    let Some(result) = module
        .entry_points
        .iter()
        .find(|ep| ep.name == "fs_main")
        .and_then(|ep| ep.function.result.as_ref())
    else {
        return 0;
    };
    match &module.types[result.ty].inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .filter(|m| matches!(m.binding, Some(naga::Binding::Location { .. })))
            .count(),
        _ => usize::from(matches!(result.binding, Some(naga::Binding::Location { .. }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_graph_compiles_in_order() {
        let config = RendererConfig::default();
        let (graph, passes) = build_deferred_graph(64, 32, &config).unwrap();
        let compiled = graph.compile().unwrap();

        assert_eq!(
            compiled.pass_order,
            vec![
                passes.geometry,
                passes.lighting,
                passes.depth_blit,
                passes.emissive,
                passes.blur,
                passes.composite,
            ]
        );
        assert!(compiled.depends_on(passes.lighting, passes.geometry));
        assert!(compiled.depends_on(passes.emissive, passes.depth_blit));
        assert!(compiled.depends_on(passes.emissive, passes.lighting));
        assert!(compiled.depends_on(passes.blur, passes.emissive));
        assert!(compiled.depends_on(passes.composite, passes.blur));
    }

    #[test]
    fn test_zero_blur_iterations_composites_bright_attachment() {
        let config = RendererConfig {
            blur_iterations: 0,
            ..Default::default()
        };
        let (graph, passes) = build_deferred_graph(64, 32, &config).unwrap();
        let hdr = graph
            .pass::<LightingPass>(passes.lighting)
            .unwrap()
            .targets()
            .unwrap();
        assert_eq!(graph.pass::<BlurPass>(passes.blur).unwrap().output(), hdr.bright);
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_fullscreen_shader_has_both_stages() {
        let fragment = "@fragment fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> { return bright_part(vec3<f32>(in.uv, 0.0)); }";
        let module = validate_shader("fullscreen", &fullscreen_shader(fragment));
        let stages: Vec<_> = module.entry_points.iter().map(|ep| (ep.name.as_str(), ep.stage)).collect();
        assert_eq!(
            stages,
            vec![("vs_main", naga::ShaderStage::Vertex), ("fs_main", naga::ShaderStage::Fragment)]
        );
    }

    #[test]
    fn test_every_pass_shader_validates() {
        let shaders = [
            ("geometry", geometry_pass::GEOMETRY_SHADER.to_string(), 3),
            ("lighting", fullscreen_shader(lighting_pass::LIGHTING_FRAGMENT_SHADER), 2),
            (
                "emissive",
                format!("{}{}", BRIGHT_PART_SHADER, emissive_pass::EMISSIVE_SHADER),
                2,
            ),
            ("blur", fullscreen_shader(postprocess::BLUR_FRAGMENT_SHADER), 1),
            ("composite", fullscreen_shader(postprocess::COMPOSITE_FRAGMENT_SHADER), 1),
        ];
        for (label, source, outputs) in shaders {
            let module = validate_shader(label, &source);
            assert_eq!(fragment_outputs(&module), outputs, "{} fragment outputs", label);
        }
    }
}
