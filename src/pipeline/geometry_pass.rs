//! Geometry pass
//!
//! Rasterizes every renderable into the G-buffer: world position, world normal
//! and albedo with the specular intensity in alpha. Height maps drive
//! parallax-occlusion mapping; normal maps are optional per frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Framebuffer, FramebufferOps, FramebufferPipeline};
use std::any::Any;

/// G-buffer resources written by the geometry pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferTargets {
    pub position: ResourceId,
    pub normal: ResourceId,
    pub albedo_spec: ResourceId,
    pub depth: ResourceId,
}

pub struct GeometryPass {
    targets: Option<GBufferTargets>,
    framebuffer: Option<Framebuffer>,
    pipeline: Option<FramebufferPipeline>,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self {
            targets: None,
            framebuffer: None,
            pipeline: None,
        }
    }

    /// Resources created in setup; `None` until the pass is added to a graph
    pub fn targets(&self) -> Option<GBufferTargets> {
        self.targets
    }
}

impl Default for GeometryPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &str {
        "Geometry Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        let position = ctx.create_target("gbuffer_position", TextureFormat::Rgba16Float);
        let normal = ctx.create_target("gbuffer_normal", TextureFormat::Rgba16Float);
        let albedo_spec = ctx.create_target("gbuffer_albedo_spec", TextureFormat::Rgba16Float);
        // Copied into the HDR depth buffer after lighting
        let depth = ctx.create_texture_relative(
            "gbuffer_depth",
            TextureSize::default(),
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        );

        for target in [position, normal, albedo_spec] {
            ctx.write(target, ResourceUsage::RenderTarget);
        }
        ctx.write(depth, ResourceUsage::DepthStencilWrite);

        self.targets = Some(GBufferTargets {
            position,
            normal,
            albedo_spec,
            depth,
        });
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()> {
        let Some(targets) = self.targets else {
            return Ok(());
        };

        let position = ctx.texture(targets.position)?;
        let normal = ctx.texture(targets.normal)?;
        let albedo_spec = ctx.texture(targets.albedo_spec)?;
        let depth = ctx.texture(targets.depth)?;
        let framebuffer = Framebuffer::new("Geometry Pass", position.width, position.height)
            .with_color(position.view, position.format)
            .with_color(normal.view, normal.format)
            .with_color(albedo_spec.view, albedo_spec.format)
            .with_depth(depth.view, depth.format);

        let pipeline = FramebufferPipeline::create(ctx.backend, &RenderPipelineDescriptor {
            label: Some("Geometry Pipeline".into()),
            shader: GEOMETRY_SHADER.to_string(),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![ctx.gpu.frame_layout, ctx.gpu.object_layout, ctx.gpu.material_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            depth_stencil: framebuffer.depth_state(true, CompareFunction::Less),
            color_targets: framebuffer.color_targets(),
        })?;

        self.pipeline = Some(pipeline);
        self.framebuffer = Some(framebuffer);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let (Some(framebuffer), Some(pipeline)) = (&self.framebuffer, &self.pipeline) else {
            return Ok(());
        };

        framebuffer.begin(ctx.backend, &FramebufferOps::clear([0.0; 4]), pipeline)?;
        ctx.backend.set_bind_group(0, ctx.gpu.frame_bind_group);

        for object in ctx.gpu.objects() {
            let Some(model) = ctx.gpu.model(object.model) else {
                continue;
            };
            ctx.backend.set_bind_group(1, object.bind_group);
            for mesh in &model.meshes {
                ctx.backend.set_bind_group(2, mesh.material);
                mesh.draw(ctx.backend);
            }
        }

        ctx.backend.end_render_pass();
        Ok(())
    }

    fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(backend);
        }
        self.framebuffer = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// G-buffer shader with parallax-occlusion and tangent-space normal mapping
pub const GEOMETRY_SHADER: &str = r#"
struct CameraUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct FrameParams {
    use_normal_map: u32,
    min_layers: f32,
    max_layers: f32,
    height_scale: f32,
    light_count: u32,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(0) @binding(1) var<uniform> params: FrameParams;
@group(1) @binding(0) var<uniform> obj: ObjectUniforms;

@group(2) @binding(0) var diffuse_map: texture_2d<f32>;
@group(2) @binding(1) var specular_map: texture_2d<f32>;
@group(2) @binding(2) var normal_map: texture_2d<f32>;
@group(2) @binding(3) var height_map: texture_2d<f32>;
@group(2) @binding(4) var diffuse_sampler: sampler;
@group(2) @binding(5) var specular_sampler: sampler;
@group(2) @binding(6) var normal_sampler: sampler;
@group(2) @binding(7) var height_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
}

struct GBufferOutput {
    @location(0) position: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) albedo_spec: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = obj.model * vec4<f32>(in.position, 1.0);
    out.world_position = world.xyz;
    out.clip_position = camera.view_proj * world;
    out.uv = in.uv;

    let normal_matrix = mat3x3<f32>(
        obj.normal_matrix[0].xyz,
        obj.normal_matrix[1].xyz,
        obj.normal_matrix[2].xyz,
    );
    let n = normalize(normal_matrix * in.normal);
    var t = normalize(normal_matrix * in.tangent.xyz);
    // Re-orthogonalize against the interpolated normal
    t = normalize(t - dot(t, n) * n);
    out.normal = n;
    out.tangent = t;
    out.bitangent = cross(n, t) * select(1.0, in.tangent.w, in.tangent.w != 0.0);
    return out;
}

fn parallax_uv(uv: vec2<f32>, view_dir: vec3<f32>) -> vec2<f32> {
    // More layers when looking at the surface at a grazing angle
    let num_layers = mix(params.max_layers, params.min_layers, abs(view_dir.z));
    let layer_depth = 1.0 / num_layers;
    let delta_uv = view_dir.xy / max(view_dir.z, 0.05) * params.height_scale / num_layers;

    var current_uv = uv;
    var current_layer = 0.0;
    var current_height = textureSampleLevel(height_map, height_sampler, current_uv, 0.0).r;
    for (var i = 0; i < 64; i = i + 1) {
        if current_layer >= current_height || f32(i) >= num_layers {
            break;
        }
        current_uv = current_uv - delta_uv;
        current_height = textureSampleLevel(height_map, height_sampler, current_uv, 0.0).r;
        current_layer = current_layer + layer_depth;
    }

    // Interpolate between the last two layers
    let previous_uv = current_uv + delta_uv;
    let after = current_height - current_layer;
    let before = textureSampleLevel(height_map, height_sampler, previous_uv, 0.0).r - current_layer + layer_depth;
    let weight = after / (after - before);
    return mix(current_uv, previous_uv, clamp(weight, 0.0, 1.0));
}

@fragment
fn fs_main(in: VertexOutput) -> GBufferOutput {
    // Taken before the parallax loop; the samples below use explicit gradients
    let uv_dx = dpdx(in.uv);
    let uv_dy = dpdy(in.uv);
    let tbn = mat3x3<f32>(normalize(in.tangent), normalize(in.bitangent), normalize(in.normal));
    // TBN is orthonormal, so its transpose takes world space into tangent space
    let world_view = normalize(camera.position.xyz - in.world_position);
    let tangent_view = normalize(world_view * tbn);

    let uv = parallax_uv(in.uv, tangent_view);

    var normal = normalize(in.normal);
    if params.use_normal_map != 0u {
        let sampled = textureSampleGrad(normal_map, normal_sampler, uv, uv_dx, uv_dy).rgb * 2.0 - 1.0;
        normal = normalize(tbn * sampled);
    }

    var out: GBufferOutput;
    out.position = vec4<f32>(in.world_position, 1.0);
    out.normal = vec4<f32>(normal, 1.0);
    out.albedo_spec = vec4<f32>(
        textureSampleGrad(diffuse_map, diffuse_sampler, uv, uv_dx, uv_dy).rgb,
        textureSampleGrad(specular_map, specular_sampler, uv, uv_dx, uv_dy).r,
    );
    return out;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::{fragment_outputs, validate_shader};

    #[test]
    fn test_shader_declares_three_outputs() {
        let module = validate_shader("geometry", GEOMETRY_SHADER);
        assert_eq!(fragment_outputs(&module), 3);
        assert!(GEOMETRY_SHADER.contains("@location(2) albedo_spec"));
    }
}
