//! Deferred lighting pass
//!
//! Shades the G-buffer with every point light in one fullscreen draw. Writes
//! the lit scene and its over-bright part to the two HDR attachments.

use super::{fullscreen_shader, GBufferTargets};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Framebuffer, FramebufferOps, FramebufferPipeline};
use std::any::Any;

/// HDR resources created by the lighting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrTargets {
    pub color: ResourceId,
    pub bright: ResourceId,
    /// Filled from the G-buffer depth by the depth blit
    pub depth: ResourceId,
}

pub struct LightingPass {
    gbuffer: GBufferTargets,
    clear_color: [f32; 4],
    targets: Option<HdrTargets>,
    framebuffer: Option<Framebuffer>,
    layout: Option<BindGroupLayoutHandle>,
    bind_group: Option<BindGroupHandle>,
    pipeline: Option<FramebufferPipeline>,
}

impl LightingPass {
    pub fn new(gbuffer: GBufferTargets, clear_color: [f32; 4]) -> Self {
        Self {
            gbuffer,
            clear_color,
            targets: None,
            framebuffer: None,
            layout: None,
            bind_group: None,
            pipeline: None,
        }
    }

    pub fn targets(&self) -> Option<HdrTargets> {
        self.targets
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "Lighting Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        for input in [self.gbuffer.position, self.gbuffer.normal, self.gbuffer.albedo_spec] {
            ctx.read(input, ResourceUsage::TextureRead);
        }

        let color = ctx.create_target("hdr_color", TextureFormat::Rgba16Float);
        let bright = ctx.create_target("hdr_bright", TextureFormat::Rgba16Float);
        let depth = ctx.create_texture_relative(
            "hdr_depth",
            TextureSize::default(),
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
        );
        ctx.write(color, ResourceUsage::RenderTarget);
        ctx.write(bright, ResourceUsage::RenderTarget);

        self.targets = Some(HdrTargets { color, bright, depth });
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()> {
        let Some(targets) = self.targets else {
            return Ok(());
        };

        let color = ctx.texture(targets.color)?;
        let bright = ctx.texture(targets.bright)?;
        let framebuffer = Framebuffer::new("Lighting Pass", color.width, color.height)
            .with_color(color.view, color.format)
            .with_color(bright.view, bright.format);

        let mut entries: Vec<BindGroupLayoutEntry> = (0..3)
            .map(|binding| BindGroupLayoutEntry {
                binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                },
            })
            .collect();
        entries.push(BindGroupLayoutEntry {
            binding: 3,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::StorageBuffer { read_only: true },
        });
        let layout = ctx.backend.create_bind_group_layout(&entries)?;

        let position = ctx.texture(self.gbuffer.position)?;
        let normal = ctx.texture(self.gbuffer.normal)?;
        let albedo_spec = ctx.texture(self.gbuffer.albedo_spec)?;
        let bind_group = ctx.backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(position.view)),
                (1, BindGroupEntry::Texture(normal.view)),
                (2, BindGroupEntry::Texture(albedo_spec.view)),
                (3, BindGroupEntry::buffer(ctx.gpu.lights_buffer)),
            ],
        )?;

        let pipeline = FramebufferPipeline::create(ctx.backend, &RenderPipelineDescriptor {
            label: Some("Lighting Pipeline".into()),
            shader: fullscreen_shader(LIGHTING_FRAGMENT_SHADER),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![ctx.gpu.frame_layout, layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: framebuffer.color_targets(),
        })?;

        self.framebuffer = Some(framebuffer);
        self.layout = Some(layout);
        self.bind_group = Some(bind_group);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let (Some(framebuffer), Some(pipeline), Some(bind_group)) =
            (&self.framebuffer, &self.pipeline, self.bind_group)
        else {
            return Ok(());
        };

        framebuffer.begin(ctx.backend, &FramebufferOps::clear(self.clear_color), pipeline)?;
        ctx.backend.set_bind_group(0, ctx.gpu.frame_bind_group);
        ctx.backend.set_bind_group(1, bind_group);
        ctx.backend.draw(0..3, 0..1);
        ctx.backend.end_render_pass();
        Ok(())
    }

    fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(backend);
        }
        if let Some(bind_group) = self.bind_group.take() {
            backend.destroy_bind_group(bind_group);
        }
        if let Some(layout) = self.layout.take() {
            backend.destroy_bind_group_layout(layout);
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

/// Blinn-Phong shading of the G-buffer
pub const LIGHTING_FRAGMENT_SHADER: &str = r#"
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

struct PointLight {
    // xyz = position, w = radius
    position_radius: vec4<f32>,
    // xyz = color, w = linear attenuation
    color_linear: vec4<f32>,
    // xyz = ambient, w = quadratic attenuation
    ambient_quadratic: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(0) @binding(1) var<uniform> params: FrameParams;

@group(1) @binding(0) var gbuffer_position: texture_2d<f32>;
@group(1) @binding(1) var gbuffer_normal: texture_2d<f32>;
@group(1) @binding(2) var gbuffer_albedo_spec: texture_2d<f32>;
@group(1) @binding(3) var<storage, read> lights: array<PointLight>;

struct HdrOutput {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
}

@fragment
fn fs_main(in: VertexOutput) -> HdrOutput {
    let pixel = vec2<i32>(in.position.xy);
    let world_position = textureLoad(gbuffer_position, pixel, 0).xyz;
    let normal_sample = textureLoad(gbuffer_normal, pixel, 0);

    var out: HdrOutput;
    // Nothing was drawn here
    if normal_sample.a == 0.0 {
        out.color = vec4<f32>(0.0, 0.0, 0.0, 1.0);
        out.bright = vec4<f32>(0.0, 0.0, 0.0, 1.0);
        return out;
    }

    let normal = normalize(normal_sample.xyz);
    let albedo_spec = textureLoad(gbuffer_albedo_spec, pixel, 0);
    let albedo = albedo_spec.rgb;
    let specular_strength = albedo_spec.a;

    let view_dir = normalize(camera.position.xyz - world_position);
    let count = min(params.light_count, arrayLength(&lights));

    var lighting = vec3<f32>(0.0);
    for (var i = 0u; i < count; i = i + 1u) {
        let light = lights[i];
        lighting = lighting + light.ambient_quadratic.xyz * albedo;

        let to_light = light.position_radius.xyz - world_position;
        let dist = length(to_light);
        if dist > light.position_radius.w {
            continue;
        }

        let light_dir = to_light / max(dist, 0.0001);
        let color = light.color_linear.xyz;
        let diffuse = max(dot(normal, light_dir), 0.0) * albedo * color;
        let halfway = normalize(light_dir + view_dir);
        let specular = pow(max(dot(normal, halfway), 0.0), 16.0) * specular_strength * color;

        let attenuation = 1.0 / (1.0 + light.color_linear.w * dist
            + light.ambient_quadratic.w * dist * dist);
        lighting = lighting + (diffuse + specular) * attenuation;
    }

    out.color = vec4<f32>(lighting, 1.0);
    out.bright = bright_part(lighting);
    return out;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::{fragment_outputs, validate_shader};

    #[test]
    fn test_shader_uses_bright_threshold() {
        let module = validate_shader("lighting", &fullscreen_shader(LIGHTING_FRAGMENT_SHADER));
        assert!(module.functions.iter().any(|(_, f)| f.name.as_deref() == Some("bright_part")));
        assert_eq!(fragment_outputs(&module), 2);
    }
}
