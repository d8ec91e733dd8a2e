//! Composite pass: bloom, tone mapping and gamma onto the swapchain

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::fullscreen_shader;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Framebuffer, FramebufferOps, FramebufferPipeline};
use bytemuck::{Pod, Zeroable};
use std::any::Any;
use std::str::FromStr;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    /// `1 - exp(-hdr * exposure)`
    #[default]
    Exposure,
    Reinhard,
    Aces,
}

impl TonemapOperator {
    fn shader_index(&self) -> u32 {
        match self {
            TonemapOperator::Exposure => 0,
            TonemapOperator::Reinhard => 1,
            TonemapOperator::Aces => 2,
        }
    }
}

impl FromStr for TonemapOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exposure" => Ok(TonemapOperator::Exposure),
            "reinhard" => Ok(TonemapOperator::Reinhard),
            "aces" => Ok(TonemapOperator::Aces),
            other => Err(format!(
                "unknown tonemap operator '{}' (expected exposure, reinhard or aces)",
                other
            )),
        }
    }
}

/// Settings the composite pass can change between frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeSettings {
    pub operator: TonemapOperator,
    pub exposure: f32,
    pub gamma: f32,
    pub bloom: bool,
    pub clear_color: [f32; 4],
}

impl Default for CompositeSettings {
    fn default() -> Self {
        Self {
            operator: TonemapOperator::Exposure,
            exposure: 0.01,
            gamma: 2.2,
            bloom: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct CompositeParams {
    exposure: f32,
    gamma: f32,
    tonemap: u32,
    bloom: u32,
    /// Zero when the surface format already encodes sRGB
    apply_gamma: u32,
    _pad: [u32; 3],
}

pub struct CompositePass {
    scene: ResourceId,
    bloom: ResourceId,
    output: ResourceId,
    settings: CompositeSettings,
    surface_format: TextureFormat,
    layout: Option<BindGroupLayoutHandle>,
    sampler: Option<SamplerHandle>,
    params: Option<BufferHandle>,
    bind_group: Option<BindGroupHandle>,
    pipeline: Option<FramebufferPipeline>,
}

impl CompositePass {
    /// `output` is the external swapchain resource
    pub fn new(scene: ResourceId, bloom: ResourceId, output: ResourceId, settings: CompositeSettings) -> Self {
        Self {
            scene,
            bloom,
            output,
            settings,
            surface_format: TextureFormat::Bgra8UnormSrgb,
            layout: None,
            sampler: None,
            params: None,
            bind_group: None,
            pipeline: None,
        }
    }

    pub fn settings(&self) -> &CompositeSettings {
        &self.settings
    }

    pub fn set_operator(&mut self, operator: TonemapOperator) {
        self.settings.operator = operator;
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.settings.exposure = exposure;
    }

    fn params(&self) -> CompositeParams {
        CompositeParams {
            exposure: self.settings.exposure,
            gamma: self.settings.gamma,
            tonemap: self.settings.operator.shader_index(),
            bloom: self.settings.bloom as u32,
            apply_gamma: !self.surface_format.is_srgb() as u32,
            _pad: [0; 3],
        }
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &str {
        "Composite Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.scene, ResourceUsage::TextureRead);
        if self.bloom != self.scene {
            ctx.read(self.bloom, ResourceUsage::TextureRead);
        }
        ctx.write(self.output, ResourceUsage::RenderTarget);
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()> {
        self.surface_format = ctx.surface_format;
        let scene = ctx.texture(self.scene)?;
        let bloom = ctx.texture(self.bloom)?;

        let texture_entry = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
            },
        };
        let layout = ctx.backend.create_bind_group_layout(&[
            texture_entry(0),
            texture_entry(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { filtering: true },
            },
            BindGroupLayoutEntry {
                binding: 3,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;
        let sampler = ctx.backend.create_sampler(&SamplerDescriptor {
            label: Some("Composite Sampler".into()),
            ..Default::default()
        })?;
        let params = ctx.backend.create_buffer_init(
            &BufferDescriptor::uniform::<CompositeParams>("Composite Params"),
            bytemuck::bytes_of(&self.params()),
        )?;
        let bind_group = ctx.backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(scene.view)),
                (1, BindGroupEntry::Texture(bloom.view)),
                (2, BindGroupEntry::Sampler(sampler)),
                (3, BindGroupEntry::buffer(params)),
            ],
        )?;

        let pipeline = FramebufferPipeline::create(ctx.backend, &RenderPipelineDescriptor {
            label: Some("Composite Pipeline".into()),
            shader: fullscreen_shader(COMPOSITE_FRAGMENT_SHADER),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState {
                format: self.surface_format,
                write_mask: ColorWrites::ALL,
            }],
        })?;

        self.layout = Some(layout);
        self.sampler = Some(sampler);
        self.params = Some(params);
        self.bind_group = Some(bind_group);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let (Some(pipeline), Some(bind_group), Some(params)) = (&self.pipeline, self.bind_group, self.params)
        else {
            return Ok(());
        };

        let view = ctx.external_view(self.output)?;
        ctx.backend.write_buffer(params, 0, bytemuck::bytes_of(&self.params()));

        let framebuffer = Framebuffer::new("Composite Pass", ctx.width, ctx.height)
            .with_color(view, self.surface_format);
        framebuffer.begin(ctx.backend, &FramebufferOps::clear(self.settings.clear_color), pipeline)?;
        ctx.backend.set_bind_group(0, bind_group);
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
        if let Some(params) = self.params.take() {
            backend.destroy_buffer(params);
        }
        if let Some(sampler) = self.sampler.take() {
            backend.destroy_sampler(sampler);
        }
        if let Some(layout) = self.layout.take() {
            backend.destroy_bind_group_layout(layout);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub const COMPOSITE_FRAGMENT_SHADER: &str = r#"
struct CompositeParams {
    exposure: f32,
    gamma: f32,
    tonemap: u32,
    bloom: u32,
    apply_gamma: u32,
}

@group(0) @binding(0) var scene_texture: texture_2d<f32>;
@group(0) @binding(1) var bloom_texture: texture_2d<f32>;
@group(0) @binding(2) var hdr_sampler: sampler;
@group(0) @binding(3) var<uniform> params: CompositeParams;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var hdr = textureSample(scene_texture, hdr_sampler, in.uv).rgb;
    let bloom = textureSample(bloom_texture, hdr_sampler, in.uv).rgb;
    if params.bloom != 0u {
        hdr = hdr + bloom;
    }

    let color = hdr * params.exposure;
    var mapped: vec3<f32>;
    switch params.tonemap {
        case 1u: { mapped = reinhard_tonemap(color); }
        case 2u: { mapped = aces_tonemap(color); }
        default: { mapped = vec3<f32>(1.0) - exp(-color); }
    }

    if params.apply_gamma != 0u {
        mapped = pow(mapped, vec3<f32>(1.0 / params.gamma));
    }
    return vec4<f32>(mapped, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::validate_shader;

    #[test]
    fn test_shader_params_match_uniform() {
        let module = validate_shader("composite", &fullscreen_shader(COMPOSITE_FRAGMENT_SHADER));
        let params = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("CompositeParams"))
            .map(|(_, ty)| &ty.inner);
        let Some(naga::TypeInner::Struct { members, span }) = params else {
            panic!("CompositeParams missing from composite shader");
        };
        let names: Vec<_> = members.iter().filter_map(|m| m.name.as_deref()).collect();
        assert_eq!(names, vec!["exposure", "gamma", "tonemap", "bloom", "apply_gamma"]);
        assert!(*span as usize <= std::mem::size_of::<CompositeParams>());
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!("ACES".parse::<TonemapOperator>(), Ok(TonemapOperator::Aces));
        assert_eq!("exposure".parse::<TonemapOperator>(), Ok(TonemapOperator::Exposure));
        assert!("filmic".parse::<TonemapOperator>().is_err());
    }

    #[test]
    fn test_gamma_only_for_linear_surfaces() {
        let mut pass = CompositePass::new(
            ResourceId(0),
            ResourceId(1),
            ResourceId(2),
            CompositeSettings::default(),
        );
        pass.surface_format = TextureFormat::Bgra8UnormSrgb;
        assert_eq!(pass.params().apply_gamma, 0);
        pass.surface_format = TextureFormat::Bgra8Unorm;
        assert_eq!(pass.params().apply_gamma, 1);
        pass.set_operator(TonemapOperator::Reinhard);
        assert_eq!(pass.params().tonemap, 1);
    }
}
