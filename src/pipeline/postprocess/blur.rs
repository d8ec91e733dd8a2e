//! Ping-pong Gaussian blur of the bright attachment

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::fullscreen_shader;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Framebuffer, FramebufferOps, FramebufferPipeline};
use bytemuck::{Pod, Zeroable};
use std::any::Any;

/// Gaussian weights for the center tap and four taps on each side
pub const BLUR_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

/// Where one blur iteration reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurSource {
    /// The bright attachment of the HDR target
    Bright,
    /// One of the two ping-pong targets
    Target(usize),
}

/// One iteration of the blur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurStep {
    pub source: BlurSource,
    pub target: usize,
    pub horizontal: bool,
}

/// Iterations alternate direction starting horizontally. Each renders into
/// `targets[horizontal]` and, after the first, reads the other target.
pub fn blur_schedule(iterations: u32) -> Vec<BlurStep> {
    let mut horizontal = true;
    let mut steps = Vec::with_capacity(iterations as usize);
    for i in 0..iterations {
        steps.push(BlurStep {
            source: if i == 0 {
                BlurSource::Bright
            } else {
                BlurSource::Target(!horizontal as usize)
            },
            target: horizontal as usize,
            horizontal,
        });
        horizontal = !horizontal;
    }
    steps
}

/// Target holding the result after `iterations`, or the bright attachment for zero
pub fn blur_output(iterations: u32) -> BlurSource {
    match iterations {
        0 => BlurSource::Bright,
        n => BlurSource::Target((n % 2) as usize),
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlurParams {
    horizontal: u32,
    _pad: [u32; 3],
}

/// Bind group index of a step: (bright, horizontal), (pong, vertical), (ping, horizontal)
fn bind_group_index(step: &BlurStep) -> usize {
    match step.source {
        BlurSource::Bright => 0,
        BlurSource::Target(1) => 1,
        BlurSource::Target(_) => 2,
    }
}

pub struct BlurPass {
    source: ResourceId,
    iterations: u32,
    targets: Vec<ResourceId>,
    framebuffers: Vec<Framebuffer>,
    layout: Option<BindGroupLayoutHandle>,
    sampler: Option<SamplerHandle>,
    params: Vec<BufferHandle>,
    bind_groups: Vec<BindGroupHandle>,
    pipeline: Option<FramebufferPipeline>,
}

impl BlurPass {
    /// Blur `source` (the bright attachment) `iterations` times
    pub fn new(source: ResourceId, iterations: u32) -> Self {
        Self {
            source,
            iterations,
            targets: Vec::new(),
            framebuffers: Vec::new(),
            layout: None,
            sampler: None,
            params: Vec::new(),
            bind_groups: Vec::new(),
            pipeline: None,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Resource holding the blurred result
    pub fn output(&self) -> ResourceId {
        match blur_output(self.iterations) {
            BlurSource::Target(i) => self.targets.get(i).copied().unwrap_or(self.source),
            BlurSource::Bright => self.source,
        }
    }
}

impl RenderPass for BlurPass {
    fn name(&self) -> &str {
        "Blur Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        self.targets.clear();
        if self.iterations == 0 {
            return;
        }

        ctx.read(self.source, ResourceUsage::TextureRead);
        for name in ["blur_ping", "blur_pong"] {
            let target = ctx.create_target(name, TextureFormat::Rgba16Float);
            ctx.write(target, ResourceUsage::RenderTarget);
            self.targets.push(target);
        }
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()> {
        if self.targets.is_empty() {
            return Ok(());
        }

        let bright = ctx.texture(self.source)?;
        let ping = ctx.texture(self.targets[0])?;
        let pong = ctx.texture(self.targets[1])?;
        self.framebuffers = vec![
            Framebuffer::new("Blur Ping", ping.width, ping.height).with_color(ping.view, ping.format),
            Framebuffer::new("Blur Pong", pong.width, pong.height).with_color(pong.view, pong.format),
        ];

        let layout = ctx.backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { filtering: true },
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;
        let sampler = ctx.backend.create_sampler(&SamplerDescriptor {
            label: Some("Blur Sampler".into()),
            ..Default::default()
        })?;

        for horizontal in [true, false] {
            let params = BlurParams {
                horizontal: horizontal as u32,
                _pad: [0; 3],
            };
            let buffer = ctx.backend.create_buffer_init(
                &BufferDescriptor::uniform::<BlurParams>(if horizontal {
                    "Blur Horizontal"
                } else {
                    "Blur Vertical"
                }),
                bytemuck::bytes_of(&params),
            )?;
            self.params.push(buffer);
        }

        let sources = [
            (bright.view, self.params[0]),
            (pong.view, self.params[1]),
            (ping.view, self.params[0]),
        ];
        for (view, params) in sources {
            let bind_group = ctx.backend.create_bind_group(
                layout,
                &[
                    (0, BindGroupEntry::Texture(view)),
                    (1, BindGroupEntry::Sampler(sampler)),
                    (2, BindGroupEntry::buffer(params)),
                ],
            )?;
            self.bind_groups.push(bind_group);
        }

        let pipeline = FramebufferPipeline::create(ctx.backend, &RenderPipelineDescriptor {
            label: Some("Blur Pipeline".into()),
            shader: fullscreen_shader(BLUR_FRAGMENT_SHADER),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: self.framebuffers[0].color_targets(),
        })?;

        self.layout = Some(layout);
        self.sampler = Some(sampler);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };

        for step in blur_schedule(self.iterations) {
            let (Some(framebuffer), Some(&bind_group)) = (
                self.framebuffers.get(step.target),
                self.bind_groups.get(bind_group_index(&step)),
            ) else {
                continue;
            };
            framebuffer.begin(ctx.backend, &FramebufferOps::clear([0.0, 0.0, 0.0, 1.0]), pipeline)?;
            ctx.backend.set_bind_group(0, bind_group);
            ctx.backend.draw(0..3, 0..1);
            ctx.backend.end_render_pass();
        }
        Ok(())
    }

    fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(backend);
        }
        for bind_group in self.bind_groups.drain(..) {
            backend.destroy_bind_group(bind_group);
        }
        for buffer in self.params.drain(..) {
            backend.destroy_buffer(buffer);
        }
        if let Some(sampler) = self.sampler.take() {
            backend.destroy_sampler(sampler);
        }
        if let Some(layout) = self.layout.take() {
            backend.destroy_bind_group_layout(layout);
        }
        self.framebuffers.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Separable 9-tap Gaussian
pub const BLUR_FRAGMENT_SHADER: &str = r#"
struct BlurParams {
    horizontal: u32,
}

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: BlurParams;

var<private> weights: array<f32, 5> = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = 1.0 / vec2<f32>(textureDimensions(source_texture, 0));
    var direction = vec2<f32>(0.0, texel.y);
    if params.horizontal != 0u {
        direction = vec2<f32>(texel.x, 0.0);
    }

    var result = textureSample(source_texture, source_sampler, in.uv).rgb * weights[0];
    for (var i = 1; i < 5; i = i + 1) {
        let offset = direction * f32(i);
        result = result + textureSample(source_texture, source_sampler, in.uv + offset).rgb * weights[i];
        result = result + textureSample(source_texture, source_sampler, in.uv - offset).rgb * weights[i];
    }
    return vec4<f32>(result, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{fragment_outputs, validate_shader};

    #[test]
    fn test_shader_validates() {
        let module = validate_shader("blur", &fullscreen_shader(BLUR_FRAGMENT_SHADER));
        assert_eq!(fragment_outputs(&module), 1);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = BLUR_WEIGHTS[0] + 2.0 * BLUR_WEIGHTS[1..].iter().sum::<f32>();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_schedule_alternates() {
        let steps = blur_schedule(3);
        assert_eq!(
            steps,
            vec![
                BlurStep { source: BlurSource::Bright, target: 1, horizontal: true },
                BlurStep { source: BlurSource::Target(1), target: 0, horizontal: false },
                BlurStep { source: BlurSource::Target(0), target: 1, horizontal: true },
            ]
        );
        let indices: Vec<usize> = steps.iter().map(bind_group_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_output_is_last_written_target() {
        for iterations in 1..12 {
            let last = blur_schedule(iterations).last().map(|s| s.target);
            assert_eq!(blur_output(iterations), BlurSource::Target(last.unwrap()));
        }
        assert_eq!(blur_output(0), BlurSource::Bright);
        assert!(blur_schedule(0).is_empty());
    }
}
