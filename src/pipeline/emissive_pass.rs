//! Emissive pass
//!
//! Draws the light boxes on top of the lit scene in their light's color. The HDR
//! target is loaded, not cleared, and depth-tested against the blitted G-buffer
//! depth.

use super::{HdrTargets, BRIGHT_PART_SHADER};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::{Framebuffer, FramebufferOps, FramebufferPipeline};
use std::any::Any;

pub struct EmissivePass {
    hdr: HdrTargets,
    framebuffer: Option<Framebuffer>,
    pipeline: Option<FramebufferPipeline>,
}

impl EmissivePass {
    pub fn new(hdr: HdrTargets) -> Self {
        Self {
            hdr,
            framebuffer: None,
            pipeline: None,
        }
    }
}

impl RenderPass for EmissivePass {
    fn name(&self) -> &str {
        "Emissive Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write(self.hdr.color, ResourceUsage::RenderTargetLoad);
        ctx.write(self.hdr.bright, ResourceUsage::RenderTargetLoad);
        ctx.read(self.hdr.depth, ResourceUsage::DepthStencilRead);
        ctx.write(self.hdr.depth, ResourceUsage::DepthStencilWrite);
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()> {
        let color = ctx.texture(self.hdr.color)?;
        let bright = ctx.texture(self.hdr.bright)?;
        let depth = ctx.texture(self.hdr.depth)?;
        let framebuffer = Framebuffer::new("Emissive Pass", color.width, color.height)
            .with_color(color.view, color.format)
            .with_color(bright.view, bright.format)
            .with_depth(depth.view, depth.format);

        let pipeline = FramebufferPipeline::create(ctx.backend, &RenderPipelineDescriptor {
            label: Some("Emissive Pipeline".into()),
            shader: format!("{}{}", BRIGHT_PART_SHADER, EMISSIVE_SHADER),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![ctx.gpu.frame_layout, ctx.gpu.object_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            depth_stencil: framebuffer.depth_state(true, CompareFunction::Less),
            color_targets: framebuffer.color_targets(),
        })?;

        self.framebuffer = Some(framebuffer);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let (Some(framebuffer), Some(pipeline)) = (&self.framebuffer, &self.pipeline) else {
            return Ok(());
        };

        framebuffer.begin(ctx.backend, &FramebufferOps::load(), pipeline)?;
        ctx.backend.set_bind_group(0, ctx.gpu.frame_bind_group);

        for emissive in ctx.gpu.emissives() {
            let Some(model) = ctx.gpu.model(emissive.model) else {
                continue;
            };
            ctx.backend.set_bind_group(1, emissive.bind_group);
            for mesh in &model.meshes {
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

/// Flat light-colored boxes
pub const EMISSIVE_SHADER: &str = r#"
struct CameraUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(1) @binding(0) var<uniform> obj: ObjectUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct HdrOutput {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
    return camera.view_proj * obj.model * vec4<f32>(in.position, 1.0);
}

@fragment
fn fs_main() -> HdrOutput {
    var out: HdrOutput;
    out.color = vec4<f32>(obj.color.rgb, 1.0);
    out.bright = bright_part(obj.color.rgb);
    return out;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{fragment_outputs, validate_shader};

    #[test]
    fn test_shader_writes_color_and_bright() {
        let module = validate_shader("emissive", &format!("{}{}", BRIGHT_PART_SHADER, EMISSIVE_SHADER));
        assert_eq!(fragment_outputs(&module), 2);
    }
}
