//! Depth blit
//!
//! Copies the G-buffer depth into the HDR depth attachment so emissive boxes
//! are hidden behind lit geometry.

use crate::backend::traits::*;
use crate::render_graph::graph::GraphResult;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::any::Any;

pub struct DepthBlitPass {
    source: ResourceId,
    destination: ResourceId,
}

impl DepthBlitPass {
    pub fn new(source: ResourceId, destination: ResourceId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl RenderPass for DepthBlitPass {
    fn name(&self) -> &str {
        "Depth Blit"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.source, ResourceUsage::CopySrc);
        ctx.write(self.destination, ResourceUsage::CopyDst);
    }

    fn prepare(&mut self, _ctx: &mut PassPrepareContext) -> GraphResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()> {
        let source = ctx.texture(self.source)?;
        let destination = ctx.texture(self.destination)?;
        ctx.backend.copy_texture_to_texture(
            source.texture,
            destination.texture,
            source.width.min(destination.width),
            source.height.min(destination.height),
        )?;
        Ok(())
    }

    fn release(&mut self, _backend: &mut dyn GraphicsBackend) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
