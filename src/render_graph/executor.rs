//! Render graph executor

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::renderer::GpuScene;
use std::collections::HashMap;

/// Executor for running the compiled render graph
pub struct RenderGraphExecutor {
    /// Allocated textures mapped by resource ID
    allocated_textures: HashMap<ResourceId, AllocatedTexture>,

    /// External texture views (like swapchain)
    external_views: HashMap<ResourceId, TextureViewHandle>,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self {
            allocated_textures: HashMap::new(),
            external_views: HashMap::new(),
        }
    }

    /// Set an external texture view (e.g., swapchain image)
    pub fn set_external_view(&mut self, resource: ResourceId, view: TextureViewHandle) {
        self.external_views.insert(resource, view);
    }

    /// Texture allocated for a resource, if any
    pub fn texture(&self, resource: ResourceId) -> Option<AllocatedTexture> {
        self.allocated_textures.get(&resource).copied()
    }

    /// Allocate the textures the compiled graph uses
    pub fn allocate_resources(
        &mut self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<()> {
        for resource in graph.resources() {
            match resource {
                VirtualResource::Texture(tex) => {
                    if self.allocated_textures.contains_key(&tex.id) {
                        continue;
                    }
                    if !compiled.resource_lifetimes.contains_key(&tex.id) {
                        log::debug!("Render graph: '{}' is never used, not allocating", tex.name);
                        continue;
                    }
                    let texture = backend.create_texture(&tex.desc)?;
                    let view = backend.create_texture_view(texture)?;
                    log::trace!(
                        "Render graph: allocated '{}' {}x{} {:?}",
                        tex.name,
                        tex.desc.width,
                        tex.desc.height,
                        tex.desc.format
                    );
                    self.allocated_textures.insert(
                        tex.id,
                        AllocatedTexture {
                            texture,
                            view,
                            format: tex.desc.format,
                            width: tex.desc.width,
                            height: tex.desc.height,
                        },
                    );
                }
                VirtualResource::External { .. } => {
                    // External resources are set via set_external_view
                }
            }
        }

        Ok(())
    }

    /// Let every pass create its pipelines and bind groups
    pub fn prepare(
        &self,
        graph: &mut RenderGraph,
        backend: &mut dyn GraphicsBackend,
        gpu: &GpuScene,
        surface_format: TextureFormat,
    ) -> GraphResult<()> {
        for pass in graph.passes_mut() {
            let name = pass.name().to_string();
            let mut ctx = PassPrepareContext {
                backend: &mut *backend,
                gpu,
                surface_format,
                pass_name: &name,
                textures: &self.allocated_textures,
            };
            pass.prepare(&mut ctx)?;
        }
        Ok(())
    }

    /// Execute the render graph
    pub fn execute(
        &self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut dyn GraphicsBackend,
        gpu: &GpuScene,
        width: u32,
        height: u32,
    ) -> GraphResult<()> {
        for &pass_id in &compiled.pass_order {
            let Some(pass) = graph.get_pass(pass_id) else {
                return Err(GraphError::UnknownPass(pass_id));
            };
            log::trace!("Render graph: executing '{}'", pass.name());

            let mut ctx = PassExecuteContext {
                backend: &mut *backend,
                gpu,
                width,
                height,
                pass_name: pass.name(),
                textures: &self.allocated_textures,
                external_views: &self.external_views,
            };

            pass.execute(&mut ctx)?;
        }
        Ok(())
    }

    /// Release pass objects and destroy allocated textures
    pub fn cleanup(&mut self, graph: &mut RenderGraph, backend: &mut dyn GraphicsBackend) {
        graph.release(backend);

        for (_, allocated) in self.allocated_textures.drain() {
            backend.destroy_texture_view(allocated.view);
            backend.destroy_texture(allocated.texture);
        }

        self.external_views.clear();
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}
