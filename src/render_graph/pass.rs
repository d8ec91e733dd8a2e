//! Render pass definitions for the render graph

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::{GraphError, GraphResult};
use crate::render_graph::resource::*;
use crate::renderer::GpuScene;
use std::any::Any;
use std::collections::HashMap;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub(crate) u32);

/// Context for setting up pass resources
pub struct PassSetupContext<'a> {
    pub(crate) resources: &'a mut Vec<VirtualResource>,
    pub(crate) inputs: &'a mut Vec<ResourceAccess>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
    pub(crate) next_resource_id: &'a mut u32,
    pub(crate) screen_width: u32,
    pub(crate) screen_height: u32,
}

impl<'a> PassSetupContext<'a> {
    /// Create a new texture resource
    pub fn create_texture(&mut self, name: &str, desc: TextureDescriptor) -> ResourceId {
        let id = ResourceId(*self.next_resource_id);
        *self.next_resource_id += 1;

        self.resources.push(VirtualResource::Texture(VirtualTexture {
            id,
            desc,
            name: name.to_string(),
        }));

        id
    }

    /// Create a texture with size relative to screen
    pub fn create_texture_relative(
        &mut self,
        name: &str,
        size: TextureSize,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> ResourceId {
        let (width, height) = size.resolve(self.screen_width, self.screen_height);

        self.create_texture(
            name,
            TextureDescriptor {
                label: Some(name.to_string()),
                width,
                height,
                format,
                usage,
            },
        )
    }

    /// Create a full-screen render target that later passes can sample
    pub fn create_target(&mut self, name: &str, format: TextureFormat) -> ResourceId {
        self.create_texture_relative(
            name,
            TextureSize::default(),
            format,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
    }

    /// Declare that this pass reads from a resource
    pub fn read(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.inputs.push(ResourceAccess { resource, usage });
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.outputs.push(ResourceAccess { resource, usage });
    }
}

fn lookup(
    pass: &str,
    textures: &HashMap<ResourceId, AllocatedTexture>,
    resource: ResourceId,
) -> GraphResult<AllocatedTexture> {
    textures
        .get(&resource)
        .copied()
        .ok_or_else(|| GraphError::MissingResource {
            pass: pass.to_string(),
            resource,
        })
}

/// Context for creating pipelines and bind groups once resources are allocated
pub struct PassPrepareContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub gpu: &'a GpuScene,
    pub surface_format: TextureFormat,
    pub(crate) pass_name: &'a str,
    pub(crate) textures: &'a HashMap<ResourceId, AllocatedTexture>,
}

impl<'a> PassPrepareContext<'a> {
    /// Get the allocated texture behind a resource
    pub fn texture(&self, resource: ResourceId) -> GraphResult<AllocatedTexture> {
        lookup(self.pass_name, self.textures, resource)
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub gpu: &'a GpuScene,
    pub width: u32,
    pub height: u32,
    pub(crate) pass_name: &'a str,
    pub(crate) textures: &'a HashMap<ResourceId, AllocatedTexture>,
    pub(crate) external_views: &'a HashMap<ResourceId, TextureViewHandle>,
}

impl<'a> PassExecuteContext<'a> {
    /// Get the allocated texture behind a resource
    pub fn texture(&self, resource: ResourceId) -> GraphResult<AllocatedTexture> {
        lookup(self.pass_name, self.textures, resource)
    }

    /// Get the view bound to an external resource this frame
    pub fn external_view(&self, resource: ResourceId) -> GraphResult<TextureViewHandle> {
        self.external_views
            .get(&resource)
            .copied()
            .ok_or_else(|| GraphError::MissingResource {
                pass: self.pass_name.to_string(),
                resource,
            })
    }
}

/// Trait for render passes
///
/// `setup` runs when the pass is added to a graph, `prepare` after the executor has
/// allocated the graph's textures, `execute` once per frame and `release` when the
/// graph is torn down.
pub trait RenderPass: Send + Sync {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Setup phase - declare resources and dependencies
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Create pipelines and bind groups
    fn prepare(&mut self, ctx: &mut PassPrepareContext) -> GraphResult<()>;

    /// Execute phase - record commands
    fn execute(&self, ctx: &mut PassExecuteContext) -> GraphResult<()>;

    /// Destroy everything `prepare` created
    fn release(&mut self, backend: &mut dyn GraphicsBackend);

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Type of render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    /// Graphics render pass
    Graphics,
    /// Transfer/copy pass
    Transfer,
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub pass_type: PassType,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|a| a.resource == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }

    /// Every resource the pass reads or writes
    pub(crate) fn touched(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|a| a.resource)
    }
}
