//! Render graph definition and compilation

use crate::backend::traits::{BackendError, GraphicsBackend};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::FramebufferError;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Render graph error type
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Pass '{pass}' reads '{resource}' before any pass writes it")]
    UnwrittenRead { pass: String, resource: String },
    #[error("No pass of the requested type at {0:?}")]
    UnknownPass(PassId),
    #[error("Pass '{pass}' has no allocated resource {resource}")]
    MissingResource { pass: String, resource: ResourceId },
    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// The main render graph structure
///
/// Passes run in insertion order. Resource declarations only validate that
/// order: compiling fails if a pass reads something no earlier pass wrote.
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    next_pass_id: u32,
    next_resource_id: u32,

    // External resources (like swapchain)
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            next_pass_id: 0,
            next_resource_id: 0,
        }
    }

    /// Register an external resource (like swapchain image)
    pub fn register_external(&mut self, name: &str) -> ResourceId {
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.push(VirtualResource::External {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass + 'static>(
        &mut self,
        pass: P,
        pass_type: PassType,
        screen_width: u32,
        screen_height: u32,
    ) -> PassId {
        let id = PassId(self.next_pass_id);
        self.next_pass_id += 1;

        let name = pass.name().to_string();
        let mut boxed_pass = Box::new(pass);

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        {
            let mut ctx = PassSetupContext {
                resources: &mut self.resources,
                inputs: &mut inputs,
                outputs: &mut outputs,
                next_resource_id: &mut self.next_resource_id,
                screen_width,
                screen_height,
            };
            boxed_pass.setup(&mut ctx);
        }

        log::debug!(
            "Render graph: added pass '{}' ({} reads, {} writes)",
            name,
            inputs.len(),
            outputs.len()
        );

        self.passes.push(boxed_pass);
        self.pass_nodes.push(PassNode {
            id,
            name,
            pass_type,
            inputs,
            outputs,
        });

        id
    }

    fn resource_name(&self, id: ResourceId) -> String {
        self.resources
            .iter()
            .find(|r| r.id() == id)
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn is_external(&self, id: ResourceId) -> bool {
        self.resources
            .iter()
            .any(|r| r.id() == id && r.is_external())
    }

    /// Compile the graph - validate ordering and plan resource lifetimes
    pub fn compile(&self) -> GraphResult<CompiledGraph> {
        let mut dependencies: HashMap<PassId, Vec<PassId>> = HashMap::new();

        for (index, node) in self.pass_nodes.iter().enumerate() {
            let earlier = &self.pass_nodes[..index];

            // Loaded attachments are declared as writes but read previous contents
            let reads = node.inputs.iter().chain(node.outputs.iter()).filter(|a| a.is_read());
            for input in reads {
                if self.is_external(input.resource) {
                    continue;
                }
                if !earlier.iter().any(|w| w.writes_resource(input.resource)) {
                    return Err(GraphError::UnwrittenRead {
                        pass: node.name.clone(),
                        resource: self.resource_name(input.resource),
                    });
                }
            }

            // Earlier writers of anything this pass touches, and earlier readers of
            // anything it overwrites
            let mut deps = BTreeSet::new();
            for resource in node.touched() {
                for other in earlier {
                    if other.writes_resource(resource)
                        || (node.writes_resource(resource) && other.reads_resource(resource))
                    {
                        deps.insert(other.id.0);
                    }
                }
            }
            dependencies.insert(node.id, deps.into_iter().map(PassId).collect());
        }

        let pass_order: Vec<PassId> = self.pass_nodes.iter().map(|n| n.id).collect();

        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();
        for (order, node) in self.pass_nodes.iter().enumerate() {
            for resource in node.touched() {
                let lifetime = resource_lifetimes.entry(resource).or_insert(ResourceLifetime {
                    first_use: order,
                    last_use: order,
                });
                lifetime.last_use = order;
            }
        }

        Ok(CompiledGraph {
            pass_order,
            dependencies,
            resource_lifetimes,
        })
    }

    /// Get all passes
    pub fn passes(&self) -> &[Box<dyn RenderPass>] {
        &self.passes
    }

    /// Get mutable passes
    pub fn passes_mut(&mut self) -> &mut [Box<dyn RenderPass>] {
        &mut self.passes
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        let index = self.pass_nodes.iter().position(|n| n.id == id)?;
        Some(self.passes[index].as_ref())
    }

    /// Get a pass by ID as its concrete type
    pub fn pass<P: RenderPass + 'static>(&self, id: PassId) -> GraphResult<&P> {
        self.get_pass(id)
            .and_then(|p| p.as_any().downcast_ref::<P>())
            .ok_or(GraphError::UnknownPass(id))
    }

    /// Get a pass by ID as its concrete type, mutably
    pub fn pass_mut<P: RenderPass + 'static>(&mut self, id: PassId) -> GraphResult<&mut P> {
        let index = self
            .pass_nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(GraphError::UnknownPass(id))?;
        self.passes[index]
            .as_any_mut()
            .downcast_mut::<P>()
            .ok_or(GraphError::UnknownPass(id))
    }

    /// Release every pass's pipelines and bind groups
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        for pass in &mut self.passes {
            pass.release(backend);
        }
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    /// Earlier passes each pass must run after
    pub dependencies: HashMap<PassId, Vec<PassId>>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }

    pub fn depends_on(&self, pass: PassId, on: PassId) -> bool {
        self.dependencies
            .get(&pass)
            .is_some_and(|deps| deps.contains(&on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::TextureFormat;
    use std::any::Any;

    /// Pass that only declares resources
    struct DeclarePass {
        name: &'static str,
        creates: Vec<&'static str>,
        reads: Vec<ResourceId>,
        writes: Vec<ResourceId>,
        created: Vec<ResourceId>,
    }

    impl DeclarePass {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                creates: Vec::new(),
                reads: Vec::new(),
                writes: Vec::new(),
                created: Vec::new(),
            }
        }
    }

    impl RenderPass for DeclarePass {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, ctx: &mut PassSetupContext) {
            for name in &self.creates {
                let id = ctx.create_target(name, TextureFormat::Rgba16Float);
                ctx.write(id, ResourceUsage::RenderTarget);
                self.created.push(id);
            }
            for &id in &self.reads {
                ctx.read(id, ResourceUsage::TextureRead);
            }
            for &id in &self.writes {
                ctx.write(id, ResourceUsage::RenderTarget);
            }
        }

        fn prepare(&mut self, _ctx: &mut PassPrepareContext) -> GraphResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &mut PassExecuteContext) -> GraphResult<()> {
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

    fn produce(graph: &mut RenderGraph, name: &'static str) -> (PassId, ResourceId) {
        let mut pass = DeclarePass::new(name);
        pass.creates.push(name);
        let id = graph.add_pass(pass, PassType::Graphics, 64, 64);
        let resource = graph.pass::<DeclarePass>(id).unwrap().created[0];
        (id, resource)
    }

    #[test]
    fn test_reads_follow_writes() {
        let mut graph = RenderGraph::new();
        let (producer, color) = produce(&mut graph, "color");

        let mut consumer = DeclarePass::new("consumer");
        consumer.reads.push(color);
        let consumer = graph.add_pass(consumer, PassType::Graphics, 64, 64);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![producer, consumer]);
        assert!(compiled.depends_on(consumer, producer));
        assert!(compiled.is_resource_alive(color, 1));
    }

    #[test]
    fn test_read_before_write_is_rejected() {
        let mut graph = RenderGraph::new();
        // The first resource the graph creates gets id 0
        let mut reader = DeclarePass::new("early_reader");
        reader.reads.push(ResourceId(0));
        graph.add_pass(reader, PassType::Graphics, 64, 64);
        produce(&mut graph, "color");

        match graph.compile() {
            Err(GraphError::UnwrittenRead { pass, resource }) => {
                assert_eq!(pass, "early_reader");
                assert_eq!(resource, "color");
            }
            other => panic!("expected UnwrittenRead, got {:?}", other.map(|c| c.pass_order)),
        }
    }

    #[test]
    fn test_external_reads_are_allowed() {
        let mut graph = RenderGraph::new();
        let swapchain = graph.register_external("swapchain");
        let mut pass = DeclarePass::new("present");
        pass.reads.push(swapchain);
        graph.add_pass(pass, PassType::Graphics, 64, 64);
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_downcast_to_wrong_type_fails() {
        struct OtherPass;
        impl RenderPass for OtherPass {
            fn name(&self) -> &str {
                "other"
            }
            fn setup(&mut self, _ctx: &mut PassSetupContext) {}
            fn prepare(&mut self, _ctx: &mut PassPrepareContext) -> GraphResult<()> {
                Ok(())
            }
            fn execute(&self, _ctx: &mut PassExecuteContext) -> GraphResult<()> {
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

        let mut graph = RenderGraph::new();
        let id = graph.add_pass(OtherPass, PassType::Graphics, 64, 64);
        assert!(matches!(
            graph.pass::<DeclarePass>(id),
            Err(GraphError::UnknownPass(_))
        ));
    }
}
