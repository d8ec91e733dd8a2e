//! Framebuffers: a fixed set of render attachments opened as one render pass

use crate::backend::traits::*;
use crate::backend::types::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FramebufferError {
    #[error("framebuffer '{label}' has {attachments} color attachments but the pipeline writes {targets}")]
    AttachmentMismatch {
        label: String,
        attachments: usize,
        targets: usize,
    },
    #[error("framebuffer '{label}' attachment {index} has unusable format {format:?}")]
    InvalidFormat {
        label: String,
        index: usize,
        format: TextureFormat,
    },
}

/// Load behaviour for every attachment of a framebuffer
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferOps {
    pub color: LoadOp,
    /// Ignored when the framebuffer has no depth attachment
    pub depth: LoadOp,
}

impl FramebufferOps {
    /// Clear colors to `color` and depth to the far plane
    pub fn clear(color: [f32; 4]) -> Self {
        Self {
            color: LoadOp::Clear(color),
            depth: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
        }
    }

    /// Keep the previous contents of every attachment
    pub fn load() -> Self {
        Self {
            color: LoadOp::Load,
            depth: LoadOp::Load,
        }
    }
}

/// A render pipeline together with the color target count it was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferPipeline {
    pub handle: RenderPipelineHandle,
    pub color_targets: usize,
}

impl FramebufferPipeline {
    pub fn create(backend: &mut dyn GraphicsBackend, desc: &RenderPipelineDescriptor) -> BackendResult<Self> {
        let handle = backend.create_render_pipeline(desc)?;
        Ok(Self {
            handle,
            color_targets: desc.color_targets.len(),
        })
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_render_pipeline(self.handle);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Attachment {
    view: TextureViewHandle,
    format: TextureFormat,
}

/// Color attachments plus an optional depth attachment, fixed at creation
///
/// The framebuffer does not own its views. Pipelines drawing into it take their
/// color targets from [`Framebuffer::color_targets`], so the number of fragment
/// outputs always matches the attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    label: String,
    width: u32,
    height: u32,
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
}

impl Framebuffer {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            colors: Vec::new(),
            depth: None,
        }
    }

    pub fn with_color(mut self, view: TextureViewHandle, format: TextureFormat) -> Self {
        self.colors.push(Attachment { view, format });
        self
    }

    pub fn with_depth(mut self, view: TextureViewHandle, format: TextureFormat) -> Self {
        self.depth = Some(Attachment { view, format });
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth.map(|d| d.format)
    }

    /// Color targets for a pipeline that renders into this framebuffer
    pub fn color_targets(&self) -> Vec<ColorTargetState> {
        self.colors
            .iter()
            .map(|a| ColorTargetState {
                format: a.format,
                write_mask: ColorWrites::ALL,
            })
            .collect()
    }

    /// Depth state for a pipeline that renders into this framebuffer
    pub fn depth_state(&self, write: bool, compare: CompareFunction) -> Option<DepthStencilState> {
        self.depth.map(|d| DepthStencilState {
            format: d.format,
            depth_write_enabled: write,
            depth_compare: compare,
        })
    }

    fn validate(&self) -> Result<(), FramebufferError> {
        for (index, attachment) in self.colors.iter().enumerate() {
            if attachment.format.is_depth() {
                return Err(FramebufferError::InvalidFormat {
                    label: self.label.clone(),
                    index,
                    format: attachment.format,
                });
            }
        }
        if let Some(depth) = self.depth {
            if !depth.format.is_depth() {
                return Err(FramebufferError::InvalidFormat {
                    label: self.label.clone(),
                    index: self.colors.len(),
                    format: depth.format,
                });
            }
        }
        Ok(())
    }

    /// Open a render pass on this framebuffer, set a full-size viewport and
    /// bind `pipeline`
    pub fn begin(
        &self,
        backend: &mut dyn GraphicsBackend,
        ops: &FramebufferOps,
        pipeline: &FramebufferPipeline,
    ) -> Result<(), FramebufferError> {
        self.validate()?;
        if pipeline.color_targets != self.colors.len() {
            return Err(FramebufferError::AttachmentMismatch {
                label: self.label.clone(),
                attachments: self.colors.len(),
                targets: pipeline.color_targets,
            });
        }

        let depth_clear_value = match ops.depth {
            LoadOp::Clear(value) => value[0],
            LoadOp::Load => 1.0,
        };

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.label.clone()),
            color_attachments: self
                .colors
                .iter()
                .map(|a| ColorAttachment {
                    view: a.view,
                    load_op: ops.color.clone(),
                    store_op: StoreOp::Store,
                })
                .collect(),
            depth_stencil_attachment: self.depth.map(|d| DepthStencilAttachment {
                view: d.view,
                depth_load_op: ops.depth.clone(),
                depth_store_op: StoreOp::Store,
                depth_clear_value,
            }),
        });
        backend.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
        backend.set_render_pipeline(pipeline.handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    fn hdr_framebuffer(backend: &mut RecordingBackend) -> Framebuffer {
        let mut views = Vec::new();
        for format in [TextureFormat::Rgba16Float, TextureFormat::Rgba16Float, TextureFormat::Depth32Float] {
            let texture = backend
                .create_texture(&TextureDescriptor {
                    format,
                    usage: TextureUsage::RENDER_ATTACHMENT,
                    ..Default::default()
                })
                .unwrap();
            views.push(backend.create_texture_view(texture).unwrap());
        }
        Framebuffer::new("hdr", 1, 1)
            .with_color(views[0], TextureFormat::Rgba16Float)
            .with_color(views[1], TextureFormat::Rgba16Float)
            .with_depth(views[2], TextureFormat::Depth32Float)
    }

    fn pipeline_for(backend: &mut RecordingBackend, color_targets: Vec<ColorTargetState>) -> FramebufferPipeline {
        FramebufferPipeline::create(
            backend,
            &RenderPipelineDescriptor {
                label: Some("test".into()),
                shader: "fn vs_main() {} fn fs_main() {}".into(),
                vertex_layouts: Vec::new(),
                bind_group_layouts: Vec::new(),
                primitive_topology: PrimitiveTopology::TriangleList,
                front_face: FrontFace::Ccw,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_color_targets_match_attachments() {
        let mut backend = RecordingBackend::new(1, 1);
        let fb = hdr_framebuffer(&mut backend);
        assert_eq!(fb.color_targets().len(), 2);
        assert_eq!(fb.depth_format(), Some(TextureFormat::Depth32Float));
    }

    #[test]
    fn test_begin_rejects_target_mismatch() {
        let mut backend = RecordingBackend::new(1, 1);
        let fb = hdr_framebuffer(&mut backend);
        let single = Framebuffer::new("ldr", 1, 1).with_color(TextureViewHandle(0), TextureFormat::Rgba8Unorm);
        let pipeline = pipeline_for(&mut backend, single.color_targets());
        assert_eq!(pipeline.color_targets, 1);

        let err = fb.begin(&mut backend, &FramebufferOps::load(), &pipeline).unwrap_err();
        assert_eq!(
            err,
            FramebufferError::AttachmentMismatch {
                label: "hdr".into(),
                attachments: 2,
                targets: 1,
            }
        );
        assert!(backend.pass_labels().is_empty());
    }

    #[test]
    fn test_begin_records_clear_ops() {
        let mut backend = RecordingBackend::new(1, 1);
        let fb = hdr_framebuffer(&mut backend);
        let pipeline = pipeline_for(&mut backend, fb.color_targets());
        fb.begin(&mut backend, &FramebufferOps::clear([0.0; 4]), &pipeline).unwrap();
        backend.end_render_pass();

        let commands = backend.pass_commands("hdr");
        match commands[0] {
            Command::BeginPass { color_loads, depth_load, .. } => {
                assert_eq!(color_loads, &vec![LoadOp::Clear([0.0; 4]); 2]);
                assert!(matches!(depth_load, Some(LoadOp::Clear(_))));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::SetPipeline(h) if *h == pipeline.handle)));
    }

    #[test]
    fn test_depth_format_in_color_slot_is_rejected() {
        let mut backend = RecordingBackend::new(1, 1);
        let texture = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        let fb = Framebuffer::new("bad", 1, 1).with_color(view, TextureFormat::Depth32Float);
        let pipeline = pipeline_for(&mut backend, fb.color_targets());
        assert!(matches!(
            fb.begin(&mut backend, &FramebufferOps::load(), &pipeline),
            Err(FramebufferError::InvalidFormat { index: 0, .. })
        ));
    }
}
