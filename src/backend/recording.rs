//! Recording backend for testing without a GPU.
//!
//! Every call is validated the way wgpu would validate it where that matters to
//! the frame sequence (missing handles, copies inside a pass, mismatched copy
//! formats) and then appended to a command log that tests can inspect.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    BeginPass {
        label: Option<String>,
        color_views: Vec<TextureViewHandle>,
        color_loads: Vec<LoadOp>,
        depth_view: Option<TextureViewHandle>,
        depth_load: Option<LoadOp>,
    },
    EndPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    SetViewport { width: f32, height: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, instances: Range<u32> },
    CopyTexture { src: TextureHandle, dst: TextureHandle, width: u32, height: u32 },
}

/// Backend that records commands instead of talking to a GPU
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: u64,
    swapchain_view: Option<TextureViewHandle>,
    in_pass: bool,
    /// Returned by the next `begin_frame`
    acquire_failure: Option<BackendError>,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, TextureHandle>,
    samplers: HashSet<u64>,
    layouts: HashSet<u64>,
    bind_groups: HashSet<u64>,
    pipelines: HashMap<u64, RenderPipelineDescriptor>,

    commands: Vec<Command>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
            next_id: 1,
            swapchain_view: None,
            in_pass: false,
            acquire_failure: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashSet::new(),
            layouts: HashSet::new(),
            bind_groups: HashSet::new(),
            pipelines: HashMap::new(),
            commands: Vec::new(),
        }
    }

    /// Use a different swapchain format, e.g. a non-sRGB one
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Make the next `begin_frame` fail with [`BackendError::SurfaceLost`]
    pub fn lose_surface(&mut self) {
        self.acquire_failure = Some(BackendError::SurfaceLost);
    }

    /// Make the next `begin_frame` time out waiting for an image
    pub fn time_out_surface(&mut self) {
        self.acquire_failure = Some(BackendError::SurfaceTimeout);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Labels of every recorded render pass, in order
    pub fn pass_labels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::BeginPass { label, .. } => Some(label.clone().unwrap_or_default()),
                _ => None,
            })
            .collect()
    }

    /// Commands recorded between the begin and end of the pass with `label`
    pub fn pass_commands(&self, label: &str) -> Vec<&Command> {
        let mut inside = false;
        let mut result = Vec::new();
        for cmd in &self.commands {
            match cmd {
                Command::BeginPass { label: l, .. } if l.as_deref() == Some(label) => {
                    inside = true;
                    result.push(cmd);
                }
                Command::EndPass if inside => {
                    result.push(cmd);
                    inside = false;
                }
                _ if inside => result.push(cmd),
                _ => {}
            }
        }
        result
    }

    pub fn pipeline(&self, handle: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&handle.0)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle.0)
    }

    pub fn buffer_data(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&handle.0).map(|data| data.as_slice())
    }

    pub fn swapchain_view(&self) -> Option<TextureViewHandle> {
        self.swapchain_view
    }

    /// Number of resources that have been created and not destroyed
    pub fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.views.len()
            + self.samplers.len()
            + self.bind_groups.len()
            + self.layouts.len()
            + self.pipelines.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        if self.in_pass {
            self.commands.push(command);
        } else {
            log::warn!("RecordingBackend: {:?} issued outside a render pass", command);
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if let Some(err) = self.acquire_failure.take() {
            return Err(err);
        }
        let view = TextureViewHandle(self.allocate_id());
        self.swapchain_view = Some(view);
        self.commands.push(Command::BeginFrame);
        Ok(FrameContext {
            swapchain_view: view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let id = self.allocate_id();
        log::trace!("RecordingBackend: creating buffer {:?} ({} bytes)", desc.label, desc.size);
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let id = self.allocate_id();
        log::trace!("RecordingBackend: creating buffer {:?} ({} bytes)", desc.label, data.len());
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("RecordingBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            log::warn!("RecordingBackend: write past the end of buffer {:?}", buffer);
            return;
        }
        contents[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let id = self.allocate_id();
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let id = self.allocate_id();
        self.views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if data.len() != (width * height * 4) as usize {
            log::warn!(
                "RecordingBackend: texture upload of {} bytes for {}x{}",
                data.len(),
                width,
                height
            );
        }
        if !self.textures.contains_key(&texture.0) {
            log::warn!("RecordingBackend: upload to unknown texture {:?}", texture);
        }
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let id = self.allocate_id();
        self.samplers.insert(id);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.allocate_id();
        self.layouts.insert(id);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.layouts.contains(&layout.0) {
            return Err(BackendError::PipelineCreationFailed("Layout not found".into()));
        }
        for (binding, entry) in entries {
            let known = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(&buffer.0),
                BindGroupEntry::Texture(view) => self.views.contains_key(&view.0),
                BindGroupEntry::Sampler(sampler) => self.samplers.contains(&sampler.0),
            };
            if !known {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "binding {} refers to a destroyed or unknown resource",
                    binding
                )));
            }
        }
        let id = self.allocate_id();
        self.bind_groups.insert(id);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        if !desc.shader.contains("fn vs_main") || !desc.shader.contains("fn fs_main") {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{:?} is missing an entry point",
                desc.label
            )));
        }
        let id = self.allocate_id();
        self.pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.in_pass {
            log::warn!("RecordingBackend: nested render pass {:?}", desc.label);
        }
        self.in_pass = true;
        self.commands.push(Command::BeginPass {
            label: desc.label.clone(),
            color_views: desc.color_attachments.iter().map(|a| a.view).collect(),
            color_loads: desc.color_attachments.iter().map(|a| a.load_op.clone()).collect(),
            depth_view: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
            depth_load: desc
                .depth_stencil_attachment
                .as_ref()
                .map(|d| d.depth_load_op.clone()),
        });
    }

    fn end_render_pass(&mut self) {
        if self.in_pass {
            self.commands.push(Command::EndPass);
            self.in_pass = false;
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(Command::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record(Command::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(Command::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(Command::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.record(Command::DrawIndexed { indices, instances });
    }

    fn copy_texture_to_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if self.in_pass {
            return Err(BackendError::InvalidCopy("copy issued inside a render pass".into()));
        }
        let (Some(src_desc), Some(dst_desc)) = (self.textures.get(&src.0), self.textures.get(&dst.0))
        else {
            return Err(BackendError::InvalidCopy("texture not found".into()));
        };
        if src_desc.format != dst_desc.format {
            return Err(BackendError::InvalidCopy(format!(
                "format mismatch: {:?} -> {:?}",
                src_desc.format, dst_desc.format
            )));
        }
        if width > src_desc.width.min(dst_desc.width) || height > src_desc.height.min(dst_desc.height) {
            return Err(BackendError::InvalidCopy(format!(
                "{}x{} exceeds the texture extent",
                width, height
            )));
        }
        if !src_desc.usage.contains(TextureUsage::COPY_SRC) || !dst_desc.usage.contains(TextureUsage::COPY_DST) {
            return Err(BackendError::InvalidCopy("missing copy usage".into()));
        }
        self.commands.push(Command::CopyTexture { src, dst, width, height });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view.0);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        self.layouts.remove(&layout.0);
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.pipelines.remove(&pipeline.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_desc(format: TextureFormat, usage: TextureUsage) -> TextureDescriptor {
        TextureDescriptor {
            label: None,
            width: 64,
            height: 32,
            format,
            usage,
        }
    }

    #[test]
    fn test_copy_rejected_inside_pass() {
        let mut backend = RecordingBackend::new(64, 32);
        let src = backend
            .create_texture(&texture_desc(TextureFormat::Depth32Float, TextureUsage::COPY_SRC))
            .unwrap();
        let dst = backend
            .create_texture(&texture_desc(TextureFormat::Depth32Float, TextureUsage::COPY_DST))
            .unwrap();

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("open".into()),
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        assert!(matches!(
            backend.copy_texture_to_texture(src, dst, 64, 32),
            Err(BackendError::InvalidCopy(_))
        ));
        backend.end_render_pass();

        assert!(backend.copy_texture_to_texture(src, dst, 64, 32).is_ok());
        assert!(matches!(backend.commands().last(), Some(Command::CopyTexture { .. })));
    }

    #[test]
    fn test_copy_rejects_format_mismatch() {
        let mut backend = RecordingBackend::new(64, 32);
        let src = backend
            .create_texture(&texture_desc(TextureFormat::Depth32Float, TextureUsage::COPY_SRC))
            .unwrap();
        let dst = backend
            .create_texture(&texture_desc(TextureFormat::Rgba16Float, TextureUsage::COPY_DST))
            .unwrap();
        assert!(backend.copy_texture_to_texture(src, dst, 64, 32).is_err());
    }

    #[test]
    fn test_write_buffer_updates_contents() {
        let mut backend = RecordingBackend::new(8, 8);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_data(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
    }

    #[test]
    fn test_destroy_balances_live_resources() {
        let mut backend = RecordingBackend::new(8, 8);
        let texture = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        assert_eq!(backend.live_resources(), 2);
        backend.destroy_texture_view(view);
        backend.destroy_texture(texture);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_lost_surface_fails_one_frame() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.lose_surface();
        assert!(matches!(backend.begin_frame(), Err(BackendError::SurfaceLost)));
        assert!(backend.begin_frame().is_ok());
    }
}
