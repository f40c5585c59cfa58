//! 记录型后端（设备协议测试替身）
//!
//! `RecordingBackend` 不接触任何 GPU：它按顺序把每一次协议调用记录为 `Call`，
//! 分配句柄并跟踪句柄的存活状态，使上层可以断言"向设备发出了哪些调用"。
//! 还可以设置适配器/设备请求失败，或模拟不同的 `maxTextureDimension2D`。

use std::cell::{Cell, RefCell};

use slotmap::SlotMap;

use crate::core::error::{GraphicsError, Result};
use crate::runtime::surface::Surface;

use super::backend::GpuBackend;
use super::descriptor::{
    AdapterOptions, BindGroupDescriptor, BindGroupLayoutDescriptor, BufferDescriptor,
    CommandEncoderDescriptor, ContextConfiguration, DeviceDescriptor, ImageCopyTexture,
    RenderPassDescriptor, RenderPipelineDescriptor, SamplerDescriptor, ShaderModuleDescriptor,
    TextureDescriptor, TextureViewDescriptor,
};
use super::external::ImageCopyExternalImage;
use super::handle::{
    AdapterId, BindGroupId, BindGroupLayoutId, BufferId, CommandBufferId, CommandEncoderId,
    ContextId, DeviceId, QueueId, RenderPassId, RenderPipelineId, SamplerId, ShaderModuleId,
    TextureId, TextureViewId,
};

/// 一次被记录的协议调用
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RequestAdapter { adapter: AdapterId, options: AdapterOptions },
    RequestDevice { adapter: AdapterId, device: DeviceId },
    DestroyDevice { device: DeviceId },
    CreateContext { context: ContextId, width: u32, height: u32 },
    ConfigureContext { context: ContextId, configuration: ContextConfiguration },
    GetCurrentTexture { context: ContextId, texture: TextureId },
    CreateBuffer { device: DeviceId, buffer: BufferId, descriptor: BufferDescriptor },
    DestroyBuffer { buffer: BufferId },
    WriteBuffer { queue: QueueId, buffer: BufferId, offset: u64, data: Vec<u8> },
    CreateTexture { device: DeviceId, texture: TextureId, descriptor: TextureDescriptor },
    DestroyTexture { texture: TextureId },
    CreateTextureView { texture: TextureId, view: TextureViewId },
    ReleaseTextureView { view: TextureViewId },
    CopyExternalImage {
        queue: QueueId,
        texture: TextureId,
        size: wgpu::Extent3d,
        source_size: (u32, u32),
        flip_y: bool,
    },
    CreateSampler { device: DeviceId, sampler: SamplerId },
    CreateShaderModule { device: DeviceId, module: ShaderModuleId },
    CreateBindGroupLayout { device: DeviceId, layout: BindGroupLayoutId },
    CreateBindGroup { device: DeviceId, bind_group: BindGroupId, layout: BindGroupLayoutId },
    CreateRenderPipeline { device: DeviceId, pipeline: RenderPipelineId },
    GetBindGroupLayout { pipeline: RenderPipelineId, index: u32, layout: BindGroupLayoutId },
    CreateCommandEncoder { device: DeviceId, encoder: CommandEncoderId },
    DiscardCommandEncoder { encoder: CommandEncoderId },
    BeginRenderPass {
        encoder: CommandEncoderId,
        pass: RenderPassId,
        descriptor: RenderPassDescriptor,
    },
    SetPipeline { pass: RenderPassId, pipeline: RenderPipelineId },
    SetBindGroup { pass: RenderPassId, index: u32, bind_group: BindGroupId },
    SetVertexBuffer { pass: RenderPassId, slot: u32, buffer: BufferId },
    SetIndexBuffer { pass: RenderPassId, buffer: BufferId, format: wgpu::IndexFormat },
    Draw {
        pass: RenderPassId,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        pass: RenderPassId,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    DrawIndirect { pass: RenderPassId, buffer: BufferId, offset: u64 },
    EndRenderPass { pass: RenderPassId },
    DiscardRenderPass { pass: RenderPassId },
    FinishCommandEncoder { encoder: CommandEncoderId, command_buffer: CommandBufferId },
    Submit { queue: QueueId, command_buffers: Vec<CommandBufferId> },
}

struct DeviceRecord {
    adapter: AdapterId,
    queue: QueueId,
}

struct ContextRecord {
    configuration: Option<ContextConfiguration>,
    current: Option<TextureId>,
}

struct BufferRecord {
    device: DeviceId,
    destroyed: bool,
}

struct TextureRecord {
    device: Option<DeviceId>,
    descriptor: Option<TextureDescriptor>,
    destroyed: bool,
}

struct EncoderRecord {
    open_pass: Option<RenderPassId>,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    adapters: SlotMap<AdapterId, ()>,
    devices: SlotMap<DeviceId, DeviceRecord>,
    queues: SlotMap<QueueId, DeviceId>,
    contexts: SlotMap<ContextId, ContextRecord>,
    buffers: SlotMap<BufferId, BufferRecord>,
    textures: SlotMap<TextureId, TextureRecord>,
    views: SlotMap<TextureViewId, TextureId>,
    samplers: SlotMap<SamplerId, DeviceId>,
    modules: SlotMap<ShaderModuleId, DeviceId>,
    bind_group_layouts: SlotMap<BindGroupLayoutId, DeviceId>,
    bind_groups: SlotMap<BindGroupId, DeviceId>,
    pipelines: SlotMap<RenderPipelineId, DeviceId>,
    encoders: SlotMap<CommandEncoderId, EncoderRecord>,
    passes: SlotMap<RenderPassId, CommandEncoderId>,
    command_buffers: SlotMap<CommandBufferId, ()>,
}

impl Inner {
    fn live_device(&self, device: DeviceId) -> Result<()> {
        if self.devices.contains_key(device) {
            Ok(())
        } else {
            Err(invalid("device"))
        }
    }

    fn live_buffer(&self, buffer: BufferId) -> Result<DeviceId> {
        match self.buffers.get(buffer) {
            Some(record) if !record.destroyed => {
                self.live_device(record.device)?;
                Ok(record.device)
            }
            _ => Err(invalid("buffer")),
        }
    }

    fn live_texture(&self, texture: TextureId) -> Result<&TextureRecord> {
        match self.textures.get(texture) {
            Some(record) if !record.destroyed => {
                if let Some(device) = record.device {
                    self.live_device(device)?;
                }
                Ok(record)
            }
            _ => Err(invalid("texture")),
        }
    }
}

fn invalid(what: &str) -> crate::core::error::GdyError {
    GraphicsError::InvalidHandle(what.to_string()).into()
}

/// 记录型设备协议后端
pub struct RecordingBackend {
    inner: RefCell<Inner>,
    limits: wgpu::Limits,
    preferred_format: wgpu::TextureFormat,
    fail_adapter: Cell<bool>,
    fail_device: Cell<bool>,
    fail_texture_view: Cell<bool>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// 默认限制（`maxTextureDimension2D` = 8192），偏好 `Bgra8Unorm`
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Inner::default()),
            limits: wgpu::Limits::default(),
            preferred_format: wgpu::TextureFormat::Bgra8Unorm,
            fail_adapter: Cell::new(false),
            fail_device: Cell::new(false),
            fail_texture_view: Cell::new(false),
        }
    }

    pub fn with_max_texture_dimension_2d(mut self, max: u32) -> Self {
        self.limits.max_texture_dimension_2d = max;
        self
    }

    pub fn with_preferred_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.preferred_format = format;
        self
    }

    /// 之后的适配器请求是否失败
    pub fn set_fail_adapter(&self, fail: bool) {
        self.fail_adapter.set(fail);
    }

    /// 之后的设备请求是否失败
    pub fn set_fail_device(&self, fail: bool) {
        self.fail_device.set(fail);
    }

    /// 之后的纹理视图创建是否失败
    pub fn set_fail_texture_view(&self, fail: bool) {
        self.fail_texture_view.set(fail);
    }

    /// 到目前为止记录的全部调用
    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    /// 取出并清空已记录的调用
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.inner.borrow_mut().calls)
    }

    /// 满足条件的调用数
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|call| predicate(*call)).count()
    }

    pub fn is_buffer_destroyed(&self, buffer: BufferId) -> bool {
        self.inner.borrow().buffers.get(buffer).map_or(true, |b| b.destroyed)
    }

    pub fn is_texture_destroyed(&self, texture: TextureId) -> bool {
        self.inner.borrow().textures.get(texture).map_or(true, |t| t.destroyed)
    }

    /// 视图所属的纹理
    pub fn view_texture(&self, view: TextureViewId) -> Option<TextureId> {
        self.inner.borrow().views.get(view).copied()
    }

    /// 纹理创建时使用的描述符（表面纹理没有描述符）
    pub fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.inner.borrow().textures.get(texture).and_then(|t| t.descriptor.clone())
    }

    /// 上下文最近一次的配置
    pub fn context_configuration(&self, context: ContextId) -> Option<ContextConfiguration> {
        self.inner.borrow().contexts.get(context).and_then(|c| c.configuration)
    }

    /// 设备是否仍然存活
    pub fn is_device_live(&self, device: DeviceId) -> bool {
        self.inner.borrow().devices.contains_key(device)
    }

    fn record(&self, call: Call) {
        self.inner.borrow_mut().calls.push(call);
    }
}

impl GpuBackend for RecordingBackend {
    fn backend_name(&self) -> &str {
        "recording"
    }

    async fn request_adapter(&self, options: &AdapterOptions) -> Result<AdapterId> {
        if self.fail_adapter.get() {
            return Err(GraphicsError::AdapterUnavailable(
                "adapter requests are set to fail".to_string(),
            )
            .into());
        }

        let mut inner = self.inner.borrow_mut();
        let adapter = inner.adapters.insert(());
        inner.calls.push(Call::RequestAdapter { adapter, options: *options });
        Ok(adapter)
    }

    async fn request_device(
        &self,
        adapter: AdapterId,
        _descriptor: &DeviceDescriptor,
    ) -> Result<DeviceId> {
        if self.fail_device.get() {
            return Err(GraphicsError::DeviceCreation(
                "device requests are set to fail".to_string(),
            )
            .into());
        }

        let mut inner = self.inner.borrow_mut();
        if !inner.adapters.contains_key(adapter) {
            return Err(invalid("adapter"));
        }

        // 队列与设备一一对应
        let queue = inner.queues.insert(DeviceId::default());
        let device = inner.devices.insert(DeviceRecord { adapter, queue });
        inner.queues[queue] = device;
        inner.calls.push(Call::RequestDevice { adapter, device });
        Ok(device)
    }

    fn device_limits(&self, device: DeviceId) -> Result<wgpu::Limits> {
        self.inner.borrow().live_device(device)?;
        Ok(self.limits.clone())
    }

    fn preferred_surface_format(&self, adapter: AdapterId) -> Result<wgpu::TextureFormat> {
        if !self.inner.borrow().adapters.contains_key(adapter) {
            return Err(invalid("adapter"));
        }
        Ok(self.preferred_format)
    }

    fn device_queue(&self, device: DeviceId) -> Result<QueueId> {
        self.inner
            .borrow()
            .devices
            .get(device)
            .map(|d| d.queue)
            .ok_or_else(|| invalid("device"))
    }

    fn destroy_device(&self, device: DeviceId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.devices.remove(device) {
            inner.queues.remove(record.queue);
            inner.adapters.remove(record.adapter);
        }

        // 设备拥有的资源随设备一起失效
        let inner = &mut *inner;
        for (_, buffer) in inner.buffers.iter_mut().filter(|(_, b)| b.device == device) {
            buffer.destroyed = true;
        }
        for (_, texture) in inner.textures.iter_mut().filter(|(_, t)| t.device == Some(device)) {
            texture.destroyed = true;
        }
        let textures = &inner.textures;
        inner
            .views
            .retain(|_, texture| textures.get(*texture).map_or(false, |t| !t.destroyed));
        inner.samplers.retain(|_, d| *d != device);
        inner.modules.retain(|_, d| *d != device);
        inner.bind_group_layouts.retain(|_, d| *d != device);
        inner.bind_groups.retain(|_, d| *d != device);
        inner.pipelines.retain(|_, d| *d != device);
        inner.calls.push(Call::DestroyDevice { device });
    }

    fn create_context(&self, surface: &Surface) -> Result<ContextId> {
        let mut inner = self.inner.borrow_mut();
        let context = inner.contexts.insert(ContextRecord {
            configuration: None,
            current: None,
        });
        inner.calls.push(Call::CreateContext {
            context,
            width: surface.width(),
            height: surface.height(),
        });
        Ok(context)
    }

    fn configure_context(
        &self,
        context: ContextId,
        configuration: &ContextConfiguration,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(configuration.device)?;
        let record = inner.contexts.get_mut(context).ok_or_else(|| invalid("context"))?;
        record.configuration = Some(*configuration);
        // 重新配置后旧的当前纹理失效
        record.current = None;
        inner.calls.push(Call::ConfigureContext { context, configuration: *configuration });
        Ok(())
    }

    fn get_current_texture(&self, context: ContextId) -> Result<TextureId> {
        let mut inner = self.inner.borrow_mut();
        let record = inner.contexts.get(context).ok_or_else(|| invalid("context"))?;
        let current = record.current;
        let configuration = record
            .configuration
            .ok_or_else(|| GraphicsError::Surface("context is not configured".to_string()))?;

        let texture = match current {
            Some(texture) => texture,
            None => {
                let texture = inner.textures.insert(TextureRecord {
                    device: Some(configuration.device),
                    descriptor: None,
                    destroyed: false,
                });
                if let Some(record) = inner.contexts.get_mut(context) {
                    record.current = Some(texture);
                }
                texture
            }
        };
        inner.calls.push(Call::GetCurrentTexture { context, texture });
        Ok(texture)
    }

    fn create_buffer(&self, device: DeviceId, descriptor: &BufferDescriptor) -> Result<BufferId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let buffer = inner.buffers.insert(BufferRecord { device, destroyed: false });
        inner.calls.push(Call::CreateBuffer { device, buffer, descriptor: descriptor.clone() });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.buffers.get_mut(buffer) {
            record.destroyed = true;
        }
        inner.calls.push(Call::DestroyBuffer { buffer });
    }

    fn create_texture(
        &self,
        device: DeviceId,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let texture = inner.textures.insert(TextureRecord {
            device: Some(device),
            descriptor: Some(descriptor.clone()),
            destroyed: false,
        });
        inner.calls.push(Call::CreateTexture { device, texture, descriptor: descriptor.clone() });
        Ok(texture)
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.textures.get_mut(texture) {
            record.destroyed = true;
        }
        inner.calls.push(Call::DestroyTexture { texture });
    }

    fn create_texture_view(
        &self,
        texture: TextureId,
        _descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_texture(texture)?;
        if self.fail_texture_view.get() {
            return Err(GraphicsError::ResourceCreation(
                "texture views are set to fail".to_string(),
            )
            .into());
        }
        let view = inner.views.insert(texture);
        inner.calls.push(Call::CreateTextureView { texture, view });
        Ok(view)
    }

    fn release_texture_view(&self, view: TextureViewId) {
        let mut inner = self.inner.borrow_mut();
        inner.views.remove(view);
        inner.calls.push(Call::ReleaseTextureView { view });
    }

    fn create_sampler(
        &self,
        device: DeviceId,
        _descriptor: &SamplerDescriptor,
    ) -> Result<SamplerId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let sampler = inner.samplers.insert(device);
        inner.calls.push(Call::CreateSampler { device, sampler });
        Ok(sampler)
    }

    fn create_shader_module(
        &self,
        device: DeviceId,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let module = inner.modules.insert(device);
        inner.calls.push(Call::CreateShaderModule { device, module });
        Ok(module)
    }

    fn create_bind_group_layout(
        &self,
        device: DeviceId,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let layout = inner.bind_group_layouts.insert(device);
        inner.calls.push(Call::CreateBindGroupLayout { device, layout });
        Ok(layout)
    }

    fn create_bind_group(
        &self,
        device: DeviceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        if !inner.bind_group_layouts.contains_key(descriptor.layout) {
            return Err(invalid("bind group layout"));
        }
        let bind_group = inner.bind_groups.insert(device);
        inner.calls.push(Call::CreateBindGroup { device, bind_group, layout: descriptor.layout });
        Ok(bind_group)
    }

    fn create_render_pipeline(
        &self,
        device: DeviceId,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        if !inner.modules.contains_key(descriptor.vertex.module) {
            return Err(invalid("vertex shader module"));
        }
        let pipeline = inner.pipelines.insert(device);
        inner.calls.push(Call::CreateRenderPipeline { device, pipeline });
        Ok(pipeline)
    }

    fn get_bind_group_layout(
        &self,
        pipeline: RenderPipelineId,
        index: u32,
    ) -> Result<BindGroupLayoutId> {
        let mut inner = self.inner.borrow_mut();
        let device = *inner.pipelines.get(pipeline).ok_or_else(|| invalid("render pipeline"))?;
        let layout = inner.bind_group_layouts.insert(device);
        inner.calls.push(Call::GetBindGroupLayout { pipeline, index, layout });
        Ok(layout)
    }

    fn create_command_encoder(
        &self,
        device: DeviceId,
        _descriptor: &CommandEncoderDescriptor,
    ) -> Result<CommandEncoderId> {
        let mut inner = self.inner.borrow_mut();
        inner.live_device(device)?;
        let encoder = inner.encoders.insert(EncoderRecord { open_pass: None });
        inner.calls.push(Call::CreateCommandEncoder { device, encoder });
        Ok(encoder)
    }

    fn discard_command_encoder(&self, encoder: CommandEncoderId) {
        let mut inner = self.inner.borrow_mut();
        inner.encoders.remove(encoder);
        inner.calls.push(Call::DiscardCommandEncoder { encoder });
    }

    fn begin_render_pass(
        &self,
        encoder: CommandEncoderId,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId> {
        let mut inner = self.inner.borrow_mut();
        match inner.encoders.get(encoder) {
            Some(record) if record.open_pass.is_some() => {
                return Err(GraphicsError::CommandExecution(
                    "a render pass is already open".to_string(),
                )
                .into());
            }
            Some(_) => {}
            None => return Err(invalid("command encoder")),
        }
        let pass = inner.passes.insert(encoder);
        inner.encoders[encoder].open_pass = Some(pass);
        inner.calls.push(Call::BeginRenderPass { encoder, pass, descriptor: descriptor.clone() });
        Ok(pass)
    }

    fn set_pipeline(&self, pass: RenderPassId, pipeline: RenderPipelineId) {
        self.record(Call::SetPipeline { pass, pipeline });
    }

    fn set_bind_group(&self, pass: RenderPassId, index: u32, bind_group: BindGroupId) {
        self.record(Call::SetBindGroup { pass, index, bind_group });
    }

    fn set_vertex_buffer(&self, pass: RenderPassId, slot: u32, buffer: BufferId) {
        self.record(Call::SetVertexBuffer { pass, slot, buffer });
    }

    fn set_index_buffer(&self, pass: RenderPassId, buffer: BufferId, format: wgpu::IndexFormat) {
        self.record(Call::SetIndexBuffer { pass, buffer, format });
    }

    fn draw(
        &self,
        pass: RenderPassId,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(Call::Draw {
            pass,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &self,
        pass: RenderPassId,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.record(Call::DrawIndexed {
            pass,
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
    }

    fn draw_indirect(&self, pass: RenderPassId, indirect_buffer: BufferId, indirect_offset: u64) {
        self.record(Call::DrawIndirect { pass, buffer: indirect_buffer, offset: indirect_offset });
    }

    fn end_render_pass(&self, pass: RenderPassId) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let encoder = inner.passes.remove(pass).ok_or_else(|| invalid("render pass"))?;
        if let Some(record) = inner.encoders.get_mut(encoder) {
            record.open_pass = None;
        }
        inner.calls.push(Call::EndRenderPass { pass });
        Ok(())
    }

    fn discard_render_pass(&self, pass: RenderPassId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(encoder) = inner.passes.remove(pass) {
            if let Some(record) = inner.encoders.get_mut(encoder) {
                record.open_pass = None;
            }
        }
        inner.calls.push(Call::DiscardRenderPass { pass });
    }

    fn finish_command_encoder(&self, encoder: CommandEncoderId) -> Result<CommandBufferId> {
        let mut inner = self.inner.borrow_mut();
        let record = inner.encoders.get(encoder).ok_or_else(|| invalid("command encoder"))?;
        if record.open_pass.is_some() {
            return Err(GraphicsError::CommandExecution(
                "render pass still open".to_string(),
            )
            .into());
        }
        inner.encoders.remove(encoder);
        let command_buffer = inner.command_buffers.insert(());
        inner.calls.push(Call::FinishCommandEncoder { encoder, command_buffer });
        Ok(command_buffer)
    }

    fn submit(&self, queue: QueueId, command_buffers: &[CommandBufferId]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let device = *inner.queues.get(queue).ok_or_else(|| invalid("queue"))?;
        for command_buffer in command_buffers {
            // 命令缓冲区只能提交一次
            if inner.command_buffers.remove(*command_buffer).is_none() {
                return Err(invalid("command buffer"));
            }
        }
        // 提交后呈现，下一次获取得到新的表面纹理
        for record in inner.contexts.values_mut() {
            if record.configuration.map(|c| c.device) == Some(device) {
                record.current = None;
            }
        }
        inner.calls.push(Call::Submit { queue, command_buffers: command_buffers.to_vec() });
        Ok(())
    }

    fn write_buffer(
        &self,
        queue: QueueId,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.queues.contains_key(queue) {
            return Err(invalid("queue"));
        }
        inner.live_buffer(buffer)?;
        inner.calls.push(Call::WriteBuffer { queue, buffer, offset, data: data.to_vec() });
        Ok(())
    }

    fn copy_external_image_to_texture(
        &self,
        queue: QueueId,
        source: &ImageCopyExternalImage,
        destination: &ImageCopyTexture,
        size: wgpu::Extent3d,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.queues.contains_key(queue) {
            return Err(invalid("queue"));
        }
        inner.live_texture(destination.texture)?;
        inner.calls.push(Call::CopyExternalImage {
            queue,
            texture: destination.texture,
            size,
            source_size: source.source.dimensions(),
            flip_y: source.flip_y,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(backend: &RecordingBackend) -> (DeviceId, QueueId) {
        let adapter =
            pollster::block_on(backend.request_adapter(&AdapterOptions::default())).unwrap();
        let device =
            pollster::block_on(backend.request_device(adapter, &DeviceDescriptor::default()))
                .unwrap();
        let queue = backend.device_queue(device).unwrap();
        (device, queue)
    }

    #[test]
    fn test_acquisition_failures() {
        let backend = RecordingBackend::new();
        backend.set_fail_adapter(true);
        assert!(pollster::block_on(backend.request_adapter(&AdapterOptions::default())).is_err());

        backend.set_fail_adapter(false);
        backend.set_fail_device(true);
        let adapter =
            pollster::block_on(backend.request_adapter(&AdapterOptions::default())).unwrap();
        let desc = DeviceDescriptor::default();
        let device = backend.request_device(adapter, &desc);
        assert!(pollster::block_on(device).is_err());
    }

    #[test]
    fn test_queue_is_stable_per_device() {
        let backend = RecordingBackend::new();
        let (device, queue) = acquire(&backend);
        assert_eq!(backend.device_queue(device).unwrap(), queue);

        backend.destroy_device(device);
        assert!(backend.device_queue(device).is_err());
        assert!(!backend.is_device_live(device));
    }

    #[test]
    fn test_resources_invalid_after_device_destroyed() {
        let backend = RecordingBackend::new();
        let (device, queue) = acquire(&backend);
        let buffer = backend
            .create_buffer(device, &BufferDescriptor::new(16, wgpu::BufferUsages::UNIFORM))
            .unwrap();

        backend.destroy_device(device);
        assert!(backend.write_buffer(queue, buffer, 0, &[0; 4]).is_err());
        assert!(backend
            .create_buffer(device, &BufferDescriptor::new(16, wgpu::BufferUsages::UNIFORM))
            .is_err());
    }

    #[test]
    fn test_device_teardown_releases_owned_objects() {
        let backend = RecordingBackend::new();
        let (device, _) = acquire(&backend);
        let adapter = match backend.calls().first() {
            Some(Call::RequestAdapter { adapter, .. }) => *adapter,
            other => panic!("expected adapter request, got {:?}", other),
        };
        let texture = backend
            .create_texture(
                device,
                &TextureDescriptor::new(
                    wgpu::Extent3d { width: 4, height: 4, depth_or_array_layers: 1 },
                    wgpu::TextureFormat::Rgba8Unorm,
                    wgpu::TextureUsages::TEXTURE_BINDING,
                ),
            )
            .unwrap();
        let view = backend.create_texture_view(texture, &TextureViewDescriptor::default()).unwrap();
        let layout = backend
            .create_bind_group_layout(
                device,
                &BindGroupLayoutDescriptor {
                    label: None,
                    entries: Vec::new(),
                },
            )
            .unwrap();

        backend.destroy_device(device);
        assert!(backend.is_texture_destroyed(texture));
        assert_eq!(backend.view_texture(view), None);
        assert!(backend.create_texture_view(texture, &TextureViewDescriptor::default()).is_err());
        assert!(backend.preferred_surface_format(adapter).is_err());

        // 新设备上不能引用旧设备的布局
        let (device, _) = acquire(&backend);
        let descriptor = BindGroupDescriptor { label: None, layout, entries: Vec::new() };
        assert!(backend.create_bind_group(device, &descriptor).is_err());
    }

    #[test]
    fn test_single_open_pass_and_single_submit() {
        let backend = RecordingBackend::new();
        let (device, queue) = acquire(&backend);
        let encoder = backend
            .create_command_encoder(device, &CommandEncoderDescriptor::default())
            .unwrap();

        let pass = backend.begin_render_pass(encoder, &RenderPassDescriptor::default()).unwrap();
        assert!(backend.begin_render_pass(encoder, &RenderPassDescriptor::default()).is_err());
        assert!(backend.finish_command_encoder(encoder).is_err());

        backend.end_render_pass(pass).unwrap();
        let command_buffer = backend.finish_command_encoder(encoder).unwrap();
        backend.submit(queue, &[command_buffer]).unwrap();
        assert!(backend.submit(queue, &[command_buffer]).is_err());
    }
}
