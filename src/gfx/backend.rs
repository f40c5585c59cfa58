//! 设备协议的统一抽象接口
//!
//! 运行时发出的每一个原始设备调用都经过 `GpuBackend`，
//! 因此同一个 `Runtime` 既可以驱动真实 GPU（`WgpuBackend`），
//! 也可以驱动记录调用序列的测试替身（`RecordingBackend`）。
//!
//! # 约定
//!
//! - 适配器和设备的获取是异步的，其余调用都是同步的
//! - 所有方法只需要 `&self`，后端内部自行使用内部可变性（单线程协作模型）
//! - 引用未知或失效句柄的调用返回 `GraphicsError::InvalidHandle`
//! - 渲染通道内的命令不返回错误；通道内容的校验在 `end_render_pass` 时进行

use crate::core::error::Result;

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
use crate::runtime::surface::Surface;

/// 设备协议
///
/// # 示例
///
/// ```ignore
/// let runtime = Runtime::new(WgpuBackend::headless());
/// let runtime = Runtime::new(RecordingBackend::new());
/// ```
#[allow(async_fn_in_trait)]
pub trait GpuBackend {
    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &str;

    // ---- 获取与拆除 ----

    /// 请求适配器
    async fn request_adapter(&self, options: &AdapterOptions) -> Result<AdapterId>;

    /// 从适配器请求逻辑设备
    async fn request_device(
        &self,
        adapter: AdapterId,
        descriptor: &DeviceDescriptor,
    ) -> Result<DeviceId>;

    /// 设备上报的限制
    fn device_limits(&self, device: DeviceId) -> Result<wgpu::Limits>;

    /// 宿主偏好的表面格式
    fn preferred_surface_format(&self, adapter: AdapterId) -> Result<wgpu::TextureFormat>;

    /// 设备的提交队列（每次调用都从设备派生）
    fn device_queue(&self, device: DeviceId) -> Result<QueueId>;

    /// 销毁设备；之后由它创建的所有句柄都失效
    fn destroy_device(&self, device: DeviceId);

    // ---- 表面 ----

    /// 为表面创建绘制上下文
    fn create_context(&self, surface: &Surface) -> Result<ContextId>;

    /// 配置（或重新配置）绘制上下文
    fn configure_context(
        &self,
        context: ContextId,
        configuration: &ContextConfiguration,
    ) -> Result<()>;

    /// 当前帧的表面纹理
    fn get_current_texture(&self, context: ContextId) -> Result<TextureId>;

    // ---- 资源 ----

    fn create_buffer(&self, device: DeviceId, descriptor: &BufferDescriptor) -> Result<BufferId>;

    fn destroy_buffer(&self, buffer: BufferId);

    fn create_texture(&self, device: DeviceId, descriptor: &TextureDescriptor) -> Result<TextureId>;

    fn destroy_texture(&self, texture: TextureId);

    fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId>;

    /// 释放视图（视图不再被任何通道引用之后）
    fn release_texture_view(&self, view: TextureViewId);

    fn create_sampler(&self, device: DeviceId, descriptor: &SamplerDescriptor) -> Result<SamplerId>;

    fn create_shader_module(
        &self,
        device: DeviceId,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId>;

    fn create_bind_group_layout(
        &self,
        device: DeviceId,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId>;

    fn create_bind_group(
        &self,
        device: DeviceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId>;

    fn create_render_pipeline(
        &self,
        device: DeviceId,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId>;

    /// `auto` 布局管线的第 `index` 个绑定组布局
    fn get_bind_group_layout(
        &self,
        pipeline: RenderPipelineId,
        index: u32,
    ) -> Result<BindGroupLayoutId>;

    // ---- 命令编码 ----

    fn create_command_encoder(
        &self,
        device: DeviceId,
        descriptor: &CommandEncoderDescriptor,
    ) -> Result<CommandEncoderId>;

    /// 丢弃未完成的编码器
    fn discard_command_encoder(&self, encoder: CommandEncoderId);

    fn begin_render_pass(
        &self,
        encoder: CommandEncoderId,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId>;

    fn set_pipeline(&self, pass: RenderPassId, pipeline: RenderPipelineId);

    fn set_bind_group(&self, pass: RenderPassId, index: u32, bind_group: BindGroupId);

    fn set_vertex_buffer(&self, pass: RenderPassId, slot: u32, buffer: BufferId);

    fn set_index_buffer(&self, pass: RenderPassId, buffer: BufferId, format: wgpu::IndexFormat);

    fn draw(
        &self,
        pass: RenderPassId,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn draw_indexed(
        &self,
        pass: RenderPassId,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );

    fn draw_indirect(&self, pass: RenderPassId, indirect_buffer: BufferId, indirect_offset: u64);

    fn end_render_pass(&self, pass: RenderPassId) -> Result<()>;

    /// 丢弃未结束的渲染通道，不向编码器写入任何内容
    fn discard_render_pass(&self, pass: RenderPassId);

    fn finish_command_encoder(&self, encoder: CommandEncoderId) -> Result<CommandBufferId>;

    // ---- 队列 ----

    /// 按顺序提交命令缓冲区
    fn submit(&self, queue: QueueId, command_buffers: &[CommandBufferId]) -> Result<()>;

    fn write_buffer(
        &self,
        queue: QueueId,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<()>;

    fn copy_external_image_to_texture(
        &self,
        queue: QueueId,
        source: &ImageCopyExternalImage,
        destination: &ImageCopyTexture,
        size: wgpu::Extent3d,
    ) -> Result<()>;
}
