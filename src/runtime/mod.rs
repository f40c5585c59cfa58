//! 运行时上下文
//!
//! `Runtime` 持有呈现表面、绘制上下文、首选表面格式、适配器和设备，
//! 并负责初始化顺序与尺寸观察。它是一个由应用入口创建并显式传给
//! 各资源包装器的上下文对象，而不是全局单例。
//!
//! # 生命周期
//!
//! ```text
//! Uninitialized ──initialize──▶ Initializing ──成功──▶ Ready
//!       ▲                            │                  │
//!       └──────────失败──────────────┘                  │
//!       └────────────────────uninitialize───────────────┘
//! ```
//!
//! 任何访问器或转发调用在 `Ready` 之外都返回 `GdyError::NotInitialized`。

pub mod options;
pub mod surface;

use std::collections::VecDeque;

use crate::core::error::{GdyError, Result};
use crate::core::event::SurfaceResizeEvent;
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BufferDescriptor, CommandEncoderDescriptor,
    ContextConfiguration, ImageCopyTexture, RenderPipelineDescriptor, SamplerDescriptor,
    ShaderModuleDescriptor, TextureDescriptor, TextureViewDescriptor,
};
use crate::gfx::external::ImageCopyExternalImage;
use crate::gfx::handle::{
    AdapterId, BindGroupId, BindGroupLayoutId, BufferId, CommandBufferId, CommandEncoderId,
    ContextId, DeviceId, QueueId, RenderPipelineId, SamplerId, ShaderModuleId, TextureId,
    TextureViewId,
};

pub use options::RuntimeOptions;
pub use surface::Surface;

/// 把观察到的尺寸逐维钳制到 `[1, max_dimension]`
pub fn clamp_surface_extent(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    (
        width.min(max_dimension).max(1),
        height.min(max_dimension).max(1),
    )
}

/// 运行时状态（不含载荷）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Uninitialized,
    Initializing,
    Ready,
}

/// 表面上注册的尺寸观察者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeObserver {
    max_texture_dimension_2d: u32,
}

impl ResizeObserver {
    pub fn new(max_texture_dimension_2d: u32) -> Self {
        Self { max_texture_dimension_2d }
    }

    /// 钳制观察到的尺寸
    pub fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        clamp_surface_extent(width, height, self.max_texture_dimension_2d)
    }
}

/// `Ready` 状态下的全部字段
#[derive(Debug)]
struct ReadyContext {
    surface: Surface,
    context: ContextId,
    configuration: ContextConfiguration,
    adapter: AdapterId,
    device: DeviceId,
    observer: ResizeObserver,
    resize_events: VecDeque<SurfaceResizeEvent>,
}

#[derive(Debug)]
enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready(ReadyContext),
}

/// 运行时上下文
pub struct Runtime<B: GpuBackend> {
    backend: B,
    state: RuntimeState,
}

impl<B: GpuBackend> Runtime<B> {
    /// 创建未初始化的运行时
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: RuntimeState::Uninitialized,
        }
    }

    /// 底层设备协议
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn status(&self) -> RuntimeStatus {
        match self.state {
            RuntimeState::Uninitialized => RuntimeStatus::Uninitialized,
            RuntimeState::Initializing => RuntimeStatus::Initializing,
            RuntimeState::Ready(_) => RuntimeStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == RuntimeStatus::Ready
    }

    /// 初始化运行时
    ///
    /// 依次请求适配器和设备、查询首选表面格式、确定表面（调用方提供的或分离画布）、
    /// 注册尺寸观察、创建并配置绘制上下文。
    /// 已经 `Ready` 时先拆除旧设备再重新获取。
    /// 任何一步失败都回到 `Uninitialized` 并把错误返回给调用方，不做重试。
    pub async fn initialize(&mut self, options: RuntimeOptions) -> Result<()> {
        if self.is_ready() {
            crate::runtime_info!("Runtime already ready, re-running acquisition");
            self.uninitialize();
        }

        crate::runtime_info!("Initializing runtime on {} backend", self.backend.backend_name());
        self.state = RuntimeState::Initializing;

        match self.acquire(options).await {
            Ok(ready) => {
                crate::runtime_info!(
                    "Runtime ready: surface {}x{}, format {:?}",
                    ready.surface.width(),
                    ready.surface.height(),
                    ready.configuration.format
                );
                self.state = RuntimeState::Ready(ready);
                Ok(())
            }
            Err(e) => {
                crate::runtime_error!("Runtime initialization failed: {}", e);
                self.state = RuntimeState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn acquire(&self, options: RuntimeOptions) -> Result<ReadyContext> {
        let adapter = self.backend.request_adapter(&options.adapter).await?;
        let device = self.backend.request_device(adapter, &options.device).await?;

        // 设备已获取，后续失败时必须释放它
        match self.configure(adapter, device, options) {
            Ok(ready) => Ok(ready),
            Err(e) => {
                self.backend.destroy_device(device);
                Err(e)
            }
        }
    }

    fn configure(
        &self,
        adapter: AdapterId,
        device: DeviceId,
        options: RuntimeOptions,
    ) -> Result<ReadyContext> {
        let format = self.backend.preferred_surface_format(adapter)?;
        let limits = self.backend.device_limits(device)?;

        let mut surface = options.surface.unwrap_or_else(Surface::detached);
        let observer = ResizeObserver::new(limits.max_texture_dimension_2d);
        let (width, height) = observer.clamp(surface.width(), surface.height());
        surface.set_size(width, height);

        let context = self.backend.create_context(&surface)?;
        let configuration = ContextConfiguration {
            device,
            format,
            alpha_mode: options.alpha_mode.unwrap_or(wgpu::CompositeAlphaMode::Opaque),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            width,
            height,
        };
        self.backend.configure_context(context, &configuration)?;

        Ok(ReadyContext {
            surface,
            context,
            configuration,
            adapter,
            device,
            observer,
            resize_events: VecDeque::new(),
        })
    }

    /// 拆除运行时：销毁设备并清空所有字段。可重复调用。
    pub fn uninitialize(&mut self) {
        let state = std::mem::replace(&mut self.state, RuntimeState::Uninitialized);
        if let RuntimeState::Ready(ready) = state {
            self.backend.destroy_device(ready.device);
            crate::runtime_info!("Runtime uninitialized");
        }
    }

    fn ready(&self) -> Result<&ReadyContext> {
        match &self.state {
            RuntimeState::Ready(ready) => Ok(ready),
            _ => Err(GdyError::NotInitialized),
        }
    }

    // ---- 访问器 ----

    pub fn device(&self) -> Result<DeviceId> {
        Ok(self.ready()?.device)
    }

    pub fn adapter(&self) -> Result<AdapterId> {
        Ok(self.ready()?.adapter)
    }

    /// 首选表面格式
    pub fn format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.ready()?.configuration.format)
    }

    pub fn surface(&self) -> Result<&Surface> {
        Ok(&self.ready()?.surface)
    }

    /// 绘制上下文
    pub fn context(&self) -> Result<ContextId> {
        Ok(self.ready()?.context)
    }

    /// 提交队列，每次都从设备派生
    pub fn queue(&self) -> Result<QueueId> {
        self.backend.device_queue(self.device()?)
    }

    /// 当前帧的表面纹理，每次都从绘制上下文派生
    pub fn current_texture(&self) -> Result<TextureId> {
        self.backend.get_current_texture(self.context()?)
    }

    /// 设备限制
    pub fn limits(&self) -> Result<wgpu::Limits> {
        self.backend.device_limits(self.device()?)
    }

    /// 表面当前尺寸
    pub fn size(&self) -> Result<wgpu::Extent3d> {
        Ok(self.ready()?.surface.extent())
    }

    // ---- 尺寸观察 ----

    /// 尺寸观察回调
    ///
    /// 钳制观察到的尺寸，写入表面，按新尺寸重新配置绘制上下文，
    /// 并把 `SurfaceResizeEvent` 放入待分发队列。
    pub fn observe_resize(&mut self, width: u32, height: u32) -> Result<SurfaceResizeEvent> {
        let RuntimeState::Ready(ready) = &mut self.state else {
            return Err(GdyError::NotInitialized);
        };

        let applied = ready.observer.clamp(width, height);
        ready.surface.set_size(applied.0, applied.1);
        ready.configuration.width = applied.0;
        ready.configuration.height = applied.1;
        self.backend.configure_context(ready.context, &ready.configuration)?;

        let event = SurfaceResizeEvent::new((width, height), applied);
        if event.was_clamped() {
            crate::runtime_warn!(
                "Surface resize {}x{} clamped to {}x{}",
                width,
                height,
                applied.0,
                applied.1
            );
        } else {
            tracing::debug!(
                target: "gdy::runtime",
                "Surface resized to {}x{}",
                applied.0,
                applied.1
            );
        }
        ready.resize_events.push_back(event.clone());
        Ok(event)
    }

    /// 取出尚未分发的尺寸事件
    pub fn take_resize_events(&mut self) -> Vec<SurfaceResizeEvent> {
        match &mut self.state {
            RuntimeState::Ready(ready) => ready.resize_events.drain(..).collect(),
            _ => Vec::new(),
        }
    }

    // ---- 资源创建转发 ----

    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId> {
        self.backend.create_buffer(self.device()?, descriptor)
    }

    pub fn destroy_buffer(&self, buffer: BufferId) -> Result<()> {
        self.ready()?;
        self.backend.destroy_buffer(buffer);
        Ok(())
    }

    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId> {
        self.backend.create_texture(self.device()?, descriptor)
    }

    pub fn destroy_texture(&self, texture: TextureId) -> Result<()> {
        self.ready()?;
        self.backend.destroy_texture(texture);
        Ok(())
    }

    pub fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId> {
        self.ready()?;
        self.backend.create_texture_view(texture, descriptor)
    }

    pub fn release_texture_view(&self, view: TextureViewId) -> Result<()> {
        self.ready()?;
        self.backend.release_texture_view(view);
        Ok(())
    }

    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId> {
        self.backend.create_sampler(self.device()?, descriptor)
    }

    pub fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId> {
        self.backend.create_shader_module(self.device()?, descriptor)
    }

    pub fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId> {
        self.backend.create_bind_group_layout(self.device()?, descriptor)
    }

    pub fn create_bind_group(&self, descriptor: &BindGroupDescriptor) -> Result<BindGroupId> {
        self.backend.create_bind_group(self.device()?, descriptor)
    }

    pub fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId> {
        self.backend.create_render_pipeline(self.device()?, descriptor)
    }

    pub fn get_bind_group_layout(
        &self,
        pipeline: RenderPipelineId,
        index: u32,
    ) -> Result<BindGroupLayoutId> {
        self.ready()?;
        self.backend.get_bind_group_layout(pipeline, index)
    }

    pub fn create_command_encoder(
        &self,
        descriptor: &CommandEncoderDescriptor,
    ) -> Result<CommandEncoderId> {
        self.backend.create_command_encoder(self.device()?, descriptor)
    }

    // ---- 队列转发 ----

    pub fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        self.backend.write_buffer(self.queue()?, buffer, offset, data)
    }

    pub fn copy_external_image_to_texture(
        &self,
        source: &ImageCopyExternalImage,
        destination: &ImageCopyTexture,
        size: wgpu::Extent3d,
    ) -> Result<()> {
        self.backend.copy_external_image_to_texture(self.queue()?, source, destination, size)
    }

    pub fn submit(&self, command_buffers: &[CommandBufferId]) -> Result<()> {
        self.backend.submit(self.queue()?, command_buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::recording::{Call, RecordingBackend};

    fn ready_runtime(backend: RecordingBackend) -> Runtime<RecordingBackend> {
        let mut runtime = Runtime::new(backend);
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        runtime
    }

    fn assert_accessors_not_initialized(runtime: &Runtime<RecordingBackend>) {
        assert!(runtime.device().unwrap_err().is_not_initialized());
        assert!(runtime.adapter().unwrap_err().is_not_initialized());
        assert!(runtime.format().unwrap_err().is_not_initialized());
        assert!(runtime.surface().unwrap_err().is_not_initialized());
        assert!(runtime.context().unwrap_err().is_not_initialized());
        assert!(runtime.queue().unwrap_err().is_not_initialized());
        assert!(runtime.current_texture().unwrap_err().is_not_initialized());
        assert!(runtime.limits().unwrap_err().is_not_initialized());
        assert!(runtime.size().unwrap_err().is_not_initialized());

        let buffer = BufferDescriptor::new(4, wgpu::BufferUsages::UNIFORM);
        assert!(runtime.create_buffer(&buffer).unwrap_err().is_not_initialized());
        assert!(runtime
            .create_command_encoder(&CommandEncoderDescriptor::default())
            .unwrap_err()
            .is_not_initialized());
        assert!(runtime.submit(&[]).unwrap_err().is_not_initialized());
    }

    #[test]
    fn test_accessors_fail_before_initialize() {
        let runtime = Runtime::new(RecordingBackend::new());
        assert_eq!(runtime.status(), RuntimeStatus::Uninitialized);
        assert_accessors_not_initialized(&runtime);
    }

    #[test]
    fn test_accessors_fail_after_uninitialize() {
        let mut runtime = ready_runtime(RecordingBackend::new());
        assert!(runtime.is_ready());
        runtime.uninitialize();
        assert_eq!(runtime.status(), RuntimeStatus::Uninitialized);
        assert_accessors_not_initialized(&runtime);
    }

    #[test]
    fn test_initialize_call_order() {
        let runtime = ready_runtime(RecordingBackend::new());
        let calls = runtime.backend().calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], Call::RequestAdapter { .. }));
        assert!(matches!(calls[1], Call::RequestDevice { .. }));
        assert!(matches!(calls[2], Call::CreateContext { width: 300, height: 150, .. }));
        match &calls[3] {
            Call::ConfigureContext { configuration, .. } => {
                assert_eq!(configuration.device, runtime.device().unwrap());
                assert_eq!(configuration.format, wgpu::TextureFormat::Bgra8Unorm);
                assert_eq!(configuration.alpha_mode, wgpu::CompositeAlphaMode::Opaque);
                assert_eq!((configuration.width, configuration.height), (300, 150));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_caller_supplied_surface_and_alpha_mode() {
        let mut runtime = Runtime::new(RecordingBackend::new());
        let options = RuntimeOptions::default()
            .with_surface(Surface::new(640, 480).with_label("main"))
            .with_alpha_mode(wgpu::CompositeAlphaMode::PreMultiplied);
        pollster::block_on(runtime.initialize(options)).unwrap();

        assert_eq!(runtime.surface().unwrap().label(), Some("main"));
        assert_eq!(
            runtime.size().unwrap(),
            wgpu::Extent3d {
                width: 640,
                height: 480,
                depth_or_array_layers: 1
            }
        );
        let context = runtime.context().unwrap();
        let configuration = runtime.backend().context_configuration(context).unwrap();
        assert_eq!(configuration.alpha_mode, wgpu::CompositeAlphaMode::PreMultiplied);
    }

    #[test]
    fn test_reinitialize_after_uninitialize() {
        let mut runtime = ready_runtime(RecordingBackend::new());
        let first_device = runtime.device().unwrap();

        runtime.uninitialize();
        runtime.uninitialize();
        assert_eq!(runtime.backend().count_calls(|c| matches!(c, Call::DestroyDevice { .. })), 1);

        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        assert_eq!(runtime.status(), RuntimeStatus::Ready);
        let second_device = runtime.device().unwrap();
        assert_ne!(first_device, second_device);
        assert!(runtime.backend().is_device_live(second_device));
        assert!(runtime.queue().is_ok());
        assert!(runtime.current_texture().is_ok());
    }

    #[test]
    fn test_initialize_while_ready_replaces_device() {
        let mut runtime = ready_runtime(RecordingBackend::new());
        let first_device = runtime.device().unwrap();

        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        assert!(runtime.is_ready());
        assert!(!runtime.backend().is_device_live(first_device));
        assert_ne!(runtime.device().unwrap(), first_device);
    }

    #[test]
    fn test_acquisition_failure_propagates() {
        let backend = RecordingBackend::new();
        backend.set_fail_adapter(true);
        let mut runtime = Runtime::new(backend);

        let err = pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap_err();
        assert!(matches!(err, GdyError::Graphics(_)));
        assert_eq!(runtime.status(), RuntimeStatus::Uninitialized);

        runtime.backend().set_fail_adapter(false);
        runtime.backend().set_fail_device(true);
        assert!(pollster::block_on(runtime.initialize(RuntimeOptions::default())).is_err());
        assert_eq!(runtime.status(), RuntimeStatus::Uninitialized);
        assert!(runtime.device().unwrap_err().is_not_initialized());

        // 调用方自行决定重试
        runtime.backend().set_fail_device(false);
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        assert!(runtime.is_ready());
    }

    #[test]
    fn test_clamp_surface_extent() {
        let limit = 8192;
        let cases = [
            ((0, 0), (1, 1)),
            ((0, 600), (1, 600)),
            ((800, 0), (800, 1)),
            ((800, 600), (800, 600)),
            ((1, 1), (1, 1)),
            ((8192, 8192), (8192, 8192)),
            ((8193, 100), (8192, 100)),
            ((100, u32::MAX), (100, 8192)),
            ((u32::MAX, u32::MAX), (8192, 8192)),
        ];
        for ((w, h), expected) in cases {
            assert_eq!(clamp_surface_extent(w, h, limit), expected, "input {}x{}", w, h);
            let formula = (w.min(limit).max(1), h.min(limit).max(1));
            assert_eq!(clamp_surface_extent(w, h, limit), formula);
        }
    }

    #[test]
    fn test_initial_surface_is_clamped() {
        let mut runtime = Runtime::new(RecordingBackend::new().with_max_texture_dimension_2d(512));
        let options = RuntimeOptions::default().with_surface(Surface::new(4096, 0));
        pollster::block_on(runtime.initialize(options)).unwrap();
        assert_eq!(runtime.surface().unwrap().size(), (512, 1));
    }

    #[test]
    fn test_observe_resize_clamps_and_reconfigures() {
        let mut runtime = ready_runtime(RecordingBackend::new().with_max_texture_dimension_2d(256));
        runtime.backend().take_calls();

        let event = runtime.observe_resize(1000, 0).unwrap();
        assert_eq!(event.requested, (1000, 0));
        assert_eq!(event.applied, (256, 1));
        assert!(event.was_clamped());
        assert_eq!(runtime.surface().unwrap().size(), (256, 1));

        let calls = runtime.backend().take_calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::ConfigureContext { configuration, .. } => {
                assert_eq!((configuration.width, configuration.height), (256, 1));
            }
            other => panic!("unexpected call {:?}", other),
        }

        runtime.observe_resize(200, 100).unwrap();
        let events = runtime.take_resize_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].applied, (200, 100));
        assert!(!events[1].was_clamped());
        assert!(runtime.take_resize_events().is_empty());
    }

    #[test]
    fn test_observe_resize_requires_ready() {
        let mut runtime = Runtime::new(RecordingBackend::new());
        assert!(runtime.observe_resize(10, 10).unwrap_err().is_not_initialized());
        assert!(runtime.take_resize_events().is_empty());
    }

    #[test]
    fn test_queue_and_current_texture_are_derived() {
        let runtime = ready_runtime(RecordingBackend::new());
        let device = runtime.device().unwrap();
        assert_eq!(runtime.queue().unwrap(), runtime.backend().device_queue(device).unwrap());

        let first = runtime.current_texture().unwrap();
        assert_eq!(runtime.current_texture().unwrap(), first);

        // 提交后呈现，下一帧是新的表面纹理
        runtime.submit(&[]).unwrap();
        assert_ne!(runtime.current_texture().unwrap(), first);
        let acquired = runtime
            .backend()
            .count_calls(|c| matches!(c, Call::GetCurrentTexture { .. }));
        assert_eq!(acquired, 3);
    }
}
