//! wgpu 后端设备管理
//!
//! 本模块把设备协议映射到 wgpu：
//! - 创建 wgpu 实例，可选地为窗口预先创建表面
//! - 请求适配器和逻辑设备
//! - 用 slotmap 管理所有 wgpu 对象，对外只暴露类型化句柄
//! - 渲染通道先录制为命令列表，在 `end_render_pass` 时回放到真实的 `wgpu::RenderPass`
//! - 提交之后呈现当前帧

use std::borrow::Cow;
use std::cell::RefCell;
use std::ops::Range;
use std::sync::Arc;

use slotmap::SlotMap;
use tracing::{debug, error, info, warn};
use winit::window::Window;

use crate::core::error::{GdyError, GraphicsError, Result};
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{
    AdapterOptions, BindGroupDescriptor, BindGroupLayoutDescriptor, BindingResource,
    BufferDescriptor, CommandEncoderDescriptor, ContextConfiguration, DeviceDescriptor,
    ImageCopyTexture, PipelineLayout, RenderPassDescriptor, RenderPipelineDescriptor,
    SamplerDescriptor, ShaderModuleDescriptor, TextureDescriptor, TextureViewDescriptor,
};
use crate::gfx::external::ImageCopyExternalImage;
use crate::gfx::handle::{
    AdapterId, BindGroupId, BindGroupLayoutId, BufferId, CommandBufferId, CommandEncoderId,
    ContextId, DeviceId, QueueId, RenderPassId, RenderPipelineId, SamplerId, ShaderModuleId,
    TextureId, TextureViewId,
};
use crate::runtime::surface::Surface;

struct DeviceEntry {
    device: wgpu::Device,
    adapter: AdapterId,
    queue: QueueId,
}

struct QueueEntry {
    queue: wgpu::Queue,
    device: DeviceId,
}

enum ContextTarget {
    /// 窗口表面
    Window(wgpu::Surface<'static>),
    /// 离屏纹理（没有窗口时的分离画布）
    Offscreen,
}

/// 已获取、尚未呈现的表面帧
struct Frame {
    texture: TextureId,
    surface_texture: wgpu::SurfaceTexture,
    views: Vec<TextureViewId>,
}

struct ContextEntry {
    target: ContextTarget,
    device: Option<DeviceId>,
    config: Option<wgpu::SurfaceConfiguration>,
    offscreen: Option<TextureId>,
    frame: Option<Frame>,
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    device: DeviceId,
}

enum TextureSlot {
    Owned { texture: wgpu::Texture, device: DeviceId },
    /// 表面当前帧的纹理，生命周期由表面管理
    SurfaceFrame { context: ContextId },
}

struct EncoderEntry {
    encoder: wgpu::CommandEncoder,
    device: DeviceId,
    open_pass: Option<RenderPassId>,
}

enum PassCommand {
    SetPipeline(RenderPipelineId),
    SetBindGroup(u32, BindGroupId),
    SetVertexBuffer(u32, BufferId),
    SetIndexBuffer(BufferId, wgpu::IndexFormat),
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    DrawIndirect { buffer: BufferId, offset: u64 },
}

struct PassEntry {
    encoder: CommandEncoderId,
    descriptor: RenderPassDescriptor,
    commands: Vec<PassCommand>,
}

/// 归属于某个设备的 wgpu 对象，设备销毁时一并释放
struct Owned<T> {
    value: T,
    device: DeviceId,
}

struct CommandBufferEntry {
    buffer: wgpu::CommandBuffer,
    device: DeviceId,
}

#[derive(Default)]
struct Resources {
    adapters: SlotMap<AdapterId, wgpu::Adapter>,
    devices: SlotMap<DeviceId, DeviceEntry>,
    queues: SlotMap<QueueId, QueueEntry>,
    contexts: SlotMap<ContextId, ContextEntry>,
    buffers: SlotMap<BufferId, BufferEntry>,
    textures: SlotMap<TextureId, TextureSlot>,
    views: SlotMap<TextureViewId, Owned<wgpu::TextureView>>,
    samplers: SlotMap<SamplerId, Owned<wgpu::Sampler>>,
    modules: SlotMap<ShaderModuleId, Owned<wgpu::ShaderModule>>,
    bind_group_layouts: SlotMap<BindGroupLayoutId, Owned<wgpu::BindGroupLayout>>,
    bind_groups: SlotMap<BindGroupId, Owned<wgpu::BindGroup>>,
    pipelines: SlotMap<RenderPipelineId, Owned<wgpu::RenderPipeline>>,
    encoders: SlotMap<CommandEncoderId, EncoderEntry>,
    passes: SlotMap<RenderPassId, PassEntry>,
    command_buffers: SlotMap<CommandBufferId, CommandBufferEntry>,
}

impl Resources {
    fn device(&self, device: DeviceId) -> Result<&wgpu::Device> {
        self.devices
            .get(device)
            .map(|d| &d.device)
            .ok_or_else(|| invalid("device"))
    }

    fn view(&self, view: TextureViewId) -> Result<&wgpu::TextureView> {
        self.views.get(view).map(|v| &v.value).ok_or_else(|| invalid("texture view"))
    }

    fn module(&self, module: ShaderModuleId, what: &str) -> Result<&wgpu::ShaderModule> {
        self.modules.get(module).map(|m| &m.value).ok_or_else(|| invalid(what))
    }

    fn bind_group_layout(&self, layout: BindGroupLayoutId) -> Result<&wgpu::BindGroupLayout> {
        self.bind_group_layouts
            .get(layout)
            .map(|l| &l.value)
            .ok_or_else(|| invalid("bind group layout"))
    }

    fn buffer(&self, buffer: BufferId) -> Result<&wgpu::Buffer> {
        self.buffers
            .get(buffer)
            .map(|b| &b.buffer)
            .ok_or_else(|| invalid("buffer"))
    }

    /// 丢弃未呈现的帧，连同在它上面创建的视图
    fn drop_frame(&mut self, context: ContextId) -> Option<Frame> {
        let frame = self.contexts.get_mut(context)?.frame.take()?;
        for view in &frame.views {
            self.views.remove(*view);
        }
        self.textures.remove(frame.texture);
        Some(frame)
    }
}

fn invalid(what: &str) -> GdyError {
    GraphicsError::InvalidHandle(format!("unknown or destroyed {}", what)).into()
}

/// wgpu 图形后端
///
/// 封装 wgpu 实例和可选的窗口表面；所有 wgpu 对象都保存在内部的句柄表里。
pub struct WgpuBackend {
    /// wgpu 实例（入口点）
    instance: wgpu::Instance,
    /// 窗口引用
    window: Option<Arc<Window>>,
    /// 尚未交给绘制上下文的窗口表面
    surface: RefCell<Option<wgpu::Surface<'static>>>,
    present_mode: wgpu::PresentMode,
    resources: RefCell<Resources>,
}

impl WgpuBackend {
    fn create_instance() -> wgpu::Instance {
        debug!("Creating wgpu instance");
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),  // 支持所有后端（Vulkan, Metal, DX12, OpenGL）
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        })
    }

    /// 不绑定窗口的后端，绘制上下文是离屏纹理
    pub fn headless() -> Self {
        info!("Initializing headless wgpu backend");
        Self {
            instance: Self::create_instance(),
            window: None,
            surface: RefCell::new(None),
            present_mode: wgpu::PresentMode::Fifo,
            resources: RefCell::new(Resources::default()),
        }
    }

    /// 绑定到窗口的后端
    ///
    /// 表面在这里预先创建，使适配器选择可以要求与表面兼容。
    pub fn with_window(window: Arc<Window>, vsync: bool) -> Result<Self> {
        info!("Initializing wgpu backend");
        let instance = Self::create_instance();

        // wgpu 0.19 API
        debug!("Creating surface");
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| GraphicsError::Surface(format!("Failed to create surface: {}", e)))?;

        let present_mode = if vsync {
            wgpu::PresentMode::Fifo  // 垂直同步
        } else {
            wgpu::PresentMode::Immediate  // 立即呈现
        };

        Ok(Self {
            instance,
            window: Some(window),
            surface: RefCell::new(Some(surface)),
            present_mode,
            resources: RefCell::new(Resources::default()),
        })
    }

    /// 获取窗口引用
    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    fn configure_window_surface(
        res: &Resources,
        surface: &wgpu::Surface<'static>,
        device: DeviceId,
        config: &mut wgpu::SurfaceConfiguration,
    ) -> Result<()> {
        let entry = res.devices.get(device).ok_or_else(|| invalid("device"))?;
        let adapter = res.adapters.get(entry.adapter).ok_or_else(|| invalid("adapter"))?;

        let caps = surface.get_capabilities(adapter);
        if !caps.alpha_modes.contains(&config.alpha_mode) {
            let fallback = caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto);
            warn!(
                "Alpha mode {:?} unsupported by surface, using {:?}",
                config.alpha_mode, fallback
            );
            config.alpha_mode = fallback;
        }

        surface.configure(&entry.device, config);
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn backend_name(&self) -> &str {
        "wgpu"
    }

    async fn request_adapter(&self, options: &AdapterOptions) -> Result<AdapterId> {
        debug!("Requesting adapter");
        let adapter = {
            let surface = self.surface.borrow();
            self.instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: options.power_preference,
                    compatible_surface: surface.as_ref(),
                    force_fallback_adapter: options.force_fallback_adapter,
                })
                .await
                .ok_or_else(|| {
                    GraphicsError::AdapterUnavailable("Failed to find suitable adapter".to_string())
                })?
        };

        info!("Selected adapter: {:?}", adapter.get_info());
        Ok(self.resources.borrow_mut().adapters.insert(adapter))
    }

    async fn request_device(
        &self,
        adapter: AdapterId,
        descriptor: &DeviceDescriptor,
    ) -> Result<DeviceId> {
        debug!("Requesting device and queue");
        let (device, queue) = {
            let res = self.resources.borrow();
            let adapter = res.adapters.get(adapter).ok_or_else(|| invalid("adapter"))?;
            adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: descriptor.label.as_deref(),
                        required_features: descriptor.required_features,
                        required_limits: descriptor.required_limits.clone(),
                    },
                    None,  // 不跟踪 API 调用
                )
                .await
                .map_err(|e| {
                    GraphicsError::DeviceCreation(format!("Failed to create device: {}", e))
                })?
        };

        // 未捕获的校验错误写入日志，而不是让进程崩溃
        device.on_uncaptured_error(Box::new(|e| {
            error!("wgpu validation error: {}", e);
        }));

        let mut res = self.resources.borrow_mut();
        let queue = res.queues.insert(QueueEntry {
            queue,
            device: DeviceId::default(),
        });
        let device = res.devices.insert(DeviceEntry { device, adapter, queue });
        res.queues[queue].device = device;
        Ok(device)
    }

    fn device_limits(&self, device: DeviceId) -> Result<wgpu::Limits> {
        Ok(self.resources.borrow().device(device)?.limits())
    }

    fn preferred_surface_format(&self, adapter: AdapterId) -> Result<wgpu::TextureFormat> {
        let res = self.resources.borrow();
        let adapter = res.adapters.get(adapter).ok_or_else(|| invalid("adapter"))?;

        let surface = self.surface.borrow();
        let Some(surface) = surface.as_ref() else {
            return Ok(wgpu::TextureFormat::Bgra8UnormSrgb);
        };

        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            // 优先选择 sRGB 格式
            .find(|f| {
                matches!(
                    f,
                    wgpu::TextureFormat::Bgra8UnormSrgb | wgpu::TextureFormat::Rgba8UnormSrgb
                )
            })
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| {
                GraphicsError::Surface("Surface reports no supported formats".to_string())
            })?;

        debug!("Surface format: {:?}", format);
        Ok(format)
    }

    fn device_queue(&self, device: DeviceId) -> Result<QueueId> {
        self.resources
            .borrow()
            .devices
            .get(device)
            .map(|d| d.queue)
            .ok_or_else(|| invalid("device"))
    }

    fn destroy_device(&self, device: DeviceId) {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let Some(entry) = res.devices.remove(device) else {
            return;
        };
        res.queues.remove(entry.queue);

        // 窗口表面交还给后端，供下一次初始化使用
        let contexts: Vec<ContextId> = res
            .contexts
            .iter()
            .filter(|(_, c)| c.device.is_none() || c.device == Some(device))
            .map(|(id, _)| id)
            .collect();
        for id in contexts {
            res.drop_frame(id);
            if let Some(context) = res.contexts.remove(id) {
                if let Some(texture) = context.offscreen {
                    res.textures.remove(texture);
                }
                if let ContextTarget::Window(surface) = context.target {
                    *self.surface.borrow_mut() = Some(surface);
                }
            }
        }

        res.buffers.retain(|_, b| b.device != device);
        res.textures
            .retain(|_, t| !matches!(t, TextureSlot::Owned { device: d, .. } if *d == device));
        res.views.retain(|_, v| v.device != device);
        res.samplers.retain(|_, s| s.device != device);
        res.modules.retain(|_, m| m.device != device);
        res.bind_group_layouts.retain(|_, l| l.device != device);
        res.bind_groups.retain(|_, g| g.device != device);
        res.pipelines.retain(|_, p| p.device != device);
        res.encoders.retain(|_, e| e.device != device);
        let encoders = &res.encoders;
        res.passes.retain(|_, p| encoders.contains_key(p.encoder));
        res.command_buffers.retain(|_, c| c.device != device);
        res.adapters.remove(entry.adapter);

        entry.device.destroy();
        info!("wgpu device destroyed");
    }

    fn create_context(&self, surface: &Surface) -> Result<ContextId> {
        let target = match self.surface.borrow_mut().take() {
            Some(surface) => ContextTarget::Window(surface),
            None => {
                debug!(
                    "No window surface available, using offscreen canvas {}x{}",
                    surface.width(),
                    surface.height()
                );
                ContextTarget::Offscreen
            }
        };

        Ok(self.resources.borrow_mut().contexts.insert(ContextEntry {
            target,
            device: None,
            config: None,
            offscreen: None,
            frame: None,
        }))
    }

    fn configure_context(
        &self,
        context: ContextId,
        configuration: &ContextConfiguration,
    ) -> Result<()> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        if !res.contexts.contains_key(context) {
            return Err(invalid("context"));
        }
        res.device(configuration.device)?;
        res.drop_frame(context);

        let mut config = wgpu::SurfaceConfiguration {
            usage: configuration.usage,
            format: configuration.format,
            width: configuration.width,
            height: configuration.height,
            present_mode: self.present_mode,
            alpha_mode: configuration.alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let old_offscreen = res.contexts[context].offscreen.take();
        match &res.contexts[context].target {
            ContextTarget::Window(surface) => {
                Self::configure_window_surface(res, surface, configuration.device, &mut config)?;
            }
            ContextTarget::Offscreen => {
                let old = old_offscreen.and_then(|id| res.textures.remove(id));
                if let Some(TextureSlot::Owned { texture, .. }) = old {
                    texture.destroy();
                }
                let device = res.device(configuration.device)?;
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Offscreen Canvas"),
                    size: wgpu::Extent3d {
                        width: configuration.width,
                        height: configuration.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: configuration.format,
                    usage: configuration.usage | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let id = res.textures.insert(TextureSlot::Owned {
                    texture,
                    device: configuration.device,
                });
                res.contexts[context].offscreen = Some(id);
            }
        }

        let entry = &mut res.contexts[context];
        entry.device = Some(configuration.device);
        entry.config = Some(config);
        debug!(
            "Context configured: {}x{} {:?}",
            configuration.width, configuration.height, configuration.format
        );
        Ok(())
    }

    fn get_current_texture(&self, context: ContextId) -> Result<TextureId> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let entry = res.contexts.get(context).ok_or_else(|| invalid("context"))?;

        if let Some(frame) = &entry.frame {
            return Ok(frame.texture);
        }
        if let Some(offscreen) = entry.offscreen {
            return Ok(offscreen);
        }

        let (ContextTarget::Window(surface), Some(device), Some(config)) =
            (&entry.target, entry.device, entry.config.as_ref())
        else {
            return Err(GraphicsError::Surface("Context is not configured".to_string()).into());
        };

        let surface_texture = match surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                // 表面失效时重新配置一次再获取
                warn!("Surface lost or outdated, reconfiguring");
                surface.configure(res.device(device)?, config);
                surface
                    .get_current_texture()
                    .map_err(|e| {
                        GraphicsError::Surface(format!(
                            "Failed to acquire next swap chain texture: {:?}",
                            e
                        ))
                    })?
            }
            Err(e) => {
                return Err(GraphicsError::Surface(
                    format!("Failed to acquire next swap chain texture: {:?}", e),
                )
                .into());
            }
        };

        let texture = res.textures.insert(TextureSlot::SurfaceFrame { context });
        res.contexts[context].frame = Some(Frame {
            texture,
            surface_texture,
            views: Vec::new(),
        });
        Ok(texture)
    }

    fn create_buffer(&self, device: DeviceId, descriptor: &BufferDescriptor) -> Result<BufferId> {
        let mut res = self.resources.borrow_mut();
        let buffer = res.device(device)?.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: descriptor.usage,
            mapped_at_creation: descriptor.mapped_at_creation,
        });
        Ok(res.buffers.insert(BufferEntry { buffer, device }))
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(entry) = self.resources.borrow_mut().buffers.remove(buffer) {
            entry.buffer.destroy();
        }
    }

    fn create_texture(
        &self,
        device: DeviceId,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId> {
        let mut res = self.resources.borrow_mut();
        let texture = res.device(device)?.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            dimension: descriptor.dimension,
            format: descriptor.format,
            usage: descriptor.usage,
            view_formats: &descriptor.view_formats,
        });
        Ok(res.textures.insert(TextureSlot::Owned { texture, device }))
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut res = self.resources.borrow_mut();
        match res.textures.get(texture) {
            Some(TextureSlot::Owned { .. }) => {
                if let Some(TextureSlot::Owned { texture, .. }) = res.textures.remove(texture) {
                    texture.destroy();
                }
            }
            Some(TextureSlot::SurfaceFrame { .. }) => {
                warn!("Surface textures are owned by the surface and cannot be destroyed");
            }
            None => {}
        }
    }

    fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let desc = wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            format: descriptor.format,
            dimension: descriptor.dimension,
            aspect: descriptor.aspect,
            base_mip_level: descriptor.base_mip_level,
            mip_level_count: descriptor.mip_level_count,
            base_array_layer: descriptor.base_array_layer,
            array_layer_count: descriptor.array_layer_count,
        };

        let (view, device, frame_context) = match res.textures.get(texture) {
            Some(TextureSlot::Owned { texture, device }) => {
                (texture.create_view(&desc), *device, None)
            }
            Some(TextureSlot::SurfaceFrame { context }) => {
                let entry = res.contexts.get(*context).ok_or_else(|| invalid("context"))?;
                let (Some(frame), Some(device)) = (entry.frame.as_ref(), entry.device) else {
                    return Err(invalid("surface frame"));
                };
                (frame.surface_texture.texture.create_view(&desc), device, Some(*context))
            }
            None => return Err(invalid("texture")),
        };

        let id = res.views.insert(Owned { value: view, device });
        let frame = frame_context
            .and_then(|c| res.contexts.get_mut(c))
            .and_then(|c| c.frame.as_mut());
        if let Some(frame) = frame {
            frame.views.push(id);
        }
        Ok(id)
    }

    fn release_texture_view(&self, view: TextureViewId) {
        self.resources.borrow_mut().views.remove(view);
    }

    fn create_sampler(
        &self,
        device: DeviceId,
        descriptor: &SamplerDescriptor,
    ) -> Result<SamplerId> {
        let mut res = self.resources.borrow_mut();
        let sampler = res.device(device)?.create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: descriptor.address_mode_u,
            address_mode_v: descriptor.address_mode_v,
            address_mode_w: descriptor.address_mode_w,
            mag_filter: descriptor.mag_filter,
            min_filter: descriptor.min_filter,
            mipmap_filter: descriptor.mipmap_filter,
            ..Default::default()
        });
        Ok(res.samplers.insert(Owned { value: sampler, device }))
    }

    fn create_shader_module(
        &self,
        device: DeviceId,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId> {
        let mut res = self.resources.borrow_mut();
        let wgpu_device = res.device(device)?;

        wgpu_device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = wgpu_device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: descriptor.label.as_deref(),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&descriptor.code)),
        });
        if let Some(e) = pollster::block_on(wgpu_device.pop_error_scope()) {
            return Err(GraphicsError::ResourceCreation(
                format!("Failed to create shader module: {}", e),
            )
            .into());
        }

        Ok(res.modules.insert(Owned { value: module, device }))
    }

    fn create_bind_group_layout(
        &self,
        device: DeviceId,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId> {
        let mut res = self.resources.borrow_mut();
        let layout = res.device(device)?.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: descriptor.label.as_deref(),
            entries: &descriptor.entries,
        });
        Ok(res.bind_group_layouts.insert(Owned { value: layout, device }))
    }

    fn create_bind_group(
        &self,
        device: DeviceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;

        let bind_group = {
            let layout = res.bind_group_layout(descriptor.layout)?;
            let entries = descriptor
                .entries
                .iter()
                .map(|entry| -> Result<wgpu::BindGroupEntry> {
                    let resource = match &entry.resource {
                        BindingResource::Buffer { buffer, offset, size } => {
                            wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: res.buffer(*buffer)?,
                                offset: *offset,
                                size: *size,
                            })
                        }
                        BindingResource::TextureView(view) => {
                            wgpu::BindingResource::TextureView(res.view(*view)?)
                        }
                        BindingResource::Sampler(sampler) => {
                            let sampler =
                                res.samplers.get(*sampler).ok_or_else(|| invalid("sampler"))?;
                            wgpu::BindingResource::Sampler(&sampler.value)
                        }
                    };
                    Ok(wgpu::BindGroupEntry {
                        binding: entry.binding,
                        resource,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            res.device(device)?.create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label.as_deref(),
                layout,
                entries: &entries,
            })
        };

        Ok(res.bind_groups.insert(Owned { value: bind_group, device }))
    }

    fn create_render_pipeline(
        &self,
        device: DeviceId,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;

        let pipeline = {
            let wgpu_device = res.device(device)?;

            let layout = match &descriptor.layout {
                PipelineLayout::Auto => None,
                PipelineLayout::Explicit(ids) => {
                    let layouts = ids
                        .iter()
                        .map(|id| res.bind_group_layout(*id))
                        .collect::<Result<Vec<_>>>()?;
                    Some(wgpu_device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: descriptor.label.as_deref(),
                        bind_group_layouts: &layouts,
                        push_constant_ranges: &[],
                    }))
                }
            };

            let vertex_module = res.module(descriptor.vertex.module, "vertex shader module")?;
            let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
                .vertex
                .buffers
                .iter()
                .map(|b| wgpu::VertexBufferLayout {
                    array_stride: b.array_stride,
                    step_mode: b.step_mode,
                    attributes: &b.attributes,
                })
                .collect();

            let fragment = match &descriptor.fragment {
                Some(fragment) => Some(wgpu::FragmentState {
                    module: res.module(fragment.module, "fragment shader module")?,
                    entry_point: &fragment.entry_point,
                    targets: &fragment.targets,
                }),
                None => None,
            };

            wgpu_device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = wgpu_device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: layout.as_ref(),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: &descriptor.vertex.entry_point,
                    buffers: &vertex_buffers,
                },
                primitive: descriptor.primitive,
                depth_stencil: descriptor.depth_stencil.clone(),
                multisample: descriptor.multisample,
                fragment,
                multiview: None,
            });
            if let Some(e) = pollster::block_on(wgpu_device.pop_error_scope()) {
                return Err(GraphicsError::ResourceCreation(
                    format!("Failed to create render pipeline: {}", e),
                )
                .into());
            }
            pipeline
        };

        Ok(res.pipelines.insert(Owned { value: pipeline, device }))
    }

    fn get_bind_group_layout(
        &self,
        pipeline: RenderPipelineId,
        index: u32,
    ) -> Result<BindGroupLayoutId> {
        let mut res = self.resources.borrow_mut();
        let entry = res.pipelines.get(pipeline).ok_or_else(|| invalid("render pipeline"))?;
        let device = entry.device;
        let layout = entry.value.get_bind_group_layout(index);
        Ok(res.bind_group_layouts.insert(Owned { value: layout, device }))
    }

    fn create_command_encoder(
        &self,
        device: DeviceId,
        descriptor: &CommandEncoderDescriptor,
    ) -> Result<CommandEncoderId> {
        let mut res = self.resources.borrow_mut();
        let encoder = res.device(device)?.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: descriptor.label.as_deref(),
        });
        Ok(res.encoders.insert(EncoderEntry {
            encoder,
            device,
            open_pass: None,
        }))
    }

    fn discard_command_encoder(&self, encoder: CommandEncoderId) {
        let mut res = self.resources.borrow_mut();
        if let Some(entry) = res.encoders.remove(encoder) {
            if let Some(pass) = entry.open_pass {
                res.passes.remove(pass);
            }
        }
    }

    fn begin_render_pass(
        &self,
        encoder: CommandEncoderId,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId> {
        let mut res = self.resources.borrow_mut();
        let entry = res.encoders.get(encoder).ok_or_else(|| invalid("command encoder"))?;
        if entry.open_pass.is_some() {
            return Err(GraphicsError::CommandExecution(
                "A render pass is already open on this encoder".to_string(),
            )
            .into());
        }

        let pass = res.passes.insert(PassEntry {
            encoder,
            descriptor: descriptor.clone(),
            commands: Vec::new(),
        });
        res.encoders[encoder].open_pass = Some(pass);
        Ok(pass)
    }

    fn set_pipeline(&self, pass: RenderPassId, pipeline: RenderPipelineId) {
        self.push_pass_command(pass, PassCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&self, pass: RenderPassId, index: u32, bind_group: BindGroupId) {
        self.push_pass_command(pass, PassCommand::SetBindGroup(index, bind_group));
    }

    fn set_vertex_buffer(&self, pass: RenderPassId, slot: u32, buffer: BufferId) {
        self.push_pass_command(pass, PassCommand::SetVertexBuffer(slot, buffer));
    }

    fn set_index_buffer(&self, pass: RenderPassId, buffer: BufferId, format: wgpu::IndexFormat) {
        self.push_pass_command(pass, PassCommand::SetIndexBuffer(buffer, format));
    }

    fn draw(
        &self,
        pass: RenderPassId,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        let (Some(vertices), Some(instances)) = (
            draw_range(first_vertex, vertex_count),
            draw_range(first_instance, instance_count),
        ) else {
            warn!("Draw range exceeds u32, command dropped");
            return;
        };
        self.push_pass_command(pass, PassCommand::Draw { vertices, instances });
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
        let (Some(indices), Some(instances)) = (
            draw_range(first_index, index_count),
            draw_range(first_instance, instance_count),
        ) else {
            warn!("Indexed draw range exceeds u32, command dropped");
            return;
        };
        self.push_pass_command(
            pass,
            PassCommand::DrawIndexed {
                indices,
                base_vertex,
                instances,
            },
        );
    }

    fn draw_indirect(&self, pass: RenderPassId, indirect_buffer: BufferId, indirect_offset: u64) {
        self.push_pass_command(
            pass,
            PassCommand::DrawIndirect {
                buffer: indirect_buffer,
                offset: indirect_offset,
            },
        );
    }

    fn end_render_pass(&self, pass: RenderPassId) -> Result<()> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let recorded = res.passes.remove(pass).ok_or_else(|| invalid("render pass"))?;
        let entry = res
            .encoders
            .get_mut(recorded.encoder)
            .ok_or_else(|| invalid("command encoder"))?;
        entry.open_pass = None;

        let views = &res.views;
        let lookup_view = |id: TextureViewId| {
            views.get(id).map(|v| &v.value).ok_or_else(|| invalid("texture view"))
        };

        let color_attachments = recorded
            .descriptor
            .color_attachments
            .iter()
            .map(|attachment| -> Result<Option<wgpu::RenderPassColorAttachment>> {
                match attachment {
                    Some(a) => Ok(Some(wgpu::RenderPassColorAttachment {
                        view: lookup_view(a.view)?,
                        resolve_target: a.resolve_target.map(lookup_view).transpose()?,
                        ops: a.ops,
                    })),
                    None => Ok(None),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_stencil_attachment = match &recorded.descriptor.depth_stencil_attachment {
            Some(a) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: lookup_view(a.view)?,
                depth_ops: a.depth_ops,
                stencil_ops: a.stencil_ops,
            }),
            None => None,
        };

        let buffers = &res.buffers;
        let lookup_buffer = |id: BufferId| {
            buffers.get(id).map(|b| &b.buffer).ok_or_else(|| invalid("buffer"))
        };

        let mut render_pass = entry.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: recorded.descriptor.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &recorded.commands {
            match command {
                PassCommand::SetPipeline(id) => {
                    let pipeline =
                        res.pipelines.get(*id).ok_or_else(|| invalid("render pipeline"))?;
                    render_pass.set_pipeline(&pipeline.value);
                }
                PassCommand::SetBindGroup(index, id) => {
                    let bind_group = res.bind_groups.get(*id).ok_or_else(|| invalid("bind group"))?;
                    render_pass.set_bind_group(*index, &bind_group.value, &[]);
                }
                PassCommand::SetVertexBuffer(slot, id) => {
                    render_pass.set_vertex_buffer(*slot, lookup_buffer(*id)?.slice(..));
                }
                PassCommand::SetIndexBuffer(id, format) => {
                    render_pass.set_index_buffer(lookup_buffer(*id)?.slice(..), *format);
                }
                PassCommand::Draw { vertices, instances } => {
                    render_pass.draw(vertices.clone(), instances.clone());
                }
                PassCommand::DrawIndexed { indices, base_vertex, instances } => {
                    render_pass.draw_indexed(indices.clone(), *base_vertex, instances.clone());
                }
                PassCommand::DrawIndirect { buffer, offset } => {
                    render_pass.draw_indirect(lookup_buffer(*buffer)?, *offset);
                }
            }
        }

        Ok(())
    }

    fn discard_render_pass(&self, pass: RenderPassId) {
        let mut res = self.resources.borrow_mut();
        if let Some(recorded) = res.passes.remove(pass) {
            if let Some(entry) = res.encoders.get_mut(recorded.encoder) {
                entry.open_pass = None;
            }
        }
    }

    fn finish_command_encoder(&self, encoder: CommandEncoderId) -> Result<CommandBufferId> {
        let mut res = self.resources.borrow_mut();
        let entry = res.encoders.get(encoder).ok_or_else(|| invalid("command encoder"))?;
        if entry.open_pass.is_some() {
            return Err(GraphicsError::CommandExecution(
                "Cannot finish an encoder with an open render pass".to_string(),
            )
            .into());
        }

        let entry = res.encoders.remove(encoder).ok_or_else(|| invalid("command encoder"))?;
        let buffer = entry.encoder.finish();
        Ok(res.command_buffers.insert(CommandBufferEntry {
            buffer,
            device: entry.device,
        }))
    }

    fn submit(&self, queue: QueueId, command_buffers: &[CommandBufferId]) -> Result<()> {
        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let device = res.queues.get(queue).ok_or_else(|| invalid("queue"))?.device;

        let buffers = command_buffers
            .iter()
            .map(|id| {
                res.command_buffers
                    .remove(*id)
                    .map(|c| c.buffer)
                    .ok_or_else(|| invalid("command buffer"))
            })
            .collect::<Result<Vec<_>>>()?;
        res.queues[queue].queue.submit(buffers);

        // 提交之后呈现该设备上已获取的帧
        let contexts: Vec<ContextId> = res
            .contexts
            .iter()
            .filter(|(_, c)| c.device == Some(device) && c.frame.is_some())
            .map(|(id, _)| id)
            .collect();
        for context in contexts {
            if let Some(frame) = res.drop_frame(context) {
                frame.surface_texture.present();
            }
        }

        Ok(())
    }

    fn write_buffer(
        &self,
        queue: QueueId,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let res = self.resources.borrow();
        let queue = res.queues.get(queue).ok_or_else(|| invalid("queue"))?;
        queue.queue.write_buffer(res.buffer(buffer)?, offset, data);
        Ok(())
    }

    fn copy_external_image_to_texture(
        &self,
        queue: QueueId,
        source: &ImageCopyExternalImage,
        destination: &ImageCopyTexture,
        size: wgpu::Extent3d,
    ) -> Result<()> {
        let res = self.resources.borrow();
        let queue = res.queues.get(queue).ok_or_else(|| invalid("queue"))?;
        let texture = match res.textures.get(destination.texture) {
            Some(TextureSlot::Owned { texture, .. }) => texture,
            Some(TextureSlot::SurfaceFrame { .. }) => {
                return Err(GraphicsError::UnsupportedFormat(
                    "Cannot copy an external image into a surface texture".to_string(),
                )
                .into());
            }
            None => return Err(invalid("texture")),
        };

        let swizzle = match texture.format() {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            other => {
                return Err(GraphicsError::UnsupportedFormat(format!(
                    "External image copy into {:?}",
                    other
                ))
                .into());
            }
        };
        let data = prepare_external_image(source, size, swizzle)?;

        queue.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: destination.mip_level,
                origin: destination.origin,
                aspect: destination.aspect,
            },
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            wgpu::Extent3d {
                depth_or_array_layers: 1,
                ..size
            },
        );
        Ok(())
    }
}

/// `first..first + count`，超出 `u32` 时返回 `None`
fn draw_range(first: u32, count: u32) -> Option<Range<u32>> {
    first.checked_add(count).map(|end| first..end)
}

/// 把外部图像整理成可以直接写入纹理的 RGBA8 / BGRA8 像素
///
/// 依次从 `origin` 裁剪、缩放到拷贝范围、按需上下翻转，最后按需交换 R 与 B 通道。
fn prepare_external_image(
    source: &ImageCopyExternalImage,
    size: wgpu::Extent3d,
    swizzle: bool,
) -> Result<Vec<u8>> {
    let mut image = source.source.to_rgba8()?;

    let (origin_x, origin_y) = source.origin;
    if origin_x > 0 || origin_y > 0 {
        let width = image.width().saturating_sub(origin_x);
        let height = image.height().saturating_sub(origin_y);
        image = image::imageops::crop_imm(&image, origin_x, origin_y, width, height).to_image();
    }
    if image.dimensions() != (size.width, size.height) {
        debug!("Scaling external image {:?} to {}x{}", image.dimensions(), size.width, size.height);
        image = image::imageops::resize(
            &image,
            size.width,
            size.height,
            image::imageops::FilterType::Triangle,
        );
    }
    if source.flip_y {
        image::imageops::flip_vertical_in_place(&mut image);
    }

    let mut data = image.into_raw();
    if swizzle {
        for pixel in data.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }
    Ok(data)
}

impl WgpuBackend {
    fn push_pass_command(&self, pass: RenderPassId, command: PassCommand) {
        match self.resources.borrow_mut().passes.get_mut(pass) {
            Some(entry) => entry.commands.push(command),
            None => warn!("Render pass command recorded on an unknown pass"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::external::{ImageData, ImageSource};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn image_data(width: u32, height: u32, pixels: &[[u8; 4]]) -> ImageSource {
        ImageData {
            width,
            height,
            data: pixels.concat(),
        }
        .into()
    }

    fn extent(width: u32, height: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    #[test]
    fn test_draw_range() {
        assert_eq!(draw_range(0, 3), Some(0..3));
        assert_eq!(draw_range(5, 2), Some(5..7));
        assert_eq!(draw_range(1, u32::MAX), None);
        assert_eq!(draw_range(u32::MAX, 1), None);
    }

    #[test]
    fn test_overflowing_draw_does_not_panic() {
        let backend = WgpuBackend::headless();
        backend.draw(RenderPassId::default(), u32::MAX, 1, 1, 0);
        backend.draw_indexed(RenderPassId::default(), 3, u32::MAX, 0, 0, 1);
    }

    #[test]
    fn test_flip_moves_top_row_to_bottom() {
        let source = ImageCopyExternalImage::flipped(image_data(1, 2, &[RED, BLUE]));
        let data = prepare_external_image(&source, extent(1, 2), false).unwrap();
        assert_eq!(&data[0..4], &BLUE);
        assert_eq!(&data[4..8], &RED);
    }

    #[test]
    fn test_unflipped_copy_keeps_row_order() {
        let source = ImageCopyExternalImage {
            source: image_data(1, 2, &[RED, BLUE]),
            origin: (0, 0),
            flip_y: false,
        };
        let data = prepare_external_image(&source, extent(1, 2), false).unwrap();
        assert_eq!(data, [RED, BLUE].concat());
    }

    #[test]
    fn test_bgra_destination_swaps_red_and_blue() {
        let source = ImageCopyExternalImage {
            source: image_data(1, 1, &[[10, 20, 30, 40]]),
            origin: (0, 0),
            flip_y: false,
        };
        let data = prepare_external_image(&source, extent(1, 1), true).unwrap();
        assert_eq!(data, vec![30, 20, 10, 40]);
    }

    #[test]
    fn test_source_scaled_to_copy_extent() {
        let source = ImageCopyExternalImage::flipped(image_data(2, 2, &[RED; 4]));
        let data = prepare_external_image(&source, extent(4, 4), false).unwrap();
        assert_eq!(data.len(), 64);
        assert!(data.chunks_exact(4).all(|pixel| pixel == RED));
    }

    #[test]
    fn test_origin_crops_source() {
        let source = ImageCopyExternalImage {
            source: image_data(2, 1, &[RED, BLUE]),
            origin: (1, 0),
            flip_y: false,
        };
        let data = prepare_external_image(&source, extent(1, 1), false).unwrap();
        assert_eq!(data, BLUE.to_vec());
    }

    #[test]
    fn test_mismatched_pixel_buffer_is_rejected() {
        let source = ImageCopyExternalImage::flipped(image_data(2, 2, &[RED]));
        assert!(prepare_external_image(&source, extent(2, 2), false).is_err());
    }
}
