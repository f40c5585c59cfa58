//! 设备协议描述符
//!
//! 与后端无关的资源描述符。描述符是拥有所有权的普通结构体，
//! 通过句柄 id 引用其他资源；格式、用途、尺寸、图元状态等纯值类型直接复用 `wgpu` 的类型。

use super::handle::{
    BindGroupLayoutId, BufferId, DeviceId, SamplerId, ShaderModuleId, TextureId, TextureViewId,
};

/// 请求适配器时的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

/// 请求设备时的描述符
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub label: Option<String>,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: Some("Main Device".to_string()),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// 绘制上下文配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfiguration {
    pub device: DeviceId,
    pub format: wgpu::TextureFormat,
    pub alpha_mode: wgpu::CompositeAlphaMode,
    pub usage: wgpu::TextureUsages,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    pub mapped_at_creation: bool,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: wgpu::BufferUsages) -> Self {
        Self {
            label: None,
            size,
            usage,
            mapped_at_creation: false,
        }
    }

    /// 设置调试名称
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: wgpu::Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: wgpu::TextureDimension,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub view_formats: Vec<wgpu::TextureFormat>,
}

impl TextureDescriptor {
    /// 单 mip、单采样的 2D 纹理
    pub fn new(
        size: wgpu::Extent3d,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            label: None,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureViewDescriptor {
    pub label: Option<String>,
    pub format: Option<wgpu::TextureFormat>,
    pub dimension: Option<wgpu::TextureViewDimension>,
    pub aspect: wgpu::TextureAspect,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
}

impl SamplerDescriptor {
    /// 线性过滤、边缘钳制
    pub fn linear() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        }
    }
}

/// WGSL 源码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleDescriptor {
    pub label: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor {
    pub label: Option<String>,
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
}

#[derive(Debug, Clone)]
pub struct BindGroupDescriptor {
    pub label: Option<String>,
    pub layout: BindGroupLayoutId,
    pub entries: Vec<BindGroupEntry>,
}

#[derive(Debug, Clone)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone)]
pub enum BindingResource {
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: Option<wgpu::BufferSize>,
    },
    TextureView(TextureViewId),
    Sampler(SamplerId),
}

impl BindingResource {
    /// 绑定整个缓冲区
    pub fn whole_buffer(buffer: BufferId) -> Self {
        BindingResource::Buffer {
            buffer,
            offset: 0,
            size: None,
        }
    }
}

/// 管线布局来源
#[derive(Debug, Clone, Default)]
pub enum PipelineLayout {
    /// 由着色器反射推导（WebGPU 的 `layout: 'auto'`）
    #[default]
    Auto,
    Explicit(Vec<BindGroupLayoutId>),
}

#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

#[derive(Debug, Clone)]
pub struct VertexState {
    pub module: ShaderModuleId,
    pub entry_point: String,
    pub buffers: Vec<VertexBufferLayout>,
}

#[derive(Debug, Clone)]
pub struct FragmentState {
    pub module: ShaderModuleId,
    pub entry_point: String,
    pub targets: Vec<Option<wgpu::ColorTargetState>>,
}

#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub layout: PipelineLayout,
    pub vertex: VertexState,
    pub primitive: wgpu::PrimitiveState,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub multisample: wgpu::MultisampleState,
    pub fragment: Option<FragmentState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandEncoderDescriptor {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassColorAttachment {
    pub view: TextureViewId,
    pub resolve_target: Option<TextureViewId>,
    pub ops: wgpu::Operations<wgpu::Color>,
}

impl RenderPassColorAttachment {
    /// 加载时清除为 `color`，结束时存储
    pub fn clear(view: TextureViewId, color: wgpu::Color) -> Self {
        Self {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
        }
    }

    pub fn with_resolve_target(mut self, resolve_target: TextureViewId) -> Self {
        self.resolve_target = Some(resolve_target);
        self
    }

    pub fn with_store_op(mut self, store: wgpu::StoreOp) -> Self {
        self.ops.store = store;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDepthStencilAttachment {
    pub view: TextureViewId,
    pub depth_ops: Option<wgpu::Operations<f32>>,
    pub stencil_ops: Option<wgpu::Operations<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<Option<RenderPassColorAttachment>>,
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}

/// 纹理拷贝目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopyTexture {
    pub texture: TextureId,
    pub mip_level: u32,
    pub origin: wgpu::Origin3d,
    pub aspect: wgpu::TextureAspect,
}

impl ImageCopyTexture {
    /// 整张纹理（mip 0，原点）
    pub fn whole(texture: TextureId) -> Self {
        Self {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        }
    }
}
