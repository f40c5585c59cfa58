//! 运行时初始化选项

use crate::core::Config;
use crate::gfx::descriptor::{AdapterOptions, DeviceDescriptor};

use super::surface::Surface;

/// `Runtime::initialize` 的选项
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// 调用方提供的表面；为 `None` 时创建分离画布
    pub surface: Option<Surface>,
    /// 请求适配器的选项
    pub adapter: AdapterOptions,
    /// 请求设备的描述符
    pub device: DeviceDescriptor,
    /// 绘制上下文的 alpha 合成模式；为 `None` 时使用 `Opaque`
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,
}

impl RuntimeOptions {
    /// 从配置构建选项
    pub fn from_config(config: &Config) -> Self {
        Self {
            surface: Some(
                Surface::new(config.surface.width, config.surface.height)
                    .with_label(config.surface.title.clone()),
            ),
            adapter: AdapterOptions {
                power_preference: config.graphics.power_preference.into(),
                force_fallback_adapter: false,
            },
            device: DeviceDescriptor::default(),
            alpha_mode: Some(config.graphics.alpha_mode.into()),
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_alpha_mode(mut self, alpha_mode: wgpu::CompositeAlphaMode) -> Self {
        self.alpha_mode = Some(alpha_mode);
        self
    }
}
