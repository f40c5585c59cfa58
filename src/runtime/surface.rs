//! 呈现表面
//!
//! 与窗口系统无关的"画布"：只记录标签和当前像素尺寸。
//! 尺寸由运行时的尺寸观察写入，应用代码只读。

/// 呈现表面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    label: Option<String>,
    width: u32,
    height: u32,
}

impl Surface {
    /// 分离画布的默认宽度
    pub const DETACHED_WIDTH: u32 = 300;
    /// 分离画布的默认高度
    pub const DETACHED_HEIGHT: u32 = 150;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            label: None,
            width,
            height,
        }
    }

    /// 没有调用方提供表面时创建的分离画布（300×150）
    pub fn detached() -> Self {
        Self {
            label: Some("detached".to_string()),
            width: Self::DETACHED_WIDTH,
            height: Self::DETACHED_HEIGHT,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 三维尺寸，深度恒为 1
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}
