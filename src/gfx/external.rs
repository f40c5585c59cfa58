//! 外部图像源
//!
//! `copy_external_image_to_texture` 的输入。图像源分成两族：
//! 位图/像素缓冲区用 `width`/`height` 描述尺寸，解码后的视频帧用
//! `coded_width`/`coded_height` 描述尺寸，求尺寸时必须按族分支。

use std::sync::Arc;

use image::RgbaImage;

use crate::core::error::{GraphicsError, Result};

/// 原始 RGBA8 像素缓冲区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// 行优先、无填充的 RGBA8 数据
    pub data: Vec<u8>,
}

/// 解码后的视频帧（RGBA8）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub coded_width: u32,
    pub coded_height: u32,
    pub data: Vec<u8>,
}

/// 外部图像源
///
/// 内部以 `Arc` 共享，克隆开销很小；纹理保留一份以便调整尺寸后重新上传。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 已解码的位图
    Bitmap(Arc<RgbaImage>),
    /// 原始像素缓冲区
    ImageData(Arc<ImageData>),
    /// 视频帧
    VideoFrame(Arc<VideoFrame>),
}

impl ImageSource {
    /// 图像尺寸 (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageSource::Bitmap(image) => (image.width(), image.height()),
            ImageSource::ImageData(data) => (data.width, data.height),
            ImageSource::VideoFrame(frame) => (frame.coded_width, frame.coded_height),
        }
    }

    /// 三维尺寸，深度恒为 1
    pub fn extent(&self) -> wgpu::Extent3d {
        let (width, height) = self.dimensions();
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// 转换为 RGBA8 图像
    ///
    /// 像素缓冲区长度与尺寸不符时返回错误。
    pub fn to_rgba8(&self) -> Result<RgbaImage> {
        match self {
            ImageSource::Bitmap(image) => Ok(image.as_ref().clone()),
            ImageSource::ImageData(data) => {
                raw_to_image(data.width, data.height, data.data.clone())
            }
            ImageSource::VideoFrame(frame) => {
                raw_to_image(frame.coded_width, frame.coded_height, frame.data.clone())
            }
        }
    }

    /// 两个图像源是否引用同一份数据
    pub fn ptr_eq(&self, other: &ImageSource) -> bool {
        match (self, other) {
            (ImageSource::Bitmap(a), ImageSource::Bitmap(b)) => Arc::ptr_eq(a, b),
            (ImageSource::ImageData(a), ImageSource::ImageData(b)) => Arc::ptr_eq(a, b),
            (ImageSource::VideoFrame(a), ImageSource::VideoFrame(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        ImageSource::Bitmap(Arc::new(image))
    }
}

impl From<ImageData> for ImageSource {
    fn from(data: ImageData) -> Self {
        ImageSource::ImageData(Arc::new(data))
    }
}

impl From<VideoFrame> for ImageSource {
    fn from(frame: VideoFrame) -> Self {
        ImageSource::VideoFrame(Arc::new(frame))
    }
}

fn raw_to_image(width: u32, height: u32, data: Vec<u8>) -> Result<RgbaImage> {
    let len = data.len();
    RgbaImage::from_raw(width, height, data).ok_or_else(|| {
        GraphicsError::ResourceCreation(format!(
            "pixel buffer of {} bytes does not match {}x{} RGBA8",
            len, width, height
        ))
        .into()
    })
}

/// 外部图像拷贝源
#[derive(Debug, Clone)]
pub struct ImageCopyExternalImage {
    pub source: ImageSource,
    /// 源图像中的起点 (x, y)
    pub origin: (u32, u32),
    /// 是否垂直翻转（图像原点在左上，表面原点在左下）
    pub flip_y: bool,
}

impl ImageCopyExternalImage {
    /// 整张图像，垂直翻转
    pub fn flipped(source: ImageSource) -> Self {
        Self {
            source,
            origin: (0, 0),
            flip_y: true,
        }
    }
}
