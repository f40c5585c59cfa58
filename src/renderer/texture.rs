//! 纹理包装
//!
//! `Texture` 是唯一拥有非平凡生命周期的资源：
//! - 保留创建描述符，用于调整尺寸时重新创建
//! - 懒创建并缓存一个默认视图
//! - 保留最近一次拷贝的外部图像源，调整尺寸后自动重新上传
//!
//! 包装对象在调整尺寸前后保持同一个身份，底层句柄则每次都被替换。

use crate::core::error::{GdyError, GraphicsError, ResourceKind, Result};
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{ImageCopyTexture, TextureDescriptor, TextureViewDescriptor};
use crate::gfx::external::{ImageCopyExternalImage, ImageSource};
use crate::gfx::handle::{TextureId, TextureViewId};
use crate::runtime::Runtime;

/// GPU 纹理
#[derive(Debug)]
pub struct Texture {
    descriptor: TextureDescriptor,
    handle: Option<TextureId>,
    view: Option<TextureViewId>,
    source: Option<ImageCopyExternalImage>,
}

impl Texture {
    /// 立即创建设备纹理
    pub fn new<B: GpuBackend>(runtime: &Runtime<B>, descriptor: TextureDescriptor) -> Result<Self> {
        let handle = runtime.create_texture(&descriptor)?;
        Ok(Self {
            descriptor,
            handle: Some(handle),
            view: None,
            source: None,
        })
    }

    /// 读取并解码图像，创建同尺寸的纹理并上传
    ///
    /// 支持本地路径和 `file://` URL；启用 `http` 特性后还支持 `http(s)://`。
    pub async fn from_url<B: GpuBackend>(
        runtime: &Runtime<B>,
        url: &str,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<Self> {
        let bytes = fetch_bytes(url).await?;
        let image = image::load_from_memory(&bytes)?.to_rgba8();
        tracing::debug!("Decoded {} ({}x{})", url, image.width(), image.height());
        Self::from_image_source(runtime, image.into(), format, usage)
    }

    /// 以图像源的尺寸创建纹理，并做一次垂直翻转的初始拷贝
    pub fn from_image_source<B: GpuBackend>(
        runtime: &Runtime<B>,
        source: ImageSource,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<Self> {
        let descriptor = TextureDescriptor::new(Self::extent_of(&source), format, usage);
        let mut texture = Self::new(runtime, descriptor)?;
        texture.copy(runtime, ImageCopyExternalImage::flipped(source))?;
        Ok(texture)
    }

    /// 图像源的三维尺寸（深度为 1）
    pub fn extent_of(source: &ImageSource) -> wgpu::Extent3d {
        source.extent()
    }

    /// 设备句柄；销毁后返回 `ResourceDestroyed`
    pub fn handle(&self) -> Result<TextureId> {
        self.handle.ok_or(GdyError::ResourceDestroyed(ResourceKind::Texture))
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> wgpu::Extent3d {
        self.descriptor.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.descriptor.format
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    /// 最近一次拷贝使用的图像源
    pub fn source(&self) -> Option<&ImageCopyExternalImage> {
        self.source.as_ref()
    }

    /// 把外部图像拷贝进当前句柄的完整范围
    ///
    /// 图像源会被保留，调整尺寸之后自动重新拷贝。
    pub fn copy<B: GpuBackend>(
        &mut self,
        runtime: &Runtime<B>,
        source: ImageCopyExternalImage,
    ) -> Result<&mut Self> {
        let handle = self.handle()?;
        let size = wgpu::Extent3d {
            depth_or_array_layers: 1,
            ..self.descriptor.size
        };
        let destination = ImageCopyTexture::whole(handle);

        self.source = Some(source);
        if let Some(source) = &self.source {
            runtime.copy_external_image_to_texture(source, &destination, size)?;
        }
        Ok(self)
    }

    /// 调整纹理尺寸
    ///
    /// 用更新后的描述符创建新句柄并销毁旧句柄；之前缓存过视图时立即在新句柄上
    /// 重新创建视图，之前拷贝过图像源时重新拷贝。
    pub fn resize<B: GpuBackend>(
        &mut self,
        runtime: &Runtime<B>,
        size: wgpu::Extent3d,
    ) -> Result<()> {
        let old_handle = self.handle()?;

        let mut descriptor = self.descriptor.clone();
        descriptor.size = size;
        let new_handle = runtime.create_texture(&descriptor)?;

        self.descriptor = descriptor;
        self.handle = Some(new_handle);
        runtime.destroy_texture(old_handle)?;

        if let Some(old_view) = self.view.take() {
            let view = runtime.create_texture_view(new_handle, &TextureViewDescriptor::default());
            runtime.release_texture_view(old_view)?;
            self.view = Some(view?);
        }

        if let Some(source) = self.source.take() {
            self.copy(runtime, source)?;
        }

        tracing::debug!("Texture resized to {}x{}", size.width, size.height);
        Ok(())
    }

    /// 缓存的默认视图，第一次调用时创建
    pub fn view<B: GpuBackend>(&mut self, runtime: &Runtime<B>) -> Result<TextureViewId> {
        let handle = self.handle()?;
        match self.view {
            Some(view) => Ok(view),
            None => {
                let view = runtime.create_texture_view(handle, &TextureViewDescriptor::default())?;
                self.view = Some(view);
                Ok(view)
            }
        }
    }

    /// 创建一个新视图，不经过缓存
    pub fn create_view<B: GpuBackend>(
        &self,
        runtime: &Runtime<B>,
        descriptor: Option<&TextureViewDescriptor>,
    ) -> Result<TextureViewId> {
        let default = TextureViewDescriptor::default();
        runtime.create_texture_view(self.handle()?, descriptor.unwrap_or(&default))
    }

    /// 释放设备纹理和缓存的视图，重复调用无副作用
    pub fn destroy<B: GpuBackend>(&mut self, runtime: &Runtime<B>) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let view = self.view.take();
        let released = runtime.destroy_texture(handle).and_then(|_| match view {
            Some(view) => runtime.release_texture_view(view),
            None => Ok(()),
        });
        if released.is_err() {
            // 运行时已拆除时句柄随设备一起失效
            tracing::debug!("Texture released after runtime teardown");
        }
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return fetch_http(url).await;
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    Ok(std::fs::read(path)?)
}

#[cfg(feature = "http")]
async fn fetch_http(url: &str) -> Result<Vec<u8>> {
    let url = url::Url::parse(url).map_err(|e| {
        GraphicsError::ResourceCreation(format!("Invalid texture URL {}: {}", url, e))
    })?;

    let response = ehttp::fetch_async(ehttp::Request::get(url.as_str()))
        .await
        .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to fetch {}: {}", url, e)))?;
    if !response.ok {
        return Err(GraphicsError::ResourceCreation(format!(
            "Failed to fetch {}: HTTP {} {}",
            url, response.status, response.status_text
        ))
        .into());
    }

    Ok(response.bytes)
}

#[cfg(not(feature = "http"))]
async fn fetch_http(url: &str) -> Result<Vec<u8>> {
    Err(GraphicsError::ResourceCreation(format!(
        "Fetching {} requires the `http` feature",
        url
    ))
    .into())
}
