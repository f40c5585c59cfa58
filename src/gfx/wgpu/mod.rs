//! wgpu 图形后端实现
//!
//! wgpu 是一个跨平台的图形 API，可以在 Vulkan、Metal、DirectX 12、OpenGL 等多种后端上运行。
//! `WgpuBackend` 在它之上实现设备协议。

mod backend;

pub use backend::WgpuBackend;
