//! 图形后端模块
//!
//! 本模块把宿主的设备协议抽象成 `GpuBackend` trait，并提供两个实现：
//! - wgpu：跨平台的真实 GPU 后端（支持 Vulkan、Metal、DX12、OpenGL）
//! - recording：不接触 GPU、只记录调用序列的测试替身
//!
//! 设备协议返回的对象都是类型化句柄（见 `handle`），
//! 创建资源使用与后端无关的描述符（见 `descriptor`）。

pub mod backend;
pub mod descriptor;
pub mod external;
pub mod handle;
pub mod recording;
pub mod wgpu;

pub use backend::GpuBackend;
pub use external::{ImageCopyExternalImage, ImageData, ImageSource, VideoFrame};
pub use recording::{Call, RecordingBackend};
pub use self::wgpu::WgpuBackend;
