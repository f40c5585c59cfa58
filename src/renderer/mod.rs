//! 资源对象层
//!
//! 在 `Runtime` 之上为每类设备资源提供一个薄包装：
//!
//! - `Buffer` / `Texture`：拥有设备句柄，支持显式销毁
//! - `ShaderModule` / `RenderPipeline` / `BindGroupLayout` / `BindGroup` / `Sampler`：创建后不可变
//! - `CommandEncoder` / `RenderPassEncoder`：一次性的链式命令构建器
//!
//! 所有包装都只保存句柄，每次操作时借用 `Runtime`。

pub mod bind_group;
pub mod buffer;
pub mod command;
pub mod pipeline;
pub mod shader;
pub mod texture;

pub use bind_group::{BindGroup, Sampler};
pub use buffer::Buffer;
pub use command::{CommandEncoder, RenderPassEncoder};
pub use pipeline::{BindGroupLayout, RenderPipeline};
pub use shader::ShaderModule;
pub use texture::Texture;
