//! GDY - WebGPU 风格设备协议之上的资源生命周期层
//!
//! 本库把一个异步获取、手动释放的设备协议包装成一组带生命周期的对象：
//! 运行时负责适配器、设备和绘制表面；资源对象负责各自的设备句柄；
//! 命令编码器以链式调用录制并提交一帧。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（日志、配置、错误处理、事件系统）
//! - `gfx`: 设备协议抽象层（`GpuBackend` trait、wgpu 实现、录制实现）
//! - `runtime`: 运行时，持有设备并管理绘制表面
//! - `renderer`: 资源对象和命令编码器
//!
//! # 使用示例
//!
//! ```no_run
//! use gdy::gfx::WgpuBackend;
//! use gdy::renderer::{CommandEncoder, RenderPipeline};
//! use gdy::runtime::{Runtime, RuntimeOptions};
//!
//! # fn frame(pipeline: &RenderPipeline) -> gdy::core::Result<()> {
//! let mut runtime = Runtime::new(WgpuBackend::headless());
//! pollster::block_on(runtime.initialize(RuntimeOptions::default()))?;
//!
//! CommandEncoder::new(&runtime, None)?
//!     .begin_render_pass(None)?
//!     .set_pipeline(pipeline)
//!     .draw(3)
//!     .end()?
//!     .submit()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
pub mod runtime;
