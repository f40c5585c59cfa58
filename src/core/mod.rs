//! 核心功能模块
//!
//! 本模块提供与具体图形 API 无关的基础功能：日志系统、配置管理、错误处理和事件系统。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件加载设置
//! - `error`：错误处理，定义统一的错误类型
//! - `event`：事件系统，用于表面尺寸变化通知

pub mod log;
pub mod config;
pub mod error;
pub mod event;

// 重新导出常用类型，方便使用
pub use error::{Result, GdyError, GraphicsError, ResourceKind};
pub use config::Config;
pub use event::{Event, EventType, EventDispatcher, SurfaceResizeEvent, DrawEvent};
