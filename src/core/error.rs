//! 错误处理模块
//!
//! 定义了运行时和资源包装层使用的统一错误类型。
//!
//! # 错误分类
//!
//! - `NotInitialized`：在 `Runtime::initialize` 完成之前（或 `uninitialize` 之后）
//!   访问运行时
//! - `ResourceDestroyed`：在 `destroy` 之后继续使用纹理或缓冲区
//! - `Graphics`：设备协议层返回的错误（适配器/设备获取失败、无效句柄等）
//!
//! 所有错误都在调用点同步返回，内部不做任何重试。

use std::fmt;

/// 统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, GdyError>;

/// GDY 的错误类型
#[derive(Debug)]
pub enum GdyError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 图像解码错误
    Image(image::ImageError),

    /// 运行时尚未初始化（或已被拆除）
    NotInitialized,

    /// 资源已被销毁
    ResourceDestroyed(ResourceKind),
}

/// 可被销毁的资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture,
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 没有可用的适配器
    AdapterUnavailable(String),

    /// 设备创建失败
    DeviceCreation(String),

    /// 表面（绘制上下文）错误
    Surface(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 句柄未知或已失效
    InvalidHandle(String),

    /// 渲染命令执行失败
    CommandExecution(String),

    /// 不支持的纹理格式
    UnsupportedFormat(String),
}

impl fmt::Display for GdyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GdyError::Config(e) => write!(f, "Configuration error: {}", e),
            GdyError::Graphics(e) => write!(f, "Graphics error: {}", e),
            GdyError::Io(e) => write!(f, "IO error: {}", e),
            GdyError::Image(e) => write!(f, "Image error: {}", e),
            GdyError::NotInitialized => write!(f, "Runtime not initialized"),
            GdyError::ResourceDestroyed(kind) => write!(f, "{} is destroyed", kind),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Buffer => write!(f, "Buffer"),
            ResourceKind::Texture => write!(f, "Texture"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::AdapterUnavailable(msg) => write!(f, "No suitable adapter: {}", msg),
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::Surface(msg) => write!(f, "Surface error: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::InvalidHandle(msg) => write!(f, "Invalid handle: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
        }
    }
}

impl std::error::Error for GdyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GdyError::Io(e) => Some(e),
            GdyError::Image(e) => Some(e),
            GdyError::Config(e) => Some(e),
            GdyError::Graphics(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for GdyError {
    fn from(err: std::io::Error) -> Self {
        GdyError::Io(err)
    }
}

impl From<image::ImageError> for GdyError {
    fn from(err: image::ImageError) -> Self {
        GdyError::Image(err)
    }
}

impl From<ConfigError> for GdyError {
    fn from(err: ConfigError) -> Self {
        GdyError::Config(err)
    }
}

impl From<GraphicsError> for GdyError {
    fn from(err: GraphicsError) -> Self {
        GdyError::Graphics(err)
    }
}

impl GdyError {
    /// 是否为 `NotInitialized`
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, GdyError::NotInitialized)
    }

    /// 是否为指定种类资源的 `ResourceDestroyed`
    pub fn is_destroyed(&self, kind: ResourceKind) -> bool {
        matches!(self, GdyError::ResourceDestroyed(k) if *k == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(GdyError::NotInitialized.to_string(), "Runtime not initialized");
        assert_eq!(
            GdyError::ResourceDestroyed(ResourceKind::Texture).to_string(),
            "Texture is destroyed"
        );

        let err: GdyError = GraphicsError::InvalidHandle("buffer".to_string()).into();
        assert_eq!(err.to_string(), "Graphics error: Invalid handle: buffer");
    }

    #[test]
    fn test_error_predicates() {
        assert!(GdyError::NotInitialized.is_not_initialized());
        let destroyed = GdyError::ResourceDestroyed(ResourceKind::Buffer);
        assert!(destroyed.is_destroyed(ResourceKind::Buffer));
        assert!(!destroyed.is_destroyed(ResourceKind::Texture));
    }
}
