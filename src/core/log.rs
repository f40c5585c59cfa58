//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! # 使用示例
//!
//! ```no_run
//! use gdy::core::log::{self, LogLevel};
//!
//! // 初始化日志系统
//! log::init_logger(LogLevel::Info, false, None);
//!
//! // 结构化日志
//! tracing::info!(width = 800, height = 600, "Surface created");
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

pub use super::config::LogLevel;

/// 初始化日志系统
///
/// 必须在程序开始时调用一次。`RUST_LOG` 环境变量优先于 `level`。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "gdy.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    if file_output {
        let log_path = log_file_path.unwrap_or("gdy.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("gdy.log");

        // 每天滚动
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        // wgpu 在 info 级别非常吵
        LogLevel::Info => "info,wgpu_core=warn,wgpu_hal=warn",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// 运行时日志 - Info 级别
#[macro_export]
macro_rules! runtime_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "gdy::runtime", $($arg)*)
    };
}

/// 运行时日志 - Warn 级别
#[macro_export]
macro_rules! runtime_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "gdy::runtime", $($arg)*)
    };
}

/// 运行时日志 - Error 级别
#[macro_export]
macro_rules! runtime_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "gdy::runtime", $($arg)*)
    };
}

/// 应用层日志 - Info 级别
#[macro_export]
macro_rules! app_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "gdy::app", $($arg)*)
    };
}

/// 应用层日志 - Warn 级别
#[macro_export]
macro_rules! app_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "gdy::app", $($arg)*)
    };
}

/// 应用层日志 - Error 级别
#[macro_export]
macro_rules! app_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "gdy::app", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_filter_directive_parses() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert!(filter_directive(level).parse::<EnvFilter>().is_ok());
        }
    }
}
