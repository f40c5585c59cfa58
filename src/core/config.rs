//! 配置管理模块
//!
//! 提供运行时配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [surface]
//! width = 800
//! height = 600
//! title = "GDY"
//! resizable = true
//!
//! [graphics]
//! power_preference = "high"   # 或 "low", "none"
//! alpha_mode = "premultiplied" # auto, opaque, premultiplied, postmultiplied
//! msaa_samples = 4
//! vsync = true
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// 运行时配置
///
/// 可以从配置文件加载，也可以通过代码构建。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 表面（画布）配置
    #[serde(default)]
    pub surface: SurfaceConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 表面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// 初始宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 初始高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 适配器电源偏好
    #[serde(default = "default_power_preference")]
    pub power_preference: PowerPreference,

    /// 绘制上下文的 alpha 合成模式
    #[serde(default = "default_alpha_mode")]
    pub alpha_mode: AlphaMode,

    /// MSAA 采样数
    #[serde(default = "default_msaa")]
    pub msaa_samples: u32,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,
}

/// 适配器电源偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    /// 不指定
    None,
    /// 低功耗（集成显卡）
    Low,
    /// 高性能（独立显卡）
    High,
}

/// alpha 合成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMode {
    Auto,
    Opaque,
    Premultiplied,
    Postmultiplied,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_title() -> String { "GDY".to_string() }
fn default_resizable() -> bool { true }
fn default_power_preference() -> PowerPreference { PowerPreference::High }
fn default_alpha_mode() -> AlphaMode { AlphaMode::Premultiplied }
fn default_msaa() -> u32 { 4 }
fn default_vsync() -> bool { true }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "gdy.log".to_string() }

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            power_preference: default_power_preference(),
            alpha_mode: default_alpha_mode(),
            msaa_samples: default_msaa(),
            vsync: default_vsync(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Config` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--width <value>`: 设置表面宽度
    /// - `--height <value>`: 设置表面高度
    /// - `--msaa <value>`: 设置 MSAA 采样数
    /// - `--low-power`: 优先选择低功耗适配器
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--low-power") {
            self.graphics.power_preference = PowerPreference::Low;
        }

        if let Some(width) = parse_flag_value(&args, "--width") {
            self.surface.width = width;
        }

        if let Some(height) = parse_flag_value(&args, "--height") {
            self.surface.height = height;
        }

        if let Some(samples) = parse_flag_value(&args, "--msaa") {
            self.graphics.msaa_samples = samples;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "surface.width/height".to_string(),
                reason: "Surface dimensions must be greater than 0".to_string(),
            }.into());
        }

        // WebGPU 只保证 1 和 4 两种采样数
        if !matches!(self.graphics.msaa_samples, 1 | 4) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.msaa_samples".to_string(),
                reason: "MSAA samples must be 1 or 4".to_string(),
            }.into());
        }

        Ok(())
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<u32> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(preference: PowerPreference) -> Self {
        match preference {
            PowerPreference::None => wgpu::PowerPreference::None,
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl From<AlphaMode> for wgpu::CompositeAlphaMode {
    fn from(mode: AlphaMode) -> Self {
        match mode {
            AlphaMode::Auto => wgpu::CompositeAlphaMode::Auto,
            AlphaMode::Opaque => wgpu::CompositeAlphaMode::Opaque,
            AlphaMode::Premultiplied => wgpu::CompositeAlphaMode::PreMultiplied,
            AlphaMode::Postmultiplied => wgpu::CompositeAlphaMode::PostMultiplied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.surface.width, 800);
        assert_eq!(config.surface.height, 600);
        assert_eq!(config.graphics.power_preference, PowerPreference::High);
        assert_eq!(config.graphics.msaa_samples, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.surface.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.msaa_samples = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            "[graphics]\npower_preference = \"low\"\nalpha_mode = \"opaque\"\n",
        )
        .unwrap();
        assert_eq!(config.graphics.power_preference, PowerPreference::Low);
        assert_eq!(config.graphics.alpha_mode, AlphaMode::Opaque);
        assert_eq!(config.graphics.msaa_samples, 4);
        assert_eq!(config.surface.title, "GDY");
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml_str("[surface]\nwidth = \"wide\"\n").is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "gdy",
            "--width",
            "1024",
            "--height",
            "768",
            "--msaa",
            "1",
            "--low-power",
        ]);
        assert_eq!(config.surface.width, 1024);
        assert_eq!(config.surface.height, 768);
        assert_eq!(config.graphics.msaa_samples, 1);
        assert_eq!(config.graphics.power_preference, PowerPreference::Low);

        // 无效值保持原样
        config.apply_args(["gdy", "--width", "abc"]);
        assert_eq!(config.surface.width, 1024);
    }

    #[test]
    fn test_wgpu_conversions() {
        assert_eq!(
            wgpu::PowerPreference::from(PowerPreference::Low),
            wgpu::PowerPreference::LowPower
        );
        assert_eq!(
            wgpu::CompositeAlphaMode::from(AlphaMode::Premultiplied),
            wgpu::CompositeAlphaMode::PreMultiplied
        );
    }
}
