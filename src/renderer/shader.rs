//! 着色器模块包装

use crate::core::error::Result;
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::ShaderModuleDescriptor;
use crate::gfx::handle::ShaderModuleId;
use crate::runtime::Runtime;

/// 不可变的着色器模块
///
/// 构造时创建句柄，之后不再变化，也没有销毁操作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModule {
    handle: ShaderModuleId,
}

impl ShaderModule {
    pub fn new<B: GpuBackend>(
        runtime: &Runtime<B>,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<Self> {
        Ok(Self {
            handle: runtime.create_shader_module(descriptor)?,
        })
    }

    /// 从 WGSL 源码创建
    pub fn from_wgsl<B: GpuBackend>(runtime: &Runtime<B>, label: &str, code: &str) -> Result<Self> {
        Self::new(
            runtime,
            &ShaderModuleDescriptor {
                label: Some(label.to_string()),
                code: code.to_string(),
            },
        )
    }

    pub fn handle(&self) -> ShaderModuleId {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::recording::{Call, RecordingBackend};
    use crate::runtime::RuntimeOptions;

    #[test]
    fn test_from_wgsl() {
        let mut runtime = Runtime::new(RecordingBackend::new());
        assert!(ShaderModule::from_wgsl(&runtime, "noop", "").unwrap_err().is_not_initialized());

        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        let module = ShaderModule::from_wgsl(&runtime, "noop", "@vertex fn main() {}").unwrap();
        let created = runtime
            .backend()
            .count_calls(|c| {
                matches!(c, Call::CreateShaderModule { module: m, .. } if *m == module.handle())
            });
        assert_eq!(created, 1);
    }
}
