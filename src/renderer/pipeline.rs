//! 渲染管线与绑定组布局包装

use crate::core::error::Result;
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{BindGroupLayoutDescriptor, RenderPipelineDescriptor};
use crate::gfx::handle::{BindGroupLayoutId, RenderPipelineId};
use crate::runtime::Runtime;

/// 不可变的渲染管线
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPipeline {
    handle: RenderPipelineId,
}

impl RenderPipeline {
    pub fn new<B: GpuBackend>(
        runtime: &Runtime<B>,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<Self> {
        Ok(Self {
            handle: runtime.create_render_pipeline(descriptor)?,
        })
    }

    pub fn handle(&self) -> RenderPipelineId {
        self.handle
    }

    /// 第 `index` 组的绑定组布局（`auto` 布局由着色器推导）
    pub fn bind_group_layout<B: GpuBackend>(
        &self,
        runtime: &Runtime<B>,
        index: u32,
    ) -> Result<BindGroupLayout> {
        Ok(BindGroupLayout {
            handle: runtime.get_bind_group_layout(self.handle, index)?,
        })
    }
}

/// 不可变的绑定组布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupLayout {
    handle: BindGroupLayoutId,
}

impl BindGroupLayout {
    pub fn new<B: GpuBackend>(
        runtime: &Runtime<B>,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<Self> {
        Ok(Self {
            handle: runtime.create_bind_group_layout(descriptor)?,
        })
    }

    pub fn handle(&self) -> BindGroupLayoutId {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::descriptor::{FragmentState, PipelineLayout, VertexState};
    use crate::gfx::recording::{Call, RecordingBackend};
    use crate::renderer::ShaderModule;
    use crate::runtime::RuntimeOptions;

    #[test]
    fn test_auto_layout_bind_group_layout() {
        let mut runtime = Runtime::new(RecordingBackend::new());
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();

        let module = ShaderModule::from_wgsl(&runtime, "triangle", "").unwrap();
        let pipeline = RenderPipeline::new(
            &runtime,
            &RenderPipelineDescriptor {
                label: None,
                layout: PipelineLayout::Auto,
                vertex: VertexState {
                    module: module.handle(),
                    entry_point: "vs_main".to_string(),
                    buffers: Vec::new(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(FragmentState {
                    module: module.handle(),
                    entry_point: "fs_main".to_string(),
                    targets: vec![Some(wgpu::TextureFormat::Bgra8Unorm.into())],
                }),
            },
        )
        .unwrap();

        let layout = pipeline.bind_group_layout(&runtime, 0).unwrap();
        assert_eq!(
            runtime.backend().calls().last(),
            Some(&Call::GetBindGroupLayout {
                pipeline: pipeline.handle(),
                index: 0,
                layout: layout.handle(),
            })
        );
    }
}
