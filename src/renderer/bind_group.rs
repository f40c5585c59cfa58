//! 绑定组与采样器包装

use crate::core::error::Result;
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{BindGroupDescriptor, SamplerDescriptor};
use crate::gfx::handle::{BindGroupId, SamplerId};
use crate::runtime::Runtime;

/// 不可变的绑定组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroup {
    handle: BindGroupId,
}

impl BindGroup {
    pub fn new<B: GpuBackend>(
        runtime: &Runtime<B>,
        descriptor: &BindGroupDescriptor,
    ) -> Result<Self> {
        Ok(Self {
            handle: runtime.create_bind_group(descriptor)?,
        })
    }

    pub fn handle(&self) -> BindGroupId {
        self.handle
    }
}

/// 不可变的采样器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampler {
    handle: SamplerId,
}

impl Sampler {
    pub fn new<B: GpuBackend>(
        runtime: &Runtime<B>,
        descriptor: &SamplerDescriptor,
    ) -> Result<Self> {
        Ok(Self {
            handle: runtime.create_sampler(descriptor)?,
        })
    }

    pub fn handle(&self) -> SamplerId {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::descriptor::{
        BindGroupEntry, BindGroupLayoutDescriptor, BindingResource, BufferDescriptor,
    };
    use crate::gfx::recording::{Call, RecordingBackend};
    use crate::renderer::{BindGroupLayout, Buffer};
    use crate::runtime::RuntimeOptions;

    #[test]
    fn test_bind_group_over_buffer_and_sampler() {
        let mut runtime = Runtime::new(RecordingBackend::new());
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();

        let layout = BindGroupLayout::new(
            &runtime,
            &BindGroupLayoutDescriptor {
                label: None,
                entries: vec![wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            },
        )
        .unwrap();
        let buffer =
            Buffer::new(&runtime, BufferDescriptor::new(16, wgpu::BufferUsages::UNIFORM)).unwrap();
        let sampler = Sampler::new(&runtime, &SamplerDescriptor::linear()).unwrap();

        let bind_group = BindGroup::new(
            &runtime,
            &BindGroupDescriptor {
                label: Some("material".to_string()),
                layout: layout.handle(),
                entries: vec![
                    BindGroupEntry {
                        binding: 0,
                        resource: BindingResource::whole_buffer(buffer.handle().unwrap()),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: BindingResource::Sampler(sampler.handle()),
                    },
                ],
            },
        )
        .unwrap();

        assert_eq!(
            runtime.backend().calls().last(),
            Some(&Call::CreateBindGroup {
                device: runtime.device().unwrap(),
                bind_group: bind_group.handle(),
                layout: layout.handle(),
            })
        );
    }
}
