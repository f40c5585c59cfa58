//! 缓冲区包装
//!
//! `Buffer` 拥有一个设备缓冲区句柄。句柄只有"存活"和"已销毁"两种状态，
//! 销毁之后除 `destroy` 以外的操作都返回 `GdyError::ResourceDestroyed`。

use crate::core::error::{GdyError, ResourceKind, Result};
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::BufferDescriptor;
use crate::gfx::handle::BufferId;
use crate::runtime::Runtime;

/// GPU 缓冲区
#[derive(Debug)]
pub struct Buffer {
    descriptor: BufferDescriptor,
    handle: Option<BufferId>,
}

impl Buffer {
    /// 立即创建设备缓冲区
    pub fn new<B: GpuBackend>(runtime: &Runtime<B>, descriptor: BufferDescriptor) -> Result<Self> {
        let handle = runtime.create_buffer(&descriptor)?;
        Ok(Self {
            descriptor,
            handle: Some(handle),
        })
    }

    /// 设备句柄；销毁后返回 `ResourceDestroyed`
    pub fn handle(&self) -> Result<BufferId> {
        self.handle.ok_or(GdyError::ResourceDestroyed(ResourceKind::Buffer))
    }

    /// 缓冲区字节数
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.descriptor.usage
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    /// 在偏移 0 处写入数据
    pub fn write<B: GpuBackend>(&self, runtime: &Runtime<B>, data: &[u8]) -> Result<()> {
        self.write_at(runtime, 0, data)
    }

    /// 在指定偏移处写入数据
    pub fn write_at<B: GpuBackend>(
        &self,
        runtime: &Runtime<B>,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        runtime.write_buffer(self.handle()?, offset, data)
    }

    /// 以字节形式写入一个 `Pod` 值
    pub fn write_pod<B: GpuBackend, T: bytemuck::Pod>(
        &self,
        runtime: &Runtime<B>,
        value: &T,
    ) -> Result<()> {
        self.write(runtime, bytemuck::bytes_of(value))
    }

    /// 释放设备缓冲区，重复调用无副作用
    pub fn destroy<B: GpuBackend>(&mut self, runtime: &Runtime<B>) {
        if let Some(handle) = self.handle.take() {
            // 运行时已拆除时句柄随设备一起失效
            if runtime.destroy_buffer(handle).is_err() {
                tracing::debug!("Buffer released after runtime teardown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::recording::{Call, RecordingBackend};
    use crate::runtime::RuntimeOptions;

    fn runtime() -> Runtime<RecordingBackend> {
        let mut runtime = Runtime::new(RecordingBackend::new());
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        runtime
    }

    fn uniform(size: u64) -> BufferDescriptor {
        BufferDescriptor::new(size, wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST)
    }

    #[test]
    fn test_write_and_handle_succeed_before_destroy() {
        let runtime = runtime();
        let buffer = Buffer::new(&runtime, uniform(16)).unwrap();
        let handle = buffer.handle().unwrap();

        for _ in 0..3 {
            buffer.write(&runtime, &[1, 2, 3, 4]).unwrap();
            assert_eq!(buffer.handle().unwrap(), handle);
        }

        let writes = runtime.backend().count_calls(|c| {
            matches!(
                c,
                Call::WriteBuffer { buffer, offset: 0, data, .. }
                    if *buffer == handle && data == &[1, 2, 3, 4]
            )
        });
        assert_eq!(writes, 3);
    }

    #[test]
    fn test_write_and_handle_fail_after_destroy() {
        let runtime = runtime();
        let mut buffer = Buffer::new(&runtime, uniform(16)).unwrap();
        let handle = buffer.handle().unwrap();

        buffer.destroy(&runtime);
        assert!(buffer.is_destroyed());
        assert!(runtime.backend().is_buffer_destroyed(handle));
        assert!(buffer.handle().unwrap_err().is_destroyed(ResourceKind::Buffer));
        assert!(buffer.write(&runtime, &[0; 4]).unwrap_err().is_destroyed(ResourceKind::Buffer));
        let err = buffer.write_at(&runtime, 4, &[0; 4]).unwrap_err();
        assert!(err.is_destroyed(ResourceKind::Buffer));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let runtime = runtime();
        let mut buffer = Buffer::new(&runtime, uniform(16)).unwrap();
        buffer.destroy(&runtime);
        buffer.destroy(&runtime);
        assert_eq!(runtime.backend().count_calls(|c| matches!(c, Call::DestroyBuffer { .. })), 1);
    }

    #[test]
    fn test_write_pod() {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Tint {
            color: [f32; 4],
        }

        let runtime = runtime();
        let buffer = Buffer::new(&runtime, uniform(16)).unwrap();
        buffer.write_pod(&runtime, &Tint { color: [1.0, 0.0, 0.0, 1.0] }).unwrap();

        let calls = runtime.backend().calls();
        let Some(Call::WriteBuffer { data, .. }) = calls.last() else {
            panic!("expected a buffer write");
        };
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..4], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn test_create_requires_initialized_runtime() {
        let runtime = Runtime::new(RecordingBackend::new());
        assert!(Buffer::new(&runtime, uniform(16)).unwrap_err().is_not_initialized());
    }
}
