//! 命令编码模块
//!
//! `CommandEncoder` 与 `RenderPassEncoder` 组成一个两态的链式构建器：
//!
//! ```ignore
//! CommandEncoder::new(&runtime, None)?
//!     .begin_render_pass(None)?
//!     .set_pipeline(&pipeline)
//!     .draw(3)
//!     .end()?
//!     .submit()?;
//! ```
//!
//! 状态由所有权表达：`begin_render_pass` 消耗编码器，`end` 把它交还，
//! `submit` 消耗编码器。因此同一编码器上不可能同时打开两个通道，
//! 提交之后也无法继续使用。没有完成就被丢弃的编码器或通道会在设备上被丢弃。

use crate::core::error::{GdyError, GraphicsError, Result};
use crate::gfx::backend::GpuBackend;
use crate::gfx::descriptor::{
    CommandEncoderDescriptor, RenderPassColorAttachment, RenderPassDescriptor,
    TextureViewDescriptor,
};
use crate::gfx::handle::{CommandBufferId, CommandEncoderId, RenderPassId, TextureViewId};
use crate::runtime::Runtime;

use super::bind_group::BindGroup;
use super::buffer::Buffer;
use super::pipeline::RenderPipeline;

/// 命令编码器（单次使用）
pub struct CommandEncoder<'a, B: GpuBackend> {
    runtime: &'a Runtime<B>,
    handle: CommandEncoderId,
    finished: bool,
}

impl<'a, B: GpuBackend> CommandEncoder<'a, B> {
    pub fn new(
        runtime: &'a Runtime<B>,
        descriptor: Option<&CommandEncoderDescriptor>,
    ) -> Result<Self> {
        let default = CommandEncoderDescriptor::default();
        let handle = runtime.create_command_encoder(descriptor.unwrap_or(&default))?;
        Ok(Self {
            runtime,
            handle,
            finished: false,
        })
    }

    pub fn handle(&self) -> CommandEncoderId {
        self.handle
    }

    /// 打开渲染通道
    ///
    /// 没有给出描述符时使用默认通道：一个颜色附件，目标为当前表面纹理的视图，
    /// 加载时清除为黑色，结束时存储。该视图在通道结束后释放。
    pub fn begin_render_pass(
        self,
        descriptor: Option<RenderPassDescriptor>,
    ) -> Result<RenderPassEncoder<'a, B>> {
        let runtime = self.runtime;
        let (descriptor, transient_view) = match descriptor {
            Some(descriptor) => (descriptor, None),
            None => {
                let texture = runtime.current_texture()?;
                let view = runtime.create_texture_view(texture, &TextureViewDescriptor::default())?;
                let descriptor = RenderPassDescriptor {
                    label: None,
                    color_attachments: vec![Some(RenderPassColorAttachment::clear(
                        view,
                        wgpu::Color::BLACK,
                    ))],
                    depth_stencil_attachment: None,
                };
                (descriptor, Some(view))
            }
        };

        let handle = match runtime.backend().begin_render_pass(self.handle, &descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(view) = transient_view {
                    runtime.backend().release_texture_view(view);
                }
                return Err(e);
            }
        };

        Ok(RenderPassEncoder {
            runtime,
            encoder: Some(self),
            handle,
            transient_view,
            ended: false,
        })
    }

    /// 结束编码，得到命令缓冲区
    pub fn finish(mut self) -> Result<CommandBufferId> {
        let command_buffer = self.runtime.backend().finish_command_encoder(self.handle)?;
        self.finished = true;
        Ok(command_buffer)
    }

    /// 结束编码并提交到队列
    pub fn submit(self) -> Result<()> {
        let runtime = self.runtime;
        let command_buffer = self.finish()?;
        runtime.submit(&[command_buffer])
    }
}

impl<B: GpuBackend> Drop for CommandEncoder<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Discarding unfinished command encoder");
            self.runtime.backend().discard_command_encoder(self.handle);
        }
    }
}

/// 渲染通道编码器
///
/// 由创建它的 `CommandEncoder` 独占；链上的每个调用都直接转发给设备，不做参数校验。
pub struct RenderPassEncoder<'a, B: GpuBackend> {
    runtime: &'a Runtime<B>,
    encoder: Option<CommandEncoder<'a, B>>,
    handle: RenderPassId,
    transient_view: Option<TextureViewId>,
    ended: bool,
}

impl<'a, B: GpuBackend> RenderPassEncoder<'a, B> {
    pub fn handle(&self) -> RenderPassId {
        self.handle
    }

    pub fn set_pipeline(self, pipeline: &RenderPipeline) -> Self {
        self.runtime.backend().set_pipeline(self.handle, pipeline.handle());
        self
    }

    pub fn set_bind_group(self, index: u32, bind_group: &BindGroup) -> Self {
        self.runtime.backend().set_bind_group(self.handle, index, bind_group.handle());
        self
    }

    /// 绑定顶点缓冲区；缓冲区已销毁时返回 `ResourceDestroyed`
    pub fn set_vertex_buffer(self, slot: u32, buffer: &Buffer) -> Result<Self> {
        self.runtime.backend().set_vertex_buffer(self.handle, slot, buffer.handle()?);
        Ok(self)
    }

    /// 绑定索引缓冲区；缓冲区已销毁时返回 `ResourceDestroyed`
    pub fn set_index_buffer(self, buffer: &Buffer, format: wgpu::IndexFormat) -> Result<Self> {
        self.runtime.backend().set_index_buffer(self.handle, buffer.handle()?, format);
        Ok(self)
    }

    /// 单实例、从第 0 个顶点开始绘制
    pub fn draw(self, vertex_count: u32) -> Self {
        self.draw_instanced(vertex_count, 1, 0, 0)
    }

    pub fn draw_instanced(
        self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Self {
        self.runtime
            .backend()
            .draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        self
    }

    /// 单实例索引绘制
    pub fn draw_indexed(self, index_count: u32) -> Self {
        self.draw_indexed_instanced(index_count, 1, 0, 0, 0)
    }

    pub fn draw_indexed_instanced(
        self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Self {
        self.runtime.backend().draw_indexed(
            self.handle,
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        );
        self
    }

    /// 间接绘制；参数缓冲区已销毁时返回 `ResourceDestroyed`
    pub fn draw_indirect(self, indirect_buffer: &Buffer, indirect_offset: u64) -> Result<Self> {
        self.runtime
            .backend()
            .draw_indirect(self.handle, indirect_buffer.handle()?, indirect_offset);
        Ok(self)
    }

    /// 结束通道，交还所属的编码器
    pub fn end(mut self) -> Result<CommandEncoder<'a, B>> {
        self.ended = true;
        let result = self.runtime.backend().end_render_pass(self.handle);
        self.release_transient_view();
        result?;

        self.encoder.take().ok_or_else(|| {
            GdyError::from(GraphicsError::CommandExecution(
                "Render pass has no owning encoder".to_string(),
            ))
        })
    }

    fn release_transient_view(&mut self) {
        if let Some(view) = self.transient_view.take() {
            self.runtime.backend().release_texture_view(view);
        }
    }
}

impl<B: GpuBackend> Drop for RenderPassEncoder<'_, B> {
    fn drop(&mut self) {
        if !self.ended {
            tracing::debug!("Discarding render pass that was never ended");
            self.runtime.backend().discard_render_pass(self.handle);
        }
        self.release_transient_view();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResourceKind;
    use crate::gfx::descriptor::{
        BindGroupDescriptor, BufferDescriptor, FragmentState, PipelineLayout,
        RenderPipelineDescriptor, VertexState,
    };
    use crate::gfx::recording::{Call, RecordingBackend};
    use crate::renderer::ShaderModule;
    use crate::runtime::RuntimeOptions;

    fn runtime() -> Runtime<RecordingBackend> {
        let mut runtime = Runtime::new(RecordingBackend::new());
        pollster::block_on(runtime.initialize(RuntimeOptions::default())).unwrap();
        runtime
    }

    fn pipeline(runtime: &Runtime<RecordingBackend>) -> RenderPipeline {
        let module = ShaderModule::from_wgsl(runtime, "triangle", "").unwrap();
        RenderPipeline::new(
            runtime,
            &RenderPipelineDescriptor {
                label: Some("triangle".to_string()),
                layout: PipelineLayout::Auto,
                vertex: VertexState {
                    module: module.handle(),
                    entry_point: "main".to_string(),
                    buffers: Vec::new(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(FragmentState {
                    module: module.handle(),
                    entry_point: "main".to_string(),
                    targets: vec![Some(wgpu::TextureFormat::Bgra8Unorm.into())],
                }),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_chain_issues_one_pass_with_one_draw() {
        let runtime = runtime();
        let pipeline = pipeline(&runtime);
        runtime.backend().take_calls();

        CommandEncoder::new(&runtime, None)
            .unwrap()
            .begin_render_pass(None)
            .unwrap()
            .set_pipeline(&pipeline)
            .draw(3)
            .end()
            .unwrap()
            .submit()
            .unwrap();

        let calls = runtime.backend().take_calls();
        assert_eq!(calls.len(), 10, "{:#?}", calls);

        let Call::CreateCommandEncoder { encoder, .. } = calls[0] else {
            panic!("expected encoder creation, got {:?}", calls[0]);
        };
        let Call::GetCurrentTexture { texture, .. } = calls[1] else {
            panic!("expected current texture, got {:?}", calls[1]);
        };
        let Call::CreateTextureView { texture: viewed, view } = calls[2] else {
            panic!("expected view creation, got {:?}", calls[2]);
        };
        assert_eq!(viewed, texture);

        let Call::BeginRenderPass { encoder: pass_encoder, pass, descriptor } = &calls[3] else {
            panic!("expected render pass, got {:?}", calls[3]);
        };
        assert_eq!(*pass_encoder, encoder);
        assert_eq!(descriptor.color_attachments.len(), 1);
        let attachment = descriptor.color_attachments[0].unwrap();
        assert_eq!(attachment.view, view);
        assert_eq!(attachment.resolve_target, None);
        assert_eq!(attachment.ops.load, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        assert_eq!(attachment.ops.store, wgpu::StoreOp::Store);

        let pass = *pass;
        assert_eq!(calls[4], Call::SetPipeline { pass, pipeline: pipeline.handle() });
        assert_eq!(
            calls[5],
            Call::Draw {
                pass,
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }
        );
        assert_eq!(calls[6], Call::EndRenderPass { pass });
        assert_eq!(calls[7], Call::ReleaseTextureView { view });

        let Call::FinishCommandEncoder { encoder: finished, command_buffer } = calls[8] else {
            panic!("expected finish, got {:?}", calls[8]);
        };
        assert_eq!(finished, encoder);
        let Call::Submit { command_buffers, .. } = &calls[9] else {
            panic!("expected submit, got {:?}", calls[9]);
        };
        assert_eq!(command_buffers, &vec![command_buffer]);
    }

    #[test]
    fn test_explicit_descriptor_skips_surface() {
        let runtime = runtime();
        let texture = runtime.current_texture().unwrap();
        let view = runtime
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        runtime.backend().take_calls();

        let descriptor = RenderPassDescriptor {
            label: Some("explicit".to_string()),
            color_attachments: vec![Some(RenderPassColorAttachment::clear(
                view,
                wgpu::Color::WHITE,
            ))],
            depth_stencil_attachment: None,
        };
        CommandEncoder::new(&runtime, None)
            .unwrap()
            .begin_render_pass(Some(descriptor.clone()))
            .unwrap()
            .end()
            .unwrap()
            .submit()
            .unwrap();

        let calls = runtime.backend().take_calls();
        assert!(!calls.iter().any(|c| {
            matches!(c, Call::GetCurrentTexture { .. } | Call::ReleaseTextureView { .. })
        }));
        assert!(calls.iter().any(|c| {
            matches!(c, Call::BeginRenderPass { descriptor: d, .. } if *d == descriptor)
        }));
    }

    #[test]
    fn test_sequential_passes_on_one_encoder() {
        let runtime = runtime();
        let pipeline = pipeline(&runtime);

        CommandEncoder::new(&runtime, None)
            .unwrap()
            .begin_render_pass(None)
            .unwrap()
            .set_pipeline(&pipeline)
            .draw(3)
            .end()
            .unwrap()
            .begin_render_pass(None)
            .unwrap()
            .set_pipeline(&pipeline)
            .draw_instanced(6, 2, 3, 1)
            .end()
            .unwrap()
            .submit()
            .unwrap();

        let backend = runtime.backend();
        assert_eq!(backend.count_calls(|c| matches!(c, Call::BeginRenderPass { .. })), 2);
        assert_eq!(backend.count_calls(|c| matches!(c, Call::EndRenderPass { .. })), 2);
        assert_eq!(
            backend.count_calls(|c| {
                matches!(c, Call::Submit { command_buffers, .. } if command_buffers.len() == 1)
            }),
            1
        );
        assert_eq!(
            backend.count_calls(|c| matches!(
                c,
                Call::Draw {
                    vertex_count: 6,
                    instance_count: 2,
                    first_vertex: 3,
                    first_instance: 1,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_bindings_and_draw_variants_delegate() {
        let runtime = runtime();
        let pipeline = pipeline(&runtime);
        let layout = pipeline.bind_group_layout(&runtime, 0).unwrap();
        let bind_group = BindGroup::new(
            &runtime,
            &BindGroupDescriptor {
                label: None,
                layout: layout.handle(),
                entries: Vec::new(),
            },
        )
        .unwrap();
        let buffer = |size: u64, usage: wgpu::BufferUsages| {
            Buffer::new(&runtime, BufferDescriptor::new(size, usage)).unwrap()
        };
        let vertices = buffer(64, wgpu::BufferUsages::VERTEX);
        let indices = buffer(12, wgpu::BufferUsages::INDEX);
        let indirect = buffer(16, wgpu::BufferUsages::INDIRECT);

        let pass = CommandEncoder::new(&runtime, None)
            .unwrap()
            .begin_render_pass(None)
            .unwrap()
            .set_pipeline(&pipeline)
            .set_bind_group(0, &bind_group)
            .set_vertex_buffer(0, &vertices)
            .unwrap()
            .set_index_buffer(&indices, wgpu::IndexFormat::Uint16)
            .unwrap()
            .draw_indexed(6)
            .draw_indexed_instanced(3, 4, 1, -2, 5)
            .draw_indirect(&indirect, 8)
            .unwrap();
        let handle = pass.handle();
        pass.end().unwrap().submit().unwrap();

        let calls = runtime.backend().calls();
        assert!(calls.contains(&Call::SetBindGroup {
            pass: handle,
            index: 0,
            bind_group: bind_group.handle(),
        }));
        assert!(calls.contains(&Call::SetVertexBuffer {
            pass: handle,
            slot: 0,
            buffer: vertices.handle().unwrap(),
        }));
        assert!(calls.contains(&Call::SetIndexBuffer {
            pass: handle,
            buffer: indices.handle().unwrap(),
            format: wgpu::IndexFormat::Uint16,
        }));
        assert!(calls.contains(&Call::DrawIndexed {
            pass: handle,
            index_count: 6,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }));
        assert!(calls.contains(&Call::DrawIndexed {
            pass: handle,
            index_count: 3,
            instance_count: 4,
            first_index: 1,
            base_vertex: -2,
            first_instance: 5,
        }));
        assert!(calls.contains(&Call::DrawIndirect {
            pass: handle,
            buffer: indirect.handle().unwrap(),
            offset: 8,
        }));
    }

    #[test]
    fn test_destroyed_buffer_cannot_be_bound() {
        let runtime = runtime();
        let mut vertices =
            Buffer::new(&runtime, BufferDescriptor::new(64, wgpu::BufferUsages::VERTEX)).unwrap();
        vertices.destroy(&runtime);

        let result = CommandEncoder::new(&runtime, None)
            .unwrap()
            .begin_render_pass(None)
            .unwrap()
            .set_vertex_buffer(0, &vertices);
        assert!(result.err().unwrap().is_destroyed(ResourceKind::Buffer));

        // 失败的链被丢弃，通道和编码器都被丢弃
        let backend = runtime.backend();
        assert_eq!(backend.count_calls(|c| matches!(c, Call::DiscardRenderPass { .. })), 1);
        assert_eq!(backend.count_calls(|c| matches!(c, Call::DiscardCommandEncoder { .. })), 1);
    }

    #[test]
    fn test_dropped_pass_and_encoder_are_discarded() {
        let runtime = runtime();
        {
            let _pass = CommandEncoder::new(&runtime, None)
                .unwrap()
                .begin_render_pass(None)
                .unwrap();
        }
        let calls = runtime.backend().take_calls();
        let discards: Vec<&Call> = calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::DiscardRenderPass { .. }
                        | Call::ReleaseTextureView { .. }
                        | Call::DiscardCommandEncoder { .. }
                )
            })
            .collect();
        assert_eq!(discards.len(), 3);
        assert!(matches!(discards[0], Call::DiscardRenderPass { .. }));
        assert!(matches!(discards[1], Call::ReleaseTextureView { .. }));
        assert!(matches!(discards[2], Call::DiscardCommandEncoder { .. }));

        {
            let _encoder = CommandEncoder::new(&runtime, None).unwrap();
        }
        let discarded = runtime
            .backend()
            .count_calls(|c| matches!(c, Call::DiscardCommandEncoder { .. }));
        assert_eq!(discarded, 1);
        assert_eq!(runtime.backend().count_calls(|c| matches!(c, Call::Submit { .. })), 0);
    }

    #[test]
    fn test_submitted_encoder_is_not_discarded() {
        let runtime = runtime();
        CommandEncoder::new(&runtime, None).unwrap().submit().unwrap();
        let discarded = runtime
            .backend()
            .count_calls(|c| matches!(c, Call::DiscardCommandEncoder { .. }));
        assert_eq!(discarded, 0);
        assert_eq!(runtime.backend().count_calls(|c| matches!(c, Call::Submit { .. })), 1);
    }

    #[test]
    fn test_encoder_requires_initialized_runtime() {
        let runtime = Runtime::new(RecordingBackend::new());
        assert!(CommandEncoder::new(&runtime, None).err().unwrap().is_not_initialized());
    }
}
