//! GDY - hello triangle
//!
//! 打开一个窗口，用 4 倍 MSAA 渲染目标绘制一个三角形，并解析到表面纹理上。
//! 三角形颜色来自一个 uniform 缓冲区，每帧更新一次。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件（config.toml）
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --width 1280 --height 720 --msaa 1 --low-power
//! ```

use std::sync::Arc;

use anyhow::Context;
use gdy::core::event::{DrawEvent, Event as _, EventDispatcher, EventType};
use gdy::core::{log, Config};
use gdy::gfx::descriptor::{
    BindGroupDescriptor, BindGroupEntry, BindingResource, BufferDescriptor, FragmentState,
    PipelineLayout, RenderPassColorAttachment, RenderPassDescriptor, RenderPipelineDescriptor,
    TextureDescriptor, TextureViewDescriptor, VertexState,
};
use gdy::gfx::handle::TextureViewId;
use gdy::gfx::WgpuBackend;
use gdy::renderer::{BindGroup, Buffer, CommandEncoder, RenderPipeline, ShaderModule, Texture};
use gdy::runtime::{Runtime, RuntimeOptions};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

const TRIANGLE_VERT: &str = include_str!("renderer/shaders/triangle.vert.wgsl");
const TRIANGLE_FRAG: &str = include_str!("renderer/shaders/triangle.frag.wgsl");

const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Tint {
    color: [f32; 4],
}

impl Tint {
    /// 随帧序号缓慢变化的颜色
    fn at_frame(frame: u64) -> Self {
        let t = frame as f32 / 60.0;
        Self {
            color: [
                0.5 + 0.5 * t.sin(),
                0.5 + 0.5 * (t + 2.094).sin(),
                0.5 + 0.5 * (t + 4.189).sin(),
                1.0,
            ],
        }
    }
}

struct Triangle {
    pipeline: RenderPipeline,
    bind_group: BindGroup,
    tint: Buffer,
    /// 多重采样渲染目标；采样数为 1 时直接画到表面纹理
    render_target: Option<Texture>,
    frame: u64,
}

impl Triangle {
    fn new(runtime: &Runtime<WgpuBackend>, sample_count: u32) -> gdy::core::Result<Self> {
        let format = runtime.format()?;

        let render_target = if sample_count > 1 {
            let usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
            let descriptor = TextureDescriptor::new(runtime.size()?, format, usage)
                .with_label("msaa-target")
                .with_sample_count(sample_count);
            Some(Texture::new(runtime, descriptor)?)
        } else {
            None
        };

        let shader_vert = ShaderModule::from_wgsl(runtime, "triangle.vert", TRIANGLE_VERT)?;
        let shader_frag = ShaderModule::from_wgsl(runtime, "triangle.frag", TRIANGLE_FRAG)?;

        let pipeline = RenderPipeline::new(
            runtime,
            &RenderPipelineDescriptor {
                label: Some("triangle".to_string()),
                layout: PipelineLayout::Auto,
                vertex: VertexState {
                    module: shader_vert.handle(),
                    entry_point: "main".to_string(),
                    buffers: Vec::new(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: sample_count,
                    ..Default::default()
                },
                fragment: Some(FragmentState {
                    module: shader_frag.handle(),
                    entry_point: "main".to_string(),
                    targets: vec![Some(format.into())],
                }),
            },
        )?;

        let tint = Buffer::new(
            runtime,
            BufferDescriptor::new(
                std::mem::size_of::<Tint>() as u64,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            )
            .with_label("tint"),
        )?;

        let layout = pipeline.bind_group_layout(runtime, 0)?;
        let bind_group = BindGroup::new(
            runtime,
            &BindGroupDescriptor {
                label: Some("tint".to_string()),
                layout: layout.handle(),
                entries: vec![BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::whole_buffer(tint.handle()?),
                }],
            },
        )?;

        Ok(Self {
            pipeline,
            bind_group,
            tint,
            render_target,
            frame: 0,
        })
    }

    fn resize(&mut self, runtime: &Runtime<WgpuBackend>) -> gdy::core::Result<()> {
        if let Some(target) = &mut self.render_target {
            target.resize(runtime, runtime.size()?)?;
        }
        Ok(())
    }

    fn draw(&mut self, runtime: &Runtime<WgpuBackend>) -> gdy::core::Result<()> {
        self.frame += 1;
        self.tint.write_pod(runtime, &Tint::at_frame(self.frame))?;

        let frame_texture = runtime.current_texture()?;
        let frame_view =
            runtime.create_texture_view(frame_texture, &TextureViewDescriptor::default())?;
        let result = self.encode(runtime, frame_view);
        runtime.release_texture_view(frame_view)?;
        result
    }

    fn encode(
        &mut self,
        runtime: &Runtime<WgpuBackend>,
        frame_view: TextureViewId,
    ) -> gdy::core::Result<()> {
        let attachment = match &mut self.render_target {
            Some(target) => RenderPassColorAttachment::clear(target.view(runtime)?, CLEAR_COLOR)
                .with_resolve_target(frame_view)
                .with_store_op(wgpu::StoreOp::Discard),
            None => RenderPassColorAttachment::clear(frame_view, CLEAR_COLOR),
        };

        CommandEncoder::new(runtime, None)?
            .begin_render_pass(Some(RenderPassDescriptor {
                label: Some("triangle".to_string()),
                color_attachments: vec![Some(attachment)],
                depth_stencil_attachment: None,
            }))?
            .set_pipeline(&self.pipeline)
            .set_bind_group(0, &self.bind_group)
            .draw(3)
            .end()?
            .submit()
    }

    fn destroy(&mut self, runtime: &Runtime<WgpuBackend>) {
        self.tint.destroy(runtime);
        if let Some(target) = &mut self.render_target {
            target.destroy(runtime);
        }
    }
}

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）并应用命令行参数
/// 2. 初始化日志系统
/// 3. 创建窗口和 wgpu 后端
/// 4. 初始化运行时，创建三角形所需的资源
/// 5. 启动主循环
fn main() -> anyhow::Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    // 2. 初始化日志系统
    let log_file = config.logging.file_output.then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!("GDY starting...");
    info!(version = env!("CARGO_PKG_VERSION"), "Application initialized");
    info!(
        width = config.surface.width,
        height = config.surface.height,
        msaa = config.graphics.msaa_samples,
        alpha_mode = ?config.graphics.alpha_mode,
        "Graphics configuration"
    );

    // 3. 创建窗口和后端
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.surface.title.as_str())
            .with_inner_size(PhysicalSize::new(config.surface.width, config.surface.height))
            .with_resizable(config.surface.resizable)
            .build(&event_loop)
            .context("Failed to create window")?,
    );
    let backend = WgpuBackend::with_window(window.clone(), config.graphics.vsync)?;

    // 4. 初始化运行时
    let mut runtime = Runtime::new(backend);
    pollster::block_on(runtime.initialize(RuntimeOptions::from_config(&config)))
        .context("Failed to initialize runtime")?;
    let mut triangle = Triangle::new(&runtime, config.graphics.msaa_samples)?;
    info!("Runtime initialized successfully, entering main loop...");

    // 5. 主循环
    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
            gdy::app_info!("Close requested, shutting down...");
            triangle.destroy(&runtime);
            runtime.uninitialize();
            elwt.exit();
        }
        Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
            if let Err(e) = runtime.observe_resize(size.width, size.height) {
                gdy::app_warn!("Resize failed: {}", e);
                return;
            }
            for mut resized in runtime.take_resize_events() {
                let mut dispatcher = EventDispatcher::new(&mut resized);
                dispatcher.dispatch(EventType::SurfaceResize, |e| {
                    debug!("{}", e.detail());
                    match triangle.resize(&runtime) {
                        Ok(()) => true,
                        Err(e) => {
                            gdy::app_error!("Failed to resize render target: {}", e);
                            false
                        }
                    }
                });
            }
            window.request_redraw();
        }
        Event::WindowEvent { event: WindowEvent::RedrawRequested, .. } => {
            let mut draw = DrawEvent::new(triangle.frame + 1);
            let mut dispatcher = EventDispatcher::new(&mut draw);
            let drawn = dispatcher.dispatch(EventType::Draw, |_| match triangle.draw(&runtime) {
                Ok(()) => true,
                Err(e) => {
                    gdy::app_error!("Draw failed: {}", e);
                    false
                }
            });
            if drawn {
                window.request_redraw();
            } else {
                elwt.exit();
            }
        }
        _ => (),
    })?;

    Ok(())
}
