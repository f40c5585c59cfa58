//! 事件系统模块
//!
//! 运行时通过事件通知依赖方（例如渲染目标纹理）表面尺寸已变化。
//!
//! # 使用示例
//!
//! ```
//! use gdy::core::event::*;
//!
//! // 1. 创建事件
//! let mut event = SurfaceResizeEvent::new((4000, 0), (2048, 1));
//!
//! // 2. 创建分发器
//! let mut dispatcher = EventDispatcher::new(&mut event);
//!
//! // 3. 分发事件到处理函数
//! dispatcher.dispatch(EventType::SurfaceResize, |e| {
//!     println!("表面调整为: {}", e.detail());
//!     true // 返回 true 表示事件已处理
//! });
//!
//! assert!(dispatcher.is_handled());
//! ```

use std::fmt;

/// 事件类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// 空事件
    ///
    /// 用作占位符或初始值，实际不应被分发
    None,

    /// 表面调整大小事件
    ///
    /// 尺寸观察器每次观察到表面尺寸变化时触发
    SurfaceResize,

    /// 绘制事件
    ///
    /// 通知应用执行一帧绘制
    Draw,
}

impl EventType {
    /// 获取事件类型的名称
    pub fn name(&self) -> &'static str {
        match self {
            EventType::None => "None",
            EventType::SurfaceResize => "SurfaceResize",
            EventType::Draw => "Draw",
        }
    }
}

/// 事件 trait
///
/// 所有事件都必须实现此 trait。
pub trait Event: fmt::Debug {
    /// 获取事件类型
    fn event_type(&self) -> EventType;

    /// 获取事件详细信息（用于调试和日志）
    fn detail(&self) -> String {
        format!("{:?}", self)
    }

    /// 事件是否已被处理
    fn is_handled(&self) -> bool;

    /// 设置事件处理状态
    fn set_handled(&mut self, handled: bool);

    /// 向下转型为表面调整事件
    fn as_surface_resize(&self) -> Option<&SurfaceResizeEvent> {
        None
    }
}

/// 表面调整大小事件
///
/// `requested` 是观察到的原始尺寸，`applied` 是钳制到
/// `[1, maxTextureDimension2D]` 之后实际写入表面的尺寸。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceResizeEvent {
    /// 观察到的尺寸 (width, height)
    pub requested: (u32, u32),

    /// 实际应用到表面的尺寸 (width, height)
    pub applied: (u32, u32),

    handled: bool,
}

impl SurfaceResizeEvent {
    pub fn new(requested: (u32, u32), applied: (u32, u32)) -> Self {
        Self {
            requested,
            applied,
            handled: false,
        }
    }

    /// 应用后的宽度
    pub fn width(&self) -> u32 {
        self.applied.0
    }

    /// 应用后的高度
    pub fn height(&self) -> u32 {
        self.applied.1
    }

    /// 观察到的尺寸是否被钳制过
    pub fn was_clamped(&self) -> bool {
        self.requested != self.applied
    }
}

impl Event for SurfaceResizeEvent {
    fn event_type(&self) -> EventType {
        EventType::SurfaceResize
    }

    fn detail(&self) -> String {
        format!("SurfaceResize: {}x{}", self.applied.0, self.applied.1)
    }

    fn is_handled(&self) -> bool {
        self.handled
    }

    fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    fn as_surface_resize(&self) -> Option<&SurfaceResizeEvent> {
        Some(self)
    }
}

/// 绘制事件
#[derive(Debug, Clone, Default)]
pub struct DrawEvent {
    /// 帧序号
    pub frame: u64,
    handled: bool,
}

impl DrawEvent {
    pub fn new(frame: u64) -> Self {
        Self { frame, handled: false }
    }
}

impl Event for DrawEvent {
    fn event_type(&self) -> EventType {
        EventType::Draw
    }

    fn detail(&self) -> String {
        format!("Draw: frame {}", self.frame)
    }

    fn is_handled(&self) -> bool {
        self.handled
    }

    fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }
}

/// 事件分发器
///
/// 将事件分发给与其类型匹配的处理函数。
pub struct EventDispatcher<'a> {
    event: &'a mut dyn Event,
}

impl<'a> EventDispatcher<'a> {
    /// 创建新的事件分发器
    pub fn new(event: &'a mut dyn Event) -> Self {
        Self { event }
    }

    /// 分发事件到处理函数
    ///
    /// 只有事件类型匹配时才调用处理函数；处理函数的返回值写回事件的处理状态。
    pub fn dispatch<F>(&mut self, event_type: EventType, mut handler: F) -> bool
    where
        F: FnMut(&mut dyn Event) -> bool,
    {
        if self.event.event_type() == event_type {
            let handled = handler(self.event);
            self.event.set_handled(handled);
            handled
        } else {
            false
        }
    }

    /// 事件是否已被处理
    pub fn is_handled(&self) -> bool {
        self.event.is_handled()
    }
}
