//! 设备协议句柄
//!
//! 设备协议返回的每个对象都用一个不透明、可复制的类型化 id 表示。
//! id 由各后端用 `slotmap` 分配，句柄失效（被销毁或所属设备被拆除）后
//! 再次使用会得到 `GraphicsError::InvalidHandle`。

use slotmap::new_key_type;

new_key_type! {
    /// 物理/虚拟 GPU 适配器
    pub struct AdapterId;
    /// 逻辑设备
    pub struct DeviceId;
    /// 设备的提交队列
    pub struct QueueId;
    /// 表面的绘制上下文
    pub struct ContextId;
    pub struct BufferId;
    pub struct TextureId;
    pub struct TextureViewId;
    pub struct SamplerId;
    pub struct ShaderModuleId;
    pub struct BindGroupLayoutId;
    pub struct BindGroupId;
    pub struct RenderPipelineId;
    pub struct CommandEncoderId;
    pub struct RenderPassId;
    /// `finish` 之后得到的命令缓冲区
    pub struct CommandBufferId;
}
