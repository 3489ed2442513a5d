use std::{
    net::SocketAddr,
    sync::{Arc, Weak},
};

use crate::{
    error::ChannelError,
    handler::ChannelHandler,
    message::{PipelineMessage, UserEvent},
    pipeline::ChannelPipeline,
    promise::ChannelPromise,
};

/// Handler 在某个 Pipeline 位置上的上下文，是“继续传播事件”的唯一入口。
///
/// # 契约维度速览
/// - **语义**：`forward_*` 把入站事件交给当前位置之后的下一个入站阶段；出站操作（`bind`、`write` 等）
///   交给当前位置之前的下一个出站阶段，最终抵达传输层。
/// - **错误**：上下文方法本身不返回错误；出站失败通过 Promise 报告，入站异常沿 `forward_exception` 传播。
/// - **并发**：Trait 要求 `Send + Sync`；同一位置上的调用由外部 Pipeline 串行化。
/// - **生命周期**：上下文由 Pipeline 持有；需要在回调外保存时使用 [`downgrade`](Self::downgrade)
///   获取弱引用，避免与 Handler 形成引用环。
///
/// # 前置/后置条件（Contract）
/// - **前置**：仅在事件回调或生命周期钩子内部使用；
/// - **后置**：每个携带 Promise 的出站操作都会把 Promise 原样交给下一个阶段，由最终处理者决议。
pub trait ChannelHandlerContext: Send + Sync {
    /// 该位置的名称。
    fn name(&self) -> &str;

    /// 占据该位置的 Handler；上下文所属的 Pipeline 已释放时返回 `None`。
    fn handler(&self) -> Option<Arc<dyn ChannelHandler>>;

    /// 所属 Pipeline；Pipeline 已释放时返回 `None`。
    fn pipeline(&self) -> Option<Arc<dyn ChannelPipeline>>;

    /// 该位置是否已从 Pipeline 中移除。
    fn is_removed(&self) -> bool;

    /// 返回指向自身的弱引用。
    fn downgrade(&self) -> Weak<dyn ChannelHandlerContext>;

    /// 创建新的完成信号。
    fn new_promise(&self) -> ChannelPromise {
        ChannelPromise::new()
    }

    /// 传播通道注册事件。
    fn forward_channel_registered(&self);

    /// 传播通道注销事件。
    fn forward_channel_unregistered(&self);

    /// 传播通道活跃事件。
    fn forward_channel_active(&self);

    /// 传播通道失活事件。
    fn forward_channel_inactive(&self);

    /// 传播读到的消息。
    fn forward_read(&self, msg: PipelineMessage);

    /// 传播本轮读取结束。
    fn forward_read_complete(&self);

    /// 传播用户事件。
    fn forward_user_event(&self, event: UserEvent);

    /// 传播可写性变化。
    fn forward_writability_changed(&self, is_writable: bool);

    /// 传播异常。
    fn forward_exception(&self, error: ChannelError);

    /// 请求绑定本地地址。
    fn bind(&self, local: SocketAddr, promise: ChannelPromise);

    /// 请求连接远端地址。
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise);

    /// 请求断开连接。
    fn disconnect(&self, promise: ChannelPromise);

    /// 请求关闭通道。
    fn close(&self, promise: ChannelPromise);

    /// 请求从事件循环注销。
    fn deregister(&self, promise: ChannelPromise);

    /// 请求读取更多数据。
    fn request_read(&self);

    /// 写消息（不冲刷）。
    fn write(&self, msg: PipelineMessage, promise: ChannelPromise);

    /// 冲刷已写入的消息。
    fn flush(&self);

    /// 写入并立即冲刷。
    fn write_and_flush(&self, msg: PipelineMessage, promise: ChannelPromise) {
        self.write(msg, promise);
        self.flush();
    }
}
