use std::net::SocketAddr;

use crate::{
    context::ChannelHandlerContext,
    error::{ChannelError, HandlerResult},
    message::{PipelineMessage, UserEvent},
    promise::ChannelPromise,
};

/// 所有 Handler 共享的生命周期与能力声明。
///
/// # 设计背景（Why）
/// - Pipeline 以单一对象安全的入口接收 Handler，再按能力决定入站/出站事件是否经过该阶段；
/// - 能力由 Handler 自行声明：实现 [`InboundHandler`] 的类型覆写 [`as_inbound`](Self::as_inbound)
///   返回 `Some(self)`，出站同理。两者都声明的 Handler 即为双向 Handler。
///
/// # 契约说明（What）
/// - `on_handler_added` / `on_handler_removed`：在加入/移出 Pipeline 位置时同步调用，且各自至多一次；
/// - `is_sharable`：返回 `true` 的 Handler 允许同时挂载到多个位置，默认不可共享；
/// - `as_inbound` / `as_outbound`：默认返回 `None`，即不参与该方向的调度。
///
/// # 风险提示（Trade-offs）
/// - 声明了能力却未实现对应 Trait 在类型层面不可能发生；反之，实现了 Trait 却忘记覆写 `as_*`
///   会导致该方向事件直接跳过此 Handler，编写时需留意。
pub trait ChannelHandler: Send + Sync + 'static {
    /// Handler 已加入 Pipeline 位置。
    fn on_handler_added(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        Ok(())
    }

    /// Handler 已从 Pipeline 位置移除。
    fn on_handler_removed(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        Ok(())
    }

    /// 是否允许同一实例挂载到多个位置。
    fn is_sharable(&self) -> bool {
        false
    }

    /// 声明入站能力。
    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        None
    }

    /// 声明出站能力。
    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        None
    }
}

/// 入站事件处理合约，面向从传输层到业务层的正向数据流。
///
/// # 契约说明（What）
/// - 每个钩子的默认实现都把事件原样交给下一个阶段，实现者只需覆写关心的事件；
/// - 返回 `Err` 时，Pipeline 会把错误交给同一阶段的 [`on_exception_caught`](Self::on_exception_caught)；
/// - `on_exception_caught` 的默认实现继续向后传播，保证异常不会在无人处理时静默丢失。
///
/// # 前置/后置条件（Contract）
/// - **前置**：所有钩子在同一位置上串行调用，禁止阻塞；
/// - **后置**：若未调用 `ctx.forward_*`，事件即在此阶段被消费。
pub trait InboundHandler: ChannelHandler {
    /// 通道已注册到事件循环。
    fn on_channel_registered(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.forward_channel_registered();
        Ok(())
    }

    /// 通道已从事件循环注销。
    fn on_channel_unregistered(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.forward_channel_unregistered();
        Ok(())
    }

    /// 通道变为活跃。
    fn on_channel_active(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.forward_channel_active();
        Ok(())
    }

    /// 通道不再活跃。
    fn on_channel_inactive(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.forward_channel_inactive();
        Ok(())
    }

    /// 处理读到的消息。
    fn on_read(&self, ctx: &dyn ChannelHandlerContext, msg: PipelineMessage) -> HandlerResult {
        ctx.forward_read(msg);
        Ok(())
    }

    /// 一批读取完成。
    fn on_read_complete(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.forward_read_complete();
        Ok(())
    }

    /// 用户事件。
    fn on_user_event(&self, ctx: &dyn ChannelHandlerContext, event: UserEvent) -> HandlerResult {
        ctx.forward_user_event(event);
        Ok(())
    }

    /// 可写性变化。
    fn on_writability_changed(
        &self,
        ctx: &dyn ChannelHandlerContext,
        is_writable: bool,
    ) -> HandlerResult {
        ctx.forward_writability_changed(is_writable);
        Ok(())
    }

    /// 异常处理。
    fn on_exception_caught(
        &self,
        ctx: &dyn ChannelHandlerContext,
        error: ChannelError,
    ) -> HandlerResult {
        ctx.forward_exception(error);
        Ok(())
    }
}

/// 出站事件处理合约，负责从业务层到传输层的逆向数据流。
///
/// # 契约说明（What）
/// - 默认实现把操作连同 Promise 原样交给前一个阶段；
/// - 携带 Promise 的操作必须保证 Promise 最终被决议一次：要么自行决议，要么交给下一个阶段；
/// - 返回 `Err` 时，Pipeline 以该错误让 Promise 失败（若尚未决议）；`on_read_request` 与 `on_flush`
///   没有 Promise，错误会进入异常通道。
pub trait OutboundHandler: ChannelHandler {
    /// 绑定本地地址。
    fn on_bind(
        &self,
        ctx: &dyn ChannelHandlerContext,
        local: SocketAddr,
        promise: ChannelPromise,
    ) -> HandlerResult {
        ctx.bind(local, promise);
        Ok(())
    }

    /// 连接远端。
    fn on_connect(
        &self,
        ctx: &dyn ChannelHandlerContext,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: ChannelPromise,
    ) -> HandlerResult {
        ctx.connect(remote, local, promise);
        Ok(())
    }

    /// 断开连接。
    fn on_disconnect(
        &self,
        ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        ctx.disconnect(promise);
        Ok(())
    }

    /// 关闭通道。
    fn on_close(&self, ctx: &dyn ChannelHandlerContext, promise: ChannelPromise) -> HandlerResult {
        ctx.close(promise);
        Ok(())
    }

    /// 从事件循环注销。
    fn on_deregister(
        &self,
        ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        ctx.deregister(promise);
        Ok(())
    }

    /// 请求读取更多数据。
    fn on_read_request(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.request_read();
        Ok(())
    }

    /// 写入消息。
    fn on_write(
        &self,
        ctx: &dyn ChannelHandlerContext,
        msg: PipelineMessage,
        promise: ChannelPromise,
    ) -> HandlerResult {
        ctx.write(msg, promise);
        Ok(())
    }

    /// 冲刷写缓冲。
    fn on_flush(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        ctx.flush();
        Ok(())
    }
}

/// 同时处理入站与出站事件的全双工 Handler。
///
/// 任何实现 `InboundHandler + OutboundHandler` 的类型自动实现 `DuplexHandler`。
/// 这类 Handler 角色不唯一，不能放入组合器的任一槽位。
pub trait DuplexHandler: InboundHandler + OutboundHandler {}

impl<T> DuplexHandler for T where T: InboundHandler + OutboundHandler + ?Sized {}
