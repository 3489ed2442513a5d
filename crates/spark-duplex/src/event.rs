//! 入站事件与出站操作的值类型表示。
//!
//! Pipeline 在调度时把每个钩子调用折叠为一个枚举值：这样“交给哪个 Handler”、“交给哪个上下文”
//! 与“事件本身是什么”三件事可以分开处理，组合器与参考 Pipeline 共用同一套分派逻辑。

use std::net::SocketAddr;

use crate::{
    context::ChannelHandlerContext,
    error::{ChannelError, HandlerResult},
    handler::{InboundHandler, OutboundHandler},
    message::{PipelineMessage, UserEvent},
    promise::ChannelPromise,
};

/// 入站事件。
#[derive(Debug)]
pub enum InboundEvent {
    /// 通道注册。
    Registered,
    /// 通道注销。
    Unregistered,
    /// 通道活跃。
    Active,
    /// 通道失活。
    Inactive,
    /// 读到消息。
    Read(PipelineMessage),
    /// 本轮读取结束。
    ReadComplete,
    /// 用户事件。
    UserEvent(UserEvent),
    /// 可写性变化。
    WritabilityChanged(bool),
    /// 异常通知。
    Exception(ChannelError),
}

impl InboundEvent {
    /// 事件的稳定名称，用于日志字段。
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Registered => "channel_registered",
            InboundEvent::Unregistered => "channel_unregistered",
            InboundEvent::Active => "channel_active",
            InboundEvent::Inactive => "channel_inactive",
            InboundEvent::Read(_) => "read",
            InboundEvent::ReadComplete => "read_complete",
            InboundEvent::UserEvent(_) => "user_event",
            InboundEvent::WritabilityChanged(_) => "writability_changed",
            InboundEvent::Exception(_) => "exception_caught",
        }
    }

    /// 调用 Handler 上与事件对应的钩子。
    pub fn dispatch(
        self,
        handler: &dyn InboundHandler,
        ctx: &dyn ChannelHandlerContext,
    ) -> HandlerResult {
        match self {
            InboundEvent::Registered => handler.on_channel_registered(ctx),
            InboundEvent::Unregistered => handler.on_channel_unregistered(ctx),
            InboundEvent::Active => handler.on_channel_active(ctx),
            InboundEvent::Inactive => handler.on_channel_inactive(ctx),
            InboundEvent::Read(msg) => handler.on_read(ctx, msg),
            InboundEvent::ReadComplete => handler.on_read_complete(ctx),
            InboundEvent::UserEvent(event) => handler.on_user_event(ctx, event),
            InboundEvent::WritabilityChanged(writable) => {
                handler.on_writability_changed(ctx, writable)
            }
            InboundEvent::Exception(error) => handler.on_exception_caught(ctx, error),
        }
    }

    /// 通过上下文把事件交给下一个阶段。
    pub fn forward(self, ctx: &dyn ChannelHandlerContext) {
        match self {
            InboundEvent::Registered => ctx.forward_channel_registered(),
            InboundEvent::Unregistered => ctx.forward_channel_unregistered(),
            InboundEvent::Active => ctx.forward_channel_active(),
            InboundEvent::Inactive => ctx.forward_channel_inactive(),
            InboundEvent::Read(msg) => ctx.forward_read(msg),
            InboundEvent::ReadComplete => ctx.forward_read_complete(),
            InboundEvent::UserEvent(event) => ctx.forward_user_event(event),
            InboundEvent::WritabilityChanged(writable) => ctx.forward_writability_changed(writable),
            InboundEvent::Exception(error) => ctx.forward_exception(error),
        }
    }
}

/// 出站操作。
#[derive(Debug)]
pub enum OutboundEvent {
    /// 绑定本地地址。
    Bind {
        local: SocketAddr,
        promise: ChannelPromise,
    },
    /// 连接远端。
    Connect {
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: ChannelPromise,
    },
    /// 断开连接。
    Disconnect { promise: ChannelPromise },
    /// 关闭通道。
    Close { promise: ChannelPromise },
    /// 注销。
    Deregister { promise: ChannelPromise },
    /// 请求读取。
    ReadRequest,
    /// 写消息。
    Write {
        msg: PipelineMessage,
        promise: ChannelPromise,
    },
    /// 冲刷。
    Flush,
}

impl OutboundEvent {
    /// 操作的稳定名称，用于日志字段。
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Bind { .. } => "bind",
            OutboundEvent::Connect { .. } => "connect",
            OutboundEvent::Disconnect { .. } => "disconnect",
            OutboundEvent::Close { .. } => "close",
            OutboundEvent::Deregister { .. } => "deregister",
            OutboundEvent::ReadRequest => "read_request",
            OutboundEvent::Write { .. } => "write",
            OutboundEvent::Flush => "flush",
        }
    }

    /// 操作携带的完成信号；`ReadRequest` 与 `Flush` 没有。
    pub fn promise(&self) -> Option<&ChannelPromise> {
        match self {
            OutboundEvent::Bind { promise, .. }
            | OutboundEvent::Connect { promise, .. }
            | OutboundEvent::Disconnect { promise }
            | OutboundEvent::Close { promise }
            | OutboundEvent::Deregister { promise }
            | OutboundEvent::Write { promise, .. } => Some(promise),
            OutboundEvent::ReadRequest | OutboundEvent::Flush => None,
        }
    }

    /// 调用 Handler 上与操作对应的钩子。
    pub fn dispatch(
        self,
        handler: &dyn OutboundHandler,
        ctx: &dyn ChannelHandlerContext,
    ) -> HandlerResult {
        match self {
            OutboundEvent::Bind { local, promise } => handler.on_bind(ctx, local, promise),
            OutboundEvent::Connect {
                remote,
                local,
                promise,
            } => handler.on_connect(ctx, remote, local, promise),
            OutboundEvent::Disconnect { promise } => handler.on_disconnect(ctx, promise),
            OutboundEvent::Close { promise } => handler.on_close(ctx, promise),
            OutboundEvent::Deregister { promise } => handler.on_deregister(ctx, promise),
            OutboundEvent::ReadRequest => handler.on_read_request(ctx),
            OutboundEvent::Write { msg, promise } => handler.on_write(ctx, msg, promise),
            OutboundEvent::Flush => handler.on_flush(ctx),
        }
    }

    /// 通过上下文把操作交给前一个阶段。
    pub fn forward(self, ctx: &dyn ChannelHandlerContext) {
        match self {
            OutboundEvent::Bind { local, promise } => ctx.bind(local, promise),
            OutboundEvent::Connect {
                remote,
                local,
                promise,
            } => ctx.connect(remote, local, promise),
            OutboundEvent::Disconnect { promise } => ctx.disconnect(promise),
            OutboundEvent::Close { promise } => ctx.close(promise),
            OutboundEvent::Deregister { promise } => ctx.deregister(promise),
            OutboundEvent::ReadRequest => ctx.request_read(),
            OutboundEvent::Write { msg, promise } => ctx.write(msg, promise),
            OutboundEvent::Flush => ctx.flush(),
        }
    }
}
