use std::{net::SocketAddr, sync::Arc};

use crate::{
    context::ChannelHandlerContext,
    error::{ChannelError, PipelineError},
    event::{InboundEvent, OutboundEvent},
    handler::ChannelHandler,
    message::{PipelineMessage, UserEvent},
    promise::ChannelPromise,
};

/// Pipeline 控制面：组织 Handler 位置，并作为事件流的入口。
///
/// # 设计背景（Why）
/// - 组合器只依赖这一抽象访问“所在的 Pipeline”，不关心具体调度实现；
/// - 入站事件从链首进入、依次向后；出站操作从链尾进入、依次向前，最终抵达传输层。
///
/// # 契约说明（What）
/// - `add_first` / `add_last`：加入新位置并同步调用 `on_handler_added`；钩子失败时位置被回滚，
///   返回 [`PipelineError::HandlerAddedFailed`]；
/// - `remove`：移除位置并同步调用 `on_handler_removed`，返回被移除的 Handler；
/// - `fire_inbound` / `submit_outbound`：事件入口，其余方法是它们的便捷包装。
///
/// # 线程安全
/// - Trait 要求 `Send + Sync`；实现需保证调度期间不持有会被 Handler 回调重入的锁。
pub trait ChannelPipeline: Send + Sync {
    /// 在链首加入 Handler。
    fn add_first(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<(), PipelineError>;

    /// 在链尾加入 Handler。
    fn add_last(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<(), PipelineError>;

    /// 按名称移除 Handler。
    fn remove(&self, name: &str) -> Result<Arc<dyn ChannelHandler>, PipelineError>;

    /// 查询指定名称位置的上下文。
    fn context(&self, name: &str) -> Option<Arc<dyn ChannelHandlerContext>>;

    /// 按调度顺序返回所有位置名称。
    fn names(&self) -> Vec<String>;

    /// 从链首注入入站事件。
    fn fire_inbound(&self, event: InboundEvent);

    /// 从链尾注入出站操作。
    fn submit_outbound(&self, event: OutboundEvent);

    /// 注入通道注册事件。
    fn fire_channel_registered(&self) {
        self.fire_inbound(InboundEvent::Registered);
    }

    /// 注入通道注销事件。
    fn fire_channel_unregistered(&self) {
        self.fire_inbound(InboundEvent::Unregistered);
    }

    /// 注入通道活跃事件。
    fn fire_channel_active(&self) {
        self.fire_inbound(InboundEvent::Active);
    }

    /// 注入通道失活事件。
    fn fire_channel_inactive(&self) {
        self.fire_inbound(InboundEvent::Inactive);
    }

    /// 注入读消息。
    fn fire_read(&self, msg: PipelineMessage) {
        self.fire_inbound(InboundEvent::Read(msg));
    }

    /// 注入读完成事件。
    fn fire_read_complete(&self) {
        self.fire_inbound(InboundEvent::ReadComplete);
    }

    /// 注入用户事件。
    fn fire_user_event(&self, event: UserEvent) {
        self.fire_inbound(InboundEvent::UserEvent(event));
    }

    /// 注入可写性变化。
    fn fire_writability_changed(&self, is_writable: bool) {
        self.fire_inbound(InboundEvent::WritabilityChanged(is_writable));
    }

    /// 注入异常。
    fn fire_exception(&self, error: ChannelError) {
        self.fire_inbound(InboundEvent::Exception(error));
    }

    /// 绑定本地地址，返回完成信号。
    fn bind(&self, local: SocketAddr) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Bind {
            local,
            promise: promise.clone(),
        });
        promise
    }

    /// 连接远端，返回完成信号。
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Connect {
            remote,
            local,
            promise: promise.clone(),
        });
        promise
    }

    /// 断开连接，返回完成信号。
    fn disconnect(&self) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Disconnect {
            promise: promise.clone(),
        });
        promise
    }

    /// 关闭通道，返回完成信号。
    fn close(&self) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Close {
            promise: promise.clone(),
        });
        promise
    }

    /// 注销通道，返回完成信号。
    fn deregister(&self) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Deregister {
            promise: promise.clone(),
        });
        promise
    }

    /// 请求读取。
    fn request_read(&self) {
        self.submit_outbound(OutboundEvent::ReadRequest);
    }

    /// 写消息，返回完成信号。
    fn write(&self, msg: PipelineMessage) -> ChannelPromise {
        let promise = ChannelPromise::new();
        self.submit_outbound(OutboundEvent::Write {
            msg,
            promise: promise.clone(),
        });
        promise
    }

    /// 冲刷写缓冲。
    fn flush(&self) {
        self.submit_outbound(OutboundEvent::Flush);
    }

    /// 写入并冲刷，返回完成信号。
    fn write_and_flush(&self, msg: PipelineMessage) -> ChannelPromise {
        let promise = self.write(msg);
        self.flush();
        promise
    }
}
