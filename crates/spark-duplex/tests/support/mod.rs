//! 集成测试共用的记录型 Handler。
//!
//! 所有 Handler 都把观测到的事件写入共享队列，测试按顺序 `poll` 断言；记录型 Handler 不继续传播事件，
//! 以便精确判断事件在哪一站被消费。

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex, OnceLock, Weak},
};

use spark_duplex::{
    ChannelError, ChannelHandler, ChannelHandlerContext, ChannelPipeline, ChannelPromise,
    CombinedDuplexHandler, HandlerResult, InboundHandler, OutboundHandler, PipelineMessage,
    UserEvent,
};

/// 测试中使用的占位地址。
pub fn address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// 安装输出到测试捕获区的日志订阅者；重复调用是安全的。
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Registered,
    Unregistered,
    Active,
    Inactive,
    Read,
    ReadComplete,
    ExceptionCaught,
    UserEvent,
    WritabilityChanged,
    HandlerAdded,
    HandlerRemoved,
    Bind,
    Connect,
    Write,
    Flush,
    ReadRequest,
    Deregister,
    Close,
    Disconnect,
}

/// 跨 Handler 共享的事件队列。
#[derive(Clone, Default)]
pub struct EventQueue {
    events: Arc<Mutex<VecDeque<Event>>>,
}

impl EventQueue {
    pub fn push(&self, event: Event) {
        self.events.lock().expect("recording lock").push_back(event);
    }

    pub fn poll(&self) -> Option<Event> {
        self.events.lock().expect("recording lock").pop_front()
    }

    pub fn drain(&self) -> Vec<Event> {
        self.events.lock().expect("recording lock").drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().expect("recording lock").is_empty()
    }
}

/// 记录所有入站事件并就地消费的入站 Handler。
pub struct RecordingInbound {
    queue: EventQueue,
}

impl RecordingInbound {
    pub fn new(queue: EventQueue) -> Self {
        Self { queue }
    }

    fn record(&self, event: Event) -> HandlerResult {
        self.queue.push(event);
        Ok(())
    }
}

impl ChannelHandler for RecordingInbound {
    fn on_handler_added(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::HandlerAdded)
    }

    fn on_handler_removed(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::HandlerRemoved)
    }

    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }
}

impl InboundHandler for RecordingInbound {
    fn on_channel_registered(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::Registered)
    }

    fn on_channel_unregistered(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::Unregistered)
    }

    fn on_channel_active(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::Active)
    }

    fn on_channel_inactive(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::Inactive)
    }

    fn on_read(&self, _ctx: &dyn ChannelHandlerContext, _msg: PipelineMessage) -> HandlerResult {
        self.record(Event::Read)
    }

    fn on_read_complete(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::ReadComplete)
    }

    fn on_user_event(&self, _ctx: &dyn ChannelHandlerContext, _event: UserEvent) -> HandlerResult {
        self.record(Event::UserEvent)
    }

    fn on_writability_changed(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _is_writable: bool,
    ) -> HandlerResult {
        self.record(Event::WritabilityChanged)
    }

    fn on_exception_caught(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _error: ChannelError,
    ) -> HandlerResult {
        self.record(Event::ExceptionCaught)
    }
}

/// 记录所有出站操作并就地吞掉的出站 Handler；Promise 保持挂起。
pub struct RecordingOutbound {
    queue: EventQueue,
}

impl RecordingOutbound {
    pub fn new(queue: EventQueue) -> Self {
        Self { queue }
    }

    fn record(&self, event: Event) -> HandlerResult {
        self.queue.push(event);
        Ok(())
    }
}

impl ChannelHandler for RecordingOutbound {
    fn on_handler_added(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::HandlerAdded)
    }

    fn on_handler_removed(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::HandlerRemoved)
    }

    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl OutboundHandler for RecordingOutbound {
    fn on_bind(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _local: SocketAddr,
        _promise: ChannelPromise,
    ) -> HandlerResult {
        self.record(Event::Bind)
    }

    fn on_connect(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _remote: SocketAddr,
        _local: Option<SocketAddr>,
        _promise: ChannelPromise,
    ) -> HandlerResult {
        self.record(Event::Connect)
    }

    fn on_disconnect(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _promise: ChannelPromise,
    ) -> HandlerResult {
        self.record(Event::Disconnect)
    }

    fn on_close(&self, _ctx: &dyn ChannelHandlerContext, _promise: ChannelPromise) -> HandlerResult {
        self.record(Event::Close)
    }

    fn on_deregister(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _promise: ChannelPromise,
    ) -> HandlerResult {
        self.record(Event::Deregister)
    }

    fn on_read_request(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::ReadRequest)
    }

    fn on_write(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _msg: PipelineMessage,
        _promise: ChannelPromise,
    ) -> HandlerResult {
        self.record(Event::Write)
    }

    fn on_flush(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.record(Event::Flush)
    }
}

/// 全部使用默认透传实现的入站 Handler。
pub struct PassInbound;

impl ChannelHandler for PassInbound {
    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }
}

impl InboundHandler for PassInbound {}

/// 全部使用默认透传实现的出站 Handler。
pub struct PassOutbound;

impl ChannelHandler for PassOutbound {
    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl OutboundHandler for PassOutbound {}

/// 同时声明两种能力的 Handler，放入任一槽位都应被拒绝。
pub struct Duplex;

impl ChannelHandler for Duplex {
    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }

    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl InboundHandler for Duplex {
    fn on_channel_active(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        Ok(())
    }
}

impl OutboundHandler for Duplex {
    fn on_bind(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _local: SocketAddr,
        promise: ChannelPromise,
    ) -> HandlerResult {
        promise.try_failure(ChannelError::new("app.unsupported", "bind unsupported"));
        Ok(())
    }
}

/// 异常观测记录：(观测者标签, 错误)。
#[derive(Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<(&'static str, ChannelError)>>>,
}

impl ErrorLog {
    pub fn record(&self, label: &'static str, error: ChannelError) {
        self.entries
            .lock()
            .expect("recording lock")
            .push((label, error));
    }

    pub fn take(&self) -> Vec<(&'static str, ChannelError)> {
        std::mem::take(&mut *self.entries.lock().expect("recording lock"))
    }
}

/// 记录异常的入站 Handler，可选择继续传播或读取失败。
pub struct ExceptionRecorder {
    label: &'static str,
    log: ErrorLog,
    forward: bool,
    fail_reads: bool,
}

impl ExceptionRecorder {
    /// 记录后继续向后传播。
    pub fn forwarding(label: &'static str, log: ErrorLog) -> Self {
        Self {
            label,
            log,
            forward: true,
            fail_reads: false,
        }
    }

    /// 记录后就地消费。
    pub fn terminal(label: &'static str, log: ErrorLog) -> Self {
        Self {
            label,
            log,
            forward: false,
            fail_reads: false,
        }
    }

    /// 读取消息时返回错误。
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }
}

impl ChannelHandler for ExceptionRecorder {
    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }
}

impl InboundHandler for ExceptionRecorder {
    fn on_read(&self, ctx: &dyn ChannelHandlerContext, msg: PipelineMessage) -> HandlerResult {
        if self.fail_reads {
            return Err(ChannelError::new("app.decode", "malformed frame"));
        }
        ctx.forward_read(msg);
        Ok(())
    }

    fn on_exception_caught(
        &self,
        ctx: &dyn ChannelHandlerContext,
        error: ChannelError,
    ) -> HandlerResult {
        self.log.record(self.label, error.clone());
        if self.forward {
            ctx.forward_exception(error);
        }
        Ok(())
    }
}

/// 立即让所有 Promise 成功的出站 Handler，并保留看到的 Promise 以校验身份。
#[derive(Default)]
pub struct PromiseResolver {
    seen: Mutex<Vec<ChannelPromise>>,
}

impl PromiseResolver {
    pub fn last_seen(&self) -> Option<ChannelPromise> {
        self.seen.lock().expect("recording lock").last().cloned()
    }

    fn resolve(&self, promise: ChannelPromise) -> HandlerResult {
        self.seen
            .lock()
            .expect("recording lock")
            .push(promise.clone());
        promise.set_success().map_err(ChannelError::from)
    }
}

impl ChannelHandler for PromiseResolver {
    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl OutboundHandler for PromiseResolver {
    fn on_bind(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _local: SocketAddr,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.resolve(promise)
    }

    fn on_connect(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _remote: SocketAddr,
        _local: Option<SocketAddr>,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.resolve(promise)
    }

    fn on_disconnect(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.resolve(promise)
    }

    fn on_close(&self, _ctx: &dyn ChannelHandlerContext, promise: ChannelPromise) -> HandlerResult {
        self.resolve(promise)
    }

    fn on_deregister(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.resolve(promise)
    }

    fn on_write(
        &self,
        _ctx: &dyn ChannelHandlerContext,
        _msg: PipelineMessage,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.resolve(promise)
    }
}

/// 第一次读取时把自己从所在组合器中移除的入站 Handler。
pub struct SelfRemovingInbound {
    combined: OnceLock<Weak<CombinedDuplexHandler<SelfRemovingInbound, PassOutbound>>>,
    queue: EventQueue,
}

impl SelfRemovingInbound {
    pub fn new(queue: EventQueue) -> Self {
        Self {
            combined: OnceLock::new(),
            queue,
        }
    }

    pub fn bind_owner(&self, owner: &Arc<CombinedDuplexHandler<SelfRemovingInbound, PassOutbound>>) {
        let _ = self.combined.set(Arc::downgrade(owner));
    }
}

impl ChannelHandler for SelfRemovingInbound {
    fn on_handler_removed(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.queue.push(Event::HandlerRemoved);
        Ok(())
    }

    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }
}

impl InboundHandler for SelfRemovingInbound {
    fn on_read(&self, ctx: &dyn ChannelHandlerContext, msg: PipelineMessage) -> HandlerResult {
        self.queue.push(Event::Read);
        if let Some(combined) = self.combined.get().and_then(Weak::upgrade) {
            combined.remove_inbound_handler()?;
        }
        ctx.forward_read(msg);
        Ok(())
    }
}

/// 依次执行一轮完整的出站操作。
pub fn do_outbound_operations(pipeline: &dyn ChannelPipeline) {
    pipeline.bind(address());
    pipeline.connect(address(), None);
    pipeline.write(PipelineMessage::from_user("msg"));
    pipeline.flush();
    pipeline.request_read();
    pipeline.disconnect();
    pipeline.close();
    pipeline.deregister();
}
