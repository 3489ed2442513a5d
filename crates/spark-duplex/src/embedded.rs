//! 内存态参考 Pipeline：不涉及真实 I/O，把抵达链尾的入站事件与抵达链首的出站操作记录下来，
//! 供测试与演示端到端驱动 Handler。
//!
//! # 设计背景（Why）
//! - 组合器的语义（委托、透传、Promise 决议、级联卸载）只有放进真实的调度链才能完整观测；
//! - 参考实现沿用热插拔控制器的结构：Handler 链以 `ArcSwap<Vec<_>>` 暴露无锁快照，
//!   变更在 `Mutex` 保护下复制向量后原子替换，调度全程不持有任何锁。
//!
//! # 逻辑解析（How）
//! - 入站事件从链首向后寻找第一个声明入站能力且未移除的阶段；找不到时进入链尾记录区；
//! - 出站操作从链尾向前寻找出站阶段；找不到时交给内存传输层；
//! - 通道不支持独立断开（[`ChannelMetadata::has_disconnect`] 为 `false`）时，disconnect 在每次交给
//!   下一个阶段前都被改写为 close。
//!
//! # 契约说明（What）
//! - 入站钩子返回错误：交给同一阶段的 `on_exception_caught`；该钩子本身失败仅记录 `warn`；
//! - 出站钩子返回错误：携带 Promise 的操作让 Promise 失败，其余操作进入同一阶段的异常处理；
//! - [`EmbeddedPipeline::finish`] 关闭通道、卸载全部阶段、重新抛出链尾记录的首个异常，
//!   并报告是否仍有未读取的消息。

use std::{
    collections::VecDeque,
    fmt,
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::{
    config::ChannelMetadata,
    context::ChannelHandlerContext,
    error::{ChannelError, PipelineError, codes},
    event::{InboundEvent, OutboundEvent},
    handler::ChannelHandler,
    message::{PipelineMessage, UserEvent},
    pipeline::ChannelPipeline,
    promise::ChannelPromise,
};

const LOG_TARGET: &str = "spark_duplex::embedded";

/// Pipeline 中的一个位置。
struct StageContext {
    name: String,
    handler: Arc<dyn ChannelHandler>,
    pipeline: Weak<EmbeddedPipeline>,
    removed: AtomicBool,
    this: Weak<StageContext>,
}

impl StageContext {
    fn new(name: &str, handler: Arc<dyn ChannelHandler>, pipeline: Weak<EmbeddedPipeline>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.to_owned(),
            handler,
            pipeline,
            removed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// 标记移除；返回本次调用是否完成了迁移。
    fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }

    fn accepts_inbound(&self) -> bool {
        !self.is_removed() && self.handler.as_inbound().is_some()
    }

    fn accepts_outbound(&self) -> bool {
        !self.is_removed() && self.handler.as_outbound().is_some()
    }

    fn inbound(&self, event: InboundEvent) {
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.dispatch_inbound(Some(self), event);
        }
    }

    fn outbound(&self, event: OutboundEvent) {
        match self.pipeline.upgrade() {
            Some(pipeline) => pipeline.dispatch_outbound(Some(self), event),
            None => {
                if let Some(promise) = event.promise() {
                    promise.try_failure(
                        PipelineError::ContextDetached {
                            stage: self.name.clone().into(),
                        }
                        .into(),
                    );
                }
            }
        }
    }
}

impl ChannelHandlerContext for StageContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler(&self) -> Option<Arc<dyn ChannelHandler>> {
        Some(Arc::clone(&self.handler))
    }

    fn pipeline(&self) -> Option<Arc<dyn ChannelPipeline>> {
        self.pipeline
            .upgrade()
            .map(|pipeline| pipeline as Arc<dyn ChannelPipeline>)
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn downgrade(&self) -> Weak<dyn ChannelHandlerContext> {
        self.this.clone()
    }

    fn forward_channel_registered(&self) {
        self.inbound(InboundEvent::Registered);
    }

    fn forward_channel_unregistered(&self) {
        self.inbound(InboundEvent::Unregistered);
    }

    fn forward_channel_active(&self) {
        self.inbound(InboundEvent::Active);
    }

    fn forward_channel_inactive(&self) {
        self.inbound(InboundEvent::Inactive);
    }

    fn forward_read(&self, msg: PipelineMessage) {
        self.inbound(InboundEvent::Read(msg));
    }

    fn forward_read_complete(&self) {
        self.inbound(InboundEvent::ReadComplete);
    }

    fn forward_user_event(&self, event: UserEvent) {
        self.inbound(InboundEvent::UserEvent(event));
    }

    fn forward_writability_changed(&self, is_writable: bool) {
        self.inbound(InboundEvent::WritabilityChanged(is_writable));
    }

    fn forward_exception(&self, error: ChannelError) {
        self.inbound(InboundEvent::Exception(error));
    }

    fn bind(&self, local: SocketAddr, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Bind { local, promise });
    }

    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Connect {
            remote,
            local,
            promise,
        });
    }

    fn disconnect(&self, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Disconnect { promise });
    }

    fn close(&self, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Close { promise });
    }

    fn deregister(&self, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Deregister { promise });
    }

    fn request_read(&self) {
        self.outbound(OutboundEvent::ReadRequest);
    }

    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        self.outbound(OutboundEvent::Write { msg, promise });
    }

    fn flush(&self) {
        self.outbound(OutboundEvent::Flush);
    }
}

/// 内存传输层的连接状态。
#[derive(Default)]
struct Transport {
    open: bool,
    registered: bool,
    active: bool,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    pending: Vec<(PipelineMessage, ChannelPromise)>,
}

/// 链尾与链首的观测记录。
#[derive(Default)]
struct Records {
    inbound: Mutex<VecDeque<PipelineMessage>>,
    outbound: Mutex<VecDeque<PipelineMessage>>,
    user_events: Mutex<VecDeque<UserEvent>>,
    error: Mutex<Option<ChannelError>>,
    read_requests: AtomicUsize,
}

/// 内存态参考 Pipeline。
///
/// # 教案式说明
/// - **意图（Why）**：为 Handler 与组合器提供可同步断言的完整调度链，无需事件循环与套接字。
/// - **逻辑（How）**：
///   1. 构造时通过 `Arc::new_cyclic` 保存自身弱引用，位置上下文经由它回到 Pipeline；
///   2. 链路变更在 `mutation` 锁内复制快照并原子替换；生命周期钩子在锁外执行，允许 Handler 在钩子中
///      再次修改链路；
///   3. 链首的内存传输层维护 open/registered/active 三个标志，写入在 flush 时才会出现在
///      [`read_outbound`](Self::read_outbound) 中。
/// - **契约（What）**：
///   - 以 [`with_handlers`](Self::with_handlers) 构造时，先加入全部 Handler，再依次触发 registered 与 active；
///   - 不可共享的 Handler 实例同一时间只能占据一个位置；
///   - 所有方法均可跨线程调用，但调度本身不做排队，调用方负责串行化同一通道上的事件。
pub struct EmbeddedPipeline {
    metadata: ChannelMetadata,
    stages: ArcSwap<Vec<Arc<StageContext>>>,
    mutation: Mutex<()>,
    transport: Mutex<Transport>,
    records: Records,
    this: Weak<EmbeddedPipeline>,
}

impl EmbeddedPipeline {
    /// 构造不含 Handler、已注册且活跃的 Pipeline。
    pub fn new() -> Arc<Self> {
        let pipeline = Self::bare(ChannelMetadata::default());
        pipeline.register_and_activate();
        pipeline
    }

    /// 依次加入 Handler（自动命名为 `handler-<序号>`），随后触发 registered 与 active。
    pub fn with_handlers<H>(handlers: H) -> Result<Arc<Self>, PipelineError>
    where
        H: IntoIterator<Item = Arc<dyn ChannelHandler>>,
    {
        Self::with_metadata(ChannelMetadata::default(), handlers)
    }

    /// 以指定通道能力构造 Pipeline。
    pub fn with_metadata<H>(metadata: ChannelMetadata, handlers: H) -> Result<Arc<Self>, PipelineError>
    where
        H: IntoIterator<Item = Arc<dyn ChannelHandler>>,
    {
        let pipeline = Self::bare(metadata);
        for (index, handler) in handlers.into_iter().enumerate() {
            pipeline.add_last(&format!("handler-{index}"), handler)?;
        }
        pipeline.register_and_activate();
        Ok(pipeline)
    }

    fn bare(metadata: ChannelMetadata) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            metadata,
            stages: ArcSwap::from_pointee(Vec::new()),
            mutation: Mutex::new(()),
            transport: Mutex::new(Transport {
                open: true,
                ..Transport::default()
            }),
            records: Records::default(),
            this: this.clone(),
        })
    }

    fn register_and_activate(&self) {
        {
            let mut transport = self.transport.lock();
            transport.registered = true;
            transport.active = true;
        }
        self.fire_channel_registered();
        self.fire_channel_active();
    }

    /// 通道能力描述。
    pub fn metadata(&self) -> ChannelMetadata {
        self.metadata
    }

    /// 取出最早抵达链尾的入站消息。
    pub fn read_inbound(&self) -> Option<PipelineMessage> {
        self.records.inbound.lock().pop_front()
    }

    /// 取出最早冲刷到传输层的出站消息。
    pub fn read_outbound(&self) -> Option<PipelineMessage> {
        self.records.outbound.lock().pop_front()
    }

    /// 取出最早抵达链尾的用户事件。
    pub fn read_user_event(&self) -> Option<UserEvent> {
        self.records.user_events.lock().pop_front()
    }

    /// 若有异常抵达链尾且无人处理，取出并返回首个异常。
    pub fn check_exception(&self) -> Result<(), ChannelError> {
        match self.records.error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// 抵达传输层的读请求次数。
    pub fn read_requests(&self) -> usize {
        self.records.read_requests.load(Ordering::Acquire)
    }

    /// 通道是否打开。
    pub fn is_open(&self) -> bool {
        self.transport.lock().open
    }

    /// 通道是否已注册。
    pub fn is_registered(&self) -> bool {
        self.transport.lock().registered
    }

    /// 通道是否活跃。
    pub fn is_active(&self) -> bool {
        self.transport.lock().active
    }

    /// 最近一次绑定的本地地址。
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.transport.lock().local
    }

    /// 最近一次连接的远端地址。
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.transport.lock().remote
    }

    /// 关闭通道并卸载全部阶段。
    ///
    /// 返回 `Ok(true)` 表示仍有未读取的入站或出站消息；链尾记录过未处理异常时返回该异常。
    pub fn finish(&self) -> Result<bool, ChannelError> {
        self.close();
        self.destroy();
        self.check_exception()?;
        let leftover = !self.records.inbound.lock().is_empty()
            || !self.records.outbound.lock().is_empty();
        Ok(leftover)
    }

    /// 从链尾到链首依次卸载所有阶段。
    fn destroy(&self) {
        let snapshot = self.stages.load_full();
        for stage in snapshot.iter().rev() {
            if stage.mark_removed() {
                self.run_removed_hook(stage);
            }
        }
        self.commit(|chain| chain.retain(|stage| !stage.is_removed()));
        tracing::debug!(target: LOG_TARGET, stages = snapshot.len(), "pipeline destroyed");
    }

    fn commit(&self, mutate: impl FnOnce(&mut Vec<Arc<StageContext>>)) {
        let _guard = self.mutation.lock();
        let mut chain: Vec<_> = self.stages.load().iter().cloned().collect();
        mutate(&mut chain);
        self.stages.store(Arc::new(chain));
    }

    fn insert(&self, name: &str, handler: Arc<dyn ChannelHandler>, first: bool) -> Result<(), PipelineError> {
        let stage = {
            let _guard = self.mutation.lock();
            let current = self.stages.load_full();
            let live = || current.iter().filter(|stage| !stage.is_removed());
            if live().any(|stage| stage.name == name) {
                return Err(PipelineError::DuplicateName {
                    name: name.to_owned(),
                });
            }
            if !handler.is_sharable() && live().any(|stage| same_handler(&stage.handler, &handler)) {
                return Err(PipelineError::HandlerNotSharable {
                    name: name.to_owned(),
                });
            }
            let stage = StageContext::new(name, handler, self.this.clone());
            let mut chain: Vec<_> = current.iter().cloned().collect();
            if first {
                chain.insert(0, Arc::clone(&stage));
            } else {
                chain.push(Arc::clone(&stage));
            }
            self.stages.store(Arc::new(chain));
            stage
        };

        if let Err(source) = stage.handler.on_handler_added(stage.as_ref()) {
            tracing::debug!(
                target: LOG_TARGET,
                stage = name,
                code = source.code(),
                "on_handler_added failed, rolling back"
            );
            stage.mark_removed();
            if let Err(error) = stage.handler.on_handler_removed(stage.as_ref()) {
                tracing::warn!(
                    target: LOG_TARGET,
                    stage = name,
                    error = %error,
                    "on_handler_removed failed during rollback"
                );
            }
            self.commit(|chain| chain.retain(|candidate| !Arc::ptr_eq(candidate, &stage)));
            return Err(PipelineError::HandlerAddedFailed {
                name: name.to_owned(),
                source,
            });
        }
        tracing::debug!(target: LOG_TARGET, stage = name, first, "stage added");
        Ok(())
    }

    fn run_removed_hook(&self, stage: &StageContext) {
        if let Err(error) = stage.handler.on_handler_removed(stage) {
            let message = format!("handler `{}` failed in on_handler_removed", stage.name);
            self.dispatch_inbound(
                Some(stage),
                InboundEvent::Exception(ChannelError::with_source(
                    codes::HANDLER_REMOVED_FAILED,
                    message,
                    error,
                )),
            );
        }
    }

    fn position(snapshot: &[Arc<StageContext>], stage: &StageContext) -> Option<usize> {
        snapshot
            .iter()
            .position(|candidate| std::ptr::eq(candidate.as_ref(), stage))
    }

    /// 把入站事件交给 `after` 之后的第一个入站阶段；`after` 为空时从链首开始。
    fn dispatch_inbound(&self, after: Option<&StageContext>, event: InboundEvent) {
        let snapshot = self.stages.load_full();
        let start = match after {
            None => 0,
            Some(stage) => match Self::position(&snapshot, stage) {
                Some(index) => index + 1,
                None => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        stage = stage.name.as_str(),
                        event = event.name(),
                        "stage detached from pipeline, inbound event discarded"
                    );
                    return;
                }
            },
        };
        let next = snapshot
            .iter()
            .skip(start)
            .find(|stage| stage.accepts_inbound());
        match next {
            Some(stage) => self.invoke_inbound(stage, event),
            None => self.tail(event),
        }
    }

    fn invoke_inbound(&self, stage: &StageContext, event: InboundEvent) {
        let Some(handler) = stage.handler.as_inbound() else {
            return;
        };
        let is_exception = matches!(event, InboundEvent::Exception(_));
        let name = event.name();
        match event.dispatch(handler, stage) {
            Ok(()) => {}
            Err(error) if is_exception => warn_exception_hook_failed(stage, &error),
            Err(error) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    stage = stage.name.as_str(),
                    event = name,
                    code = error.code(),
                    "inbound hook failed"
                );
                self.exception_caught(stage, error);
            }
        }
    }

    /// 把某阶段钩子产生的错误交给该阶段自身的异常处理；不具备入站能力时沿链向后传播。
    fn exception_caught(&self, stage: &StageContext, error: ChannelError) {
        match stage.handler.as_inbound() {
            Some(handler) => {
                if let Err(nested) = handler.on_exception_caught(stage, error) {
                    warn_exception_hook_failed(stage, &nested);
                }
            }
            None => self.dispatch_inbound(Some(stage), InboundEvent::Exception(error)),
        }
    }

    fn tail(&self, event: InboundEvent) {
        match event {
            InboundEvent::Read(msg) => self.records.inbound.lock().push_back(msg),
            InboundEvent::UserEvent(event) => self.records.user_events.lock().push_back(event),
            InboundEvent::Exception(error) => {
                let mut recorded = self.records.error.lock();
                if recorded.is_none() {
                    *recorded = Some(error);
                } else {
                    tracing::debug!(
                        target: LOG_TARGET,
                        code = error.code(),
                        error = %error,
                        "unhandled exception dropped, an earlier one is pending"
                    );
                }
            }
            _ => {}
        }
    }

    /// 通道不支持独立断开时，把 disconnect 改写为 close。
    fn translate(&self, event: OutboundEvent) -> OutboundEvent {
        match event {
            OutboundEvent::Disconnect { promise } if !self.metadata.has_disconnect => {
                OutboundEvent::Close { promise }
            }
            other => other,
        }
    }

    /// 把出站操作交给 `before` 之前的第一个出站阶段；`before` 为空时从链尾开始。
    fn dispatch_outbound(&self, before: Option<&StageContext>, event: OutboundEvent) {
        let event = self.translate(event);
        let snapshot = self.stages.load_full();
        let end = match before {
            None => snapshot.len(),
            Some(stage) => match Self::position(&snapshot, stage) {
                Some(index) => index,
                None => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        stage = stage.name.as_str(),
                        event = event.name(),
                        "stage detached from pipeline, outbound operation rejected"
                    );
                    if let Some(promise) = event.promise() {
                        promise.try_failure(
                            PipelineError::ContextDetached {
                                stage: stage.name.clone().into(),
                            }
                            .into(),
                        );
                    }
                    return;
                }
            },
        };
        let next = snapshot[..end]
            .iter()
            .rev()
            .find(|stage| stage.accepts_outbound());
        match next {
            Some(stage) => self.invoke_outbound(stage, event),
            None => self.head(event),
        }
    }

    fn invoke_outbound(&self, stage: &StageContext, event: OutboundEvent) {
        let Some(handler) = stage.handler.as_outbound() else {
            return;
        };
        let promise = event.promise().cloned();
        if let Err(error) = event.dispatch(handler, stage) {
            match promise {
                Some(promise) => {
                    promise.try_failure(error);
                }
                None => self.exception_caught(stage, error),
            }
        }
    }

    /// 内存传输层。
    fn head(&self, event: OutboundEvent) {
        match event {
            OutboundEvent::Bind { local, promise } => {
                self.transport.lock().local = Some(local);
                promise.try_success();
            }
            OutboundEvent::Connect {
                remote,
                local,
                promise,
            } => {
                let mut transport = self.transport.lock();
                transport.remote = Some(remote);
                if local.is_some() {
                    transport.local = local;
                }
                drop(transport);
                promise.try_success();
            }
            OutboundEvent::Disconnect { promise } => {
                let was_active = std::mem::replace(&mut self.transport.lock().active, false);
                if was_active {
                    self.dispatch_inbound(None, InboundEvent::Inactive);
                }
                promise.try_success();
            }
            OutboundEvent::Close { promise } => {
                self.close_transport();
                promise.try_success();
            }
            OutboundEvent::Deregister { promise } => {
                let was_registered = std::mem::replace(&mut self.transport.lock().registered, false);
                if was_registered {
                    self.dispatch_inbound(None, InboundEvent::Unregistered);
                }
                promise.try_success();
            }
            OutboundEvent::ReadRequest => {
                self.records.read_requests.fetch_add(1, Ordering::AcqRel);
            }
            OutboundEvent::Write { msg, promise } => {
                let mut transport = self.transport.lock();
                if transport.open {
                    transport.pending.push((msg, promise));
                } else {
                    drop(transport);
                    promise.try_failure(PipelineError::ChannelClosed.into());
                }
            }
            OutboundEvent::Flush => {
                let pending = std::mem::take(&mut self.transport.lock().pending);
                for (msg, promise) in pending {
                    self.records.outbound.lock().push_back(msg);
                    promise.try_success();
                }
            }
        }
    }

    /// 关闭连接：失败所有未冲刷的写入，随后依次触发 inactive 与 unregistered。
    fn close_transport(&self) {
        let (was_active, was_registered, pending) = {
            let mut transport = self.transport.lock();
            if !transport.open {
                return;
            }
            transport.open = false;
            (
                std::mem::replace(&mut transport.active, false),
                std::mem::replace(&mut transport.registered, false),
                std::mem::take(&mut transport.pending),
            )
        };
        let closed = ChannelError::from(PipelineError::ChannelClosed);
        for (_, promise) in pending {
            promise.try_failure(closed.clone());
        }
        if was_active {
            self.dispatch_inbound(None, InboundEvent::Inactive);
        }
        if was_registered {
            self.dispatch_inbound(None, InboundEvent::Unregistered);
        }
    }
}

fn same_handler(a: &Arc<dyn ChannelHandler>, b: &Arc<dyn ChannelHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn warn_exception_hook_failed(stage: &StageContext, error: &ChannelError) {
    tracing::warn!(
        target: LOG_TARGET,
        stage = stage.name.as_str(),
        code = error.code(),
        error = %error,
        "on_exception_caught failed"
    );
}

impl ChannelPipeline for EmbeddedPipeline {
    fn add_first(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<(), PipelineError> {
        self.insert(name, handler, true)
    }

    fn add_last(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<(), PipelineError> {
        self.insert(name, handler, false)
    }

    fn remove(&self, name: &str) -> Result<Arc<dyn ChannelHandler>, PipelineError> {
        let not_found = || PipelineError::HandlerNotFound {
            name: name.to_owned(),
        };
        let stage = self
            .stages
            .load()
            .iter()
            .find(|stage| !stage.is_removed() && stage.name == name)
            .cloned()
            .ok_or_else(not_found)?;
        if !stage.mark_removed() {
            return Err(not_found());
        }
        self.run_removed_hook(&stage);
        self.commit(|chain| chain.retain(|candidate| !Arc::ptr_eq(candidate, &stage)));
        tracing::debug!(target: LOG_TARGET, stage = name, "stage removed");
        Ok(Arc::clone(&stage.handler))
    }

    fn context(&self, name: &str) -> Option<Arc<dyn ChannelHandlerContext>> {
        self.stages
            .load()
            .iter()
            .find(|stage| !stage.is_removed() && stage.name == name)
            .map(|stage| Arc::clone(stage) as Arc<dyn ChannelHandlerContext>)
    }

    fn names(&self) -> Vec<String> {
        self.stages
            .load()
            .iter()
            .filter(|stage| !stage.is_removed())
            .map(|stage| stage.name.clone())
            .collect()
    }

    fn fire_inbound(&self, event: InboundEvent) {
        self.dispatch_inbound(None, event);
    }

    fn submit_outbound(&self, event: OutboundEvent) {
        self.dispatch_outbound(None, event);
    }
}

impl fmt::Debug for EmbeddedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = self.transport.lock();
        f.debug_struct("EmbeddedPipeline")
            .field("stages", &self.names())
            .field("open", &transport.open)
            .field("registered", &transport.registered)
            .field("active", &transport.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::HandlerResult,
        handler::{InboundHandler, OutboundHandler},
    };

    /// 把读到的字节长度转成业务对象的入站 Handler。
    struct LengthDecoder;

    impl ChannelHandler for LengthDecoder {
        fn as_inbound(&self) -> Option<&dyn InboundHandler> {
            Some(self)
        }
    }

    impl InboundHandler for LengthDecoder {
        fn on_read(&self, ctx: &dyn ChannelHandlerContext, msg: PipelineMessage) -> HandlerResult {
            let len = msg.as_bytes().map_or(0, |bytes| bytes.len());
            ctx.forward_read(PipelineMessage::from_user(len));
            Ok(())
        }
    }

    /// 拒绝所有写入的出站 Handler。
    struct RejectWrites;

    impl ChannelHandler for RejectWrites {
        fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
            Some(self)
        }
    }

    impl OutboundHandler for RejectWrites {
        fn on_write(
            &self,
            _ctx: &dyn ChannelHandlerContext,
            _msg: PipelineMessage,
            _promise: ChannelPromise,
        ) -> HandlerResult {
            Err(ChannelError::new("app.rejected", "writes are disabled"))
        }

        fn on_flush(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
            Err(ChannelError::new("app.rejected", "flush is disabled"))
        }
    }

    /// 挂载即失败的 Handler。
    struct FailsOnAdd;

    impl ChannelHandler for FailsOnAdd {
        fn on_handler_added(&self, _ctx: &dyn ChannelHandlerContext) -> HandlerResult {
            Err(ChannelError::new("app.refused", "refused"))
        }
    }

    #[test]
    fn inbound_messages_reach_tail_after_decoding() {
        let pipeline = EmbeddedPipeline::with_handlers([Arc::new(LengthDecoder) as Arc<dyn ChannelHandler>])
            .expect("构造 Pipeline");
        pipeline.fire_read(PipelineMessage::from_bytes(&b"hello"[..]));
        let msg = pipeline.read_inbound().expect("消息抵达链尾");
        assert_eq!(msg.user_ref::<usize>(), Some(&5));
        assert!(pipeline.read_inbound().is_none());
    }

    #[test]
    fn writes_are_published_only_on_flush() {
        let pipeline = EmbeddedPipeline::new();
        let promise = pipeline.write(PipelineMessage::from_bytes(&b"ping"[..]));
        assert!(!promise.is_done(), "flush 之前写入保持挂起");
        assert!(pipeline.read_outbound().is_none());

        pipeline.flush();
        assert!(promise.is_success());
        let msg = pipeline.read_outbound().expect("冲刷后可读");
        assert_eq!(msg.as_bytes().map(|b| b.as_ref()), Some(&b"ping"[..]));
    }

    #[test]
    fn close_fails_pending_writes_and_rejects_new_ones() {
        let pipeline = EmbeddedPipeline::new();
        let pending = pipeline.write(PipelineMessage::from_user(1_u8));
        assert!(pipeline.close().is_success());
        assert!(!pipeline.is_open());
        assert!(!pipeline.is_active());
        assert!(!pipeline.is_registered());

        let failure = pending.result().expect("已决议").expect_err("关闭后失败");
        assert_eq!(failure.code(), codes::CHANNEL_CLOSED);

        let late = pipeline.write(PipelineMessage::from_user(2_u8));
        assert!(matches!(
            late.result().expect("已决议").expect_err("写入被拒").as_pipeline_error(),
            Some(PipelineError::ChannelClosed)
        ));
        assert!(pipeline.close().is_success(), "重复关闭仍然成功");
    }

    #[test]
    fn disconnect_is_translated_unless_supported() {
        let pipeline = EmbeddedPipeline::new();
        assert!(pipeline.disconnect().is_success());
        assert!(!pipeline.is_open(), "不支持断开时等价于关闭");

        let metadata = ChannelMetadata {
            has_disconnect: true,
        };
        let pipeline = EmbeddedPipeline::with_metadata(metadata, Vec::<Arc<dyn ChannelHandler>>::new())
            .expect("构造 Pipeline");
        assert!(pipeline.disconnect().is_success());
        assert!(pipeline.is_open(), "支持断开时通道保持打开");
        assert!(!pipeline.is_active());
    }

    #[test]
    fn outbound_errors_fail_promise_or_reach_tail() {
        let pipeline = EmbeddedPipeline::with_handlers([Arc::new(RejectWrites) as Arc<dyn ChannelHandler>])
            .expect("构造 Pipeline");
        let promise = pipeline.write(PipelineMessage::from_user(()));
        let failure = promise.result().expect("已决议").expect_err("写入被拒");
        assert_eq!(failure.code(), "app.rejected");

        pipeline.flush();
        let unhandled = pipeline.check_exception().expect_err("flush 错误进入异常通道");
        assert_eq!(unhandled.message(), "flush is disabled");
        assert!(pipeline.check_exception().is_ok(), "异常只报告一次");
    }

    #[test]
    fn failed_add_is_rolled_back() {
        let pipeline = EmbeddedPipeline::new();
        let err = pipeline
            .add_last("refuser", Arc::new(FailsOnAdd))
            .expect_err("挂载钩子失败");
        assert!(matches!(err, PipelineError::HandlerAddedFailed { .. }));
        assert!(pipeline.names().is_empty());
    }

    #[test]
    fn duplicate_names_and_instances_are_rejected() {
        let pipeline = EmbeddedPipeline::new();
        let decoder: Arc<dyn ChannelHandler> = Arc::new(LengthDecoder);
        pipeline.add_last("decoder", Arc::clone(&decoder)).expect("首次加入");
        assert!(matches!(
            pipeline.add_last("decoder", Arc::new(LengthDecoder)),
            Err(PipelineError::DuplicateName { .. })
        ));
        assert!(matches!(
            pipeline.add_first("again", decoder),
            Err(PipelineError::HandlerNotSharable { .. })
        ));
        assert_eq!(pipeline.names(), vec!["decoder".to_owned()]);
    }

    #[test]
    fn remove_returns_handler_and_unknown_names_fail() {
        let pipeline = EmbeddedPipeline::new();
        pipeline.add_last("decoder", Arc::new(LengthDecoder)).expect("加入");
        let ctx = pipeline.context("decoder").expect("位置存在");
        assert_eq!(ctx.name(), "decoder");
        assert!(!ctx.new_promise().is_done());
        pipeline.remove("decoder").expect("移除");
        assert!(ctx.is_removed());
        assert!(pipeline.context("decoder").is_none());
        assert!(matches!(
            pipeline.remove("decoder"),
            Err(PipelineError::HandlerNotFound { .. })
        ));
    }

    #[test]
    fn bind_connect_and_read_requests_reach_transport() {
        let pipeline = EmbeddedPipeline::new();
        let local: SocketAddr = "127.0.0.1:7000".parse().expect("地址");
        let remote: SocketAddr = "127.0.0.1:8000".parse().expect("地址");
        assert!(pipeline.bind(local).is_success());
        assert!(pipeline.connect(remote, None).is_success());
        pipeline.request_read();
        pipeline.request_read();
        assert_eq!(pipeline.local_address(), Some(local));
        assert_eq!(pipeline.remote_address(), Some(remote));
        assert_eq!(pipeline.read_requests(), 2);
        assert!(!pipeline.finish().expect("无异常"), "没有残留消息");
    }
}
