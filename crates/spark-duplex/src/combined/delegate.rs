use std::{
    borrow::Cow,
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    context::ChannelHandlerContext,
    error::{ChannelError, Direction, PipelineError},
    handler::ChannelHandler,
    message::{PipelineMessage, UserEvent},
    pipeline::ChannelPipeline,
    promise::ChannelPromise,
};

/// 组合器为每一半构建的转发上下文。
///
/// # 设计背景（Why）
/// - 被包装的单向 Handler 调用 `ctx.forward_*` / `ctx.write` 时，事件必须落在组合器所在位置之后
///   （入站）或之前（出站）的阶段上，而不是回到组合器自身；
/// - 因此委托上下文的所有传播操作都直接交给宿主上下文执行，自身只额外维护“该半是否已被移除”。
///
/// # 逻辑解析（How）
/// - 宿主上下文以弱引用保存：组合器被 Pipeline 持有，Pipeline 又持有宿主上下文，强引用会形成环；
/// - 宿主已释放时：入站传播被丢弃并记录 `warn`；携带 Promise 的出站操作以
///   [`PipelineError::ContextDetached`] 使 Promise 失败，保证调用方不会永久等待。
pub(crate) struct DelegatingContext {
    owner: Weak<dyn ChannelHandlerContext>,
    name: String,
    stage: Cow<'static, str>,
    direction: Direction,
    removed: AtomicBool,
    this: Weak<DelegatingContext>,
}

impl DelegatingContext {
    pub(crate) fn new(
        owner: &dyn ChannelHandlerContext,
        stage: Cow<'static, str>,
        direction: Direction,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            owner: owner.downgrade(),
            name: owner.name().to_owned(),
            stage,
            direction,
            removed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    fn owner(&self) -> Option<Arc<dyn ChannelHandlerContext>> {
        let owner = self.owner.upgrade();
        if owner.is_none() {
            tracing::warn!(
                target: "spark_duplex::combined",
                stage = %self.stage,
                direction = %self.direction,
                "owner context dropped, event discarded"
            );
        }
        owner
    }

    fn detached(&self, promise: ChannelPromise) {
        let error = PipelineError::ContextDetached {
            stage: self.stage.clone(),
        };
        promise.try_failure(error.into());
    }

    fn forward_with_promise(
        &self,
        promise: ChannelPromise,
        op: impl FnOnce(&dyn ChannelHandlerContext, ChannelPromise),
    ) {
        match self.owner() {
            Some(owner) => op(owner.as_ref(), promise),
            None => self.detached(promise),
        }
    }
}

impl ChannelHandlerContext for DelegatingContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler(&self) -> Option<Arc<dyn ChannelHandler>> {
        self.owner.upgrade().and_then(|owner| owner.handler())
    }

    fn pipeline(&self) -> Option<Arc<dyn ChannelPipeline>> {
        self.owner.upgrade().and_then(|owner| owner.pipeline())
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
            || self
                .owner
                .upgrade()
                .is_none_or(|owner| owner.is_removed())
    }

    fn downgrade(&self) -> Weak<dyn ChannelHandlerContext> {
        self.this.clone()
    }

    fn forward_channel_registered(&self) {
        if let Some(owner) = self.owner() {
            owner.forward_channel_registered();
        }
    }

    fn forward_channel_unregistered(&self) {
        if let Some(owner) = self.owner() {
            owner.forward_channel_unregistered();
        }
    }

    fn forward_channel_active(&self) {
        if let Some(owner) = self.owner() {
            owner.forward_channel_active();
        }
    }

    fn forward_channel_inactive(&self) {
        if let Some(owner) = self.owner() {
            owner.forward_channel_inactive();
        }
    }

    fn forward_read(&self, msg: PipelineMessage) {
        if let Some(owner) = self.owner() {
            owner.forward_read(msg);
        }
    }

    fn forward_read_complete(&self) {
        if let Some(owner) = self.owner() {
            owner.forward_read_complete();
        }
    }

    fn forward_user_event(&self, event: UserEvent) {
        if let Some(owner) = self.owner() {
            owner.forward_user_event(event);
        }
    }

    fn forward_writability_changed(&self, is_writable: bool) {
        if let Some(owner) = self.owner() {
            owner.forward_writability_changed(is_writable);
        }
    }

    fn forward_exception(&self, error: ChannelError) {
        if let Some(owner) = self.owner() {
            owner.forward_exception(error);
        }
    }

    fn bind(&self, local: SocketAddr, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| owner.bind(local, promise));
    }

    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| {
            owner.connect(remote, local, promise)
        });
    }

    fn disconnect(&self, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| owner.disconnect(promise));
    }

    fn close(&self, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| owner.close(promise));
    }

    fn deregister(&self, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| owner.deregister(promise));
    }

    fn request_read(&self) {
        if let Some(owner) = self.owner() {
            owner.request_read();
        }
    }

    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        self.forward_with_promise(promise, |owner, promise| owner.write(msg, promise));
    }

    fn flush(&self) {
        if let Some(owner) = self.owner() {
            owner.flush();
        }
    }
}
