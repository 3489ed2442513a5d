//! 双向组合器：把一个入站 Handler 与一个出站 Handler 打包成单个 Pipeline 阶段。
//!
//! # 设计背景（Why）
//! - 编解码等场景天然成对出现：解码器只关心入站、编码器只关心出站，但两者必须作为一个整体安装、
//!   一起出现在同一位置；
//! - 安装之后，任一半仍可独立卸下（例如协议升级时先移除解码器），另一半继续工作，
//!   被卸下的方向退化为透传。
//!
//! # 逻辑解析（How）
//! - 每一半以三态槽位保存：`Pending`（延迟构造尚未 `init`）、`Present`、`Removed`；
//! - 挂载时为两半分别创建委托上下文 `DelegatingContext`，包装 Handler 经由它向组合器前后的阶段传播事件；
//! - 槽位与挂载信息位于同一把 `parking_lot::Mutex` 中，但任何 Handler 钩子执行期间都不持锁，
//!   Handler 在回调中移除自身或再次触发事件不会死锁。
//!
//! # 契约说明（What）
//! - 构造期拒绝角色歧义的 Handler 与可共享声明；
//! - 挂载前的任何事件调度、移除操作都返回 `IllegalState`；
//! - 出站 Handler 对携带 Promise 的操作返回错误时，由组合器负责让 Promise 失败。

mod delegate;

use std::{
    any,
    borrow::Cow,
    fmt,
    net::SocketAddr,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    config::DuplexConfig,
    context::ChannelHandlerContext,
    error::{ChannelError, Direction, HandlerResult, PipelineError, codes},
    event::{InboundEvent, OutboundEvent},
    handler::{ChannelHandler, InboundHandler, OutboundHandler},
    message::{PipelineMessage, UserEvent},
    promise::ChannelPromise,
};

use self::delegate::DelegatingContext;

const LOG_TARGET: &str = "spark_duplex::combined";

/// 单侧槽位的可观测状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HalfState {
    /// 延迟构造，尚未提供 Handler。
    Pending,
    /// Handler 在位，事件委托给它。
    Present,
    /// Handler 已移除，事件透传。
    Removed,
}

/// 组合器生命周期快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplexState {
    /// 是否已挂载到 Pipeline 位置。
    pub attached: bool,
    /// 入站槽位状态。
    pub inbound: HalfState,
    /// 出站槽位状态。
    pub outbound: HalfState,
}

enum HalfSlot<H> {
    Pending,
    Present(Arc<H>),
    Removed,
}

impl<H> HalfSlot<H> {
    fn state(&self) -> HalfState {
        match self {
            HalfSlot::Pending => HalfState::Pending,
            HalfSlot::Present(_) => HalfState::Present,
            HalfSlot::Removed => HalfState::Removed,
        }
    }

    fn present(&self) -> Option<Arc<H>> {
        match self {
            HalfSlot::Present(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    /// 取出在位的 Handler 并把槽位迁移到 `Removed`；其余状态保持不变。
    fn take_present(&mut self) -> Option<Arc<H>> {
        match std::mem::replace(self, HalfSlot::Removed) {
            HalfSlot::Present(handler) => Some(handler),
            other => {
                *self = other;
                None
            }
        }
    }

    fn take(
        &mut self,
        stage: &Cow<'static, str>,
        direction: Direction,
    ) -> Result<Arc<H>, PipelineError> {
        match std::mem::replace(self, HalfSlot::Removed) {
            HalfSlot::Present(handler) => Ok(handler),
            HalfSlot::Removed => Err(PipelineError::HalfRemoved {
                stage: stage.clone(),
                direction,
            }),
            HalfSlot::Pending => {
                *self = HalfSlot::Pending;
                Err(PipelineError::HalfAbsent {
                    stage: stage.clone(),
                    direction,
                })
            }
        }
    }
}

struct Attachment {
    owner: Weak<dyn ChannelHandlerContext>,
    inbound_ctx: Arc<DelegatingContext>,
    outbound_ctx: Arc<DelegatingContext>,
}

struct Slots<I, O> {
    inbound: HalfSlot<I>,
    outbound: HalfSlot<O>,
    attachment: Option<Attachment>,
}

/// 入站 Handler 与出站 Handler 的组合器，整体作为一个双向阶段安装。
///
/// # 教案式说明
/// - **意图（Why）**：让两个各自只处理单一方向的 Handler 共享同一个 Pipeline 位置，同时保留各自独立移除的能力。
/// - **逻辑（How）**：
///   1. 构造期通过 [`ChannelHandler::as_outbound`] / [`ChannelHandler::as_inbound`] 检查角色是否唯一；
///   2. [`on_handler_added`](ChannelHandler::on_handler_added) 记录宿主上下文并创建两个委托上下文，
///      随后依次调用入站、出站 Handler 的挂载钩子；
///   3. 每个入站/出站钩子折叠为 [`InboundEvent`] / [`OutboundEvent`]，统一由 `route_*` 决定委托或透传；
///   4. [`remove_inbound_handler`](Self::remove_inbound_handler) 与
///      [`remove_outbound_handler`](Self::remove_outbound_handler) 同步执行被移除一半的卸载钩子。
/// - **契约（What）**：
///   - 组合器不可共享，同一实例只能挂载一次；
///   - 同一半至多移除一次，卸载钩子至多执行一次；
///   - 透传时 Promise 原样交给下一个阶段，身份不变。
/// - **风险提示（Trade-offs）**：移除操作与事件调度之间不做额外同步；框架假定同一位置上的调用由
///   Pipeline 串行化，跨线程移除只保证状态一致，不保证与并发事件的先后顺序。
pub struct CombinedDuplexHandler<I, O> {
    stage: Cow<'static, str>,
    slots: Mutex<Slots<I, O>>,
}

impl<I, O> CombinedDuplexHandler<I, O>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    /// 以两个 Handler 直接构造组合器。
    pub fn new(inbound: I, outbound: O) -> Result<Self, PipelineError> {
        Self::with_config(inbound, outbound, &DuplexConfig::default())
    }

    /// 以配置构造组合器。
    pub fn with_config(inbound: I, outbound: O, config: &DuplexConfig) -> Result<Self, PipelineError> {
        let combined = Self::deferred_with_config(config)?;
        combined.init(inbound, outbound)?;
        Ok(combined)
    }

    /// 创建延迟初始化形态，挂载前必须调用 [`init`](Self::init)。
    pub fn deferred() -> Self {
        Self::unchecked(stage_label::<I, O>(&DuplexConfig::default()))
    }

    /// 以配置创建延迟初始化形态。
    pub fn deferred_with_config(config: &DuplexConfig) -> Result<Self, PipelineError> {
        let stage = stage_label::<I, O>(config);
        if config.sharable {
            return Err(PipelineError::Sharable { stage });
        }
        Ok(Self::unchecked(stage))
    }

    fn unchecked(stage: Cow<'static, str>) -> Self {
        Self {
            stage,
            slots: Mutex::new(Slots {
                inbound: HalfSlot::Pending,
                outbound: HalfSlot::Pending,
                attachment: None,
            }),
        }
    }

    /// 为延迟形态提供两个 Handler。
    ///
    /// # 错误
    /// - 已挂载：[`PipelineError::AlreadyAttached`]；
    /// - 已初始化：[`PipelineError::AlreadyInitialized`]；
    /// - 角色歧义：[`PipelineError::InboundImplementsOutbound`] / [`PipelineError::OutboundImplementsInbound`]。
    ///
    /// 任一失败都不改变组合器状态。
    pub fn init(&self, inbound: I, outbound: O) -> Result<(), PipelineError> {
        validate(&inbound, &outbound)?;
        let mut slots = self.slots.lock();
        if slots.attachment.is_some() {
            return Err(PipelineError::AlreadyAttached {
                stage: self.stage.clone(),
            });
        }
        if !matches!(
            (&slots.inbound, &slots.outbound),
            (HalfSlot::Pending, HalfSlot::Pending)
        ) {
            return Err(PipelineError::AlreadyInitialized {
                stage: self.stage.clone(),
            });
        }
        slots.inbound = HalfSlot::Present(Arc::new(inbound));
        slots.outbound = HalfSlot::Present(Arc::new(outbound));
        Ok(())
    }

    /// 日志中使用的阶段标签。
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// 在位的入站 Handler。
    pub fn inbound_handler(&self) -> Option<Arc<I>> {
        self.slots.lock().inbound.present()
    }

    /// 在位的出站 Handler。
    pub fn outbound_handler(&self) -> Option<Arc<O>> {
        self.slots.lock().outbound.present()
    }

    /// 当前生命周期快照。
    pub fn state(&self) -> DuplexState {
        let slots = self.slots.lock();
        DuplexState {
            attached: slots.attachment.is_some(),
            inbound: slots.inbound.state(),
            outbound: slots.outbound.state(),
        }
    }

    /// 移除入站 Handler，此后入站事件直接透传。
    ///
    /// # 错误
    /// - 尚未挂载：[`PipelineError::NotAttached`]；
    /// - 入站半从未在位或已移除：[`PipelineError::HalfAbsent`] / [`PipelineError::HalfRemoved`]。
    ///
    /// 卸载钩子在本调用内同步执行；其错误不会返回给调用方，而是包装为
    /// `handler.removed_failed` 沿宿主上下文的异常通道传播。
    pub fn remove_inbound_handler(&self) -> Result<(), PipelineError> {
        let (handler, delegate) = {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            let attachment = slots.attachment.as_ref().ok_or_else(|| self.not_attached())?;
            let handler = slots.inbound.take(&self.stage, Direction::Inbound)?;
            (handler, Arc::clone(&attachment.inbound_ctx))
        };
        self.finish_removal(handler.as_ref(), &delegate);
        Ok(())
    }

    /// 移除出站 Handler，此后出站操作直接透传。
    ///
    /// 错误与卸载钩子语义同 [`remove_inbound_handler`](Self::remove_inbound_handler)。
    pub fn remove_outbound_handler(&self) -> Result<(), PipelineError> {
        let (handler, delegate) = {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            let attachment = slots.attachment.as_ref().ok_or_else(|| self.not_attached())?;
            let handler = slots.outbound.take(&self.stage, Direction::Outbound)?;
            (handler, Arc::clone(&attachment.outbound_ctx))
        };
        self.finish_removal(handler.as_ref(), &delegate);
        Ok(())
    }

    fn not_attached(&self) -> PipelineError {
        PipelineError::NotAttached {
            stage: self.stage.clone(),
        }
    }

    fn finish_removal(&self, handler: &dyn ChannelHandler, delegate: &DelegatingContext) {
        delegate.mark_removed();
        tracing::debug!(
            target: LOG_TARGET,
            stage = %self.stage,
            direction = %delegate.direction(),
            "half removed"
        );
        if let Err(error) = handler.on_handler_removed(delegate) {
            let message = format!(
                "{} handler of `{}` failed in on_handler_removed",
                delegate.direction(),
                self.stage
            );
            delegate.forward_exception(ChannelError::with_source(
                codes::HANDLER_REMOVED_FAILED,
                message,
                error,
            ));
        }
    }

    /// 入站事件的统一路由：在位则委托，已移除则透传。
    fn route_inbound(&self, ctx: &dyn ChannelHandlerContext, event: InboundEvent) -> HandlerResult {
        let target = {
            let slots = self.slots.lock();
            let attachment = slots.attachment.as_ref().ok_or_else(|| self.not_attached())?;
            slots
                .inbound
                .present()
                .map(|handler| (handler, Arc::clone(&attachment.inbound_ctx)))
        };
        match target {
            Some((handler, delegate)) => event.dispatch(handler.as_ref(), delegate.as_ref()),
            None => {
                event.forward(ctx);
                Ok(())
            }
        }
    }

    /// 出站操作的统一路由。
    ///
    /// 携带 Promise 的操作在任何失败路径上都会让 Promise 失败；
    /// `read_request` 与 `flush` 的错误交还给 Pipeline。
    fn route_outbound(&self, ctx: &dyn ChannelHandlerContext, event: OutboundEvent) -> HandlerResult {
        let promise = event.promise().cloned();
        let target = {
            let slots = self.slots.lock();
            match slots.attachment.as_ref() {
                Some(attachment) => Ok(slots
                    .outbound
                    .present()
                    .map(|handler| (handler, Arc::clone(&attachment.outbound_ctx)))),
                None => Err(self.not_attached()),
            }
        };
        let target = match target {
            Ok(target) => target,
            Err(error) => {
                let error = ChannelError::from(error);
                if let Some(promise) = promise {
                    promise.try_failure(error.clone());
                }
                return Err(error);
            }
        };
        let Some((handler, delegate)) = target else {
            event.forward(ctx);
            return Ok(());
        };
        match (event.dispatch(handler.as_ref(), delegate.as_ref()), promise) {
            (Err(error), Some(promise)) => {
                self.fail_promise(&promise, error);
                Ok(())
            }
            (result, _) => result,
        }
    }

    fn fail_promise(&self, promise: &ChannelPromise, error: ChannelError) {
        if !promise.try_failure(error.clone()) {
            tracing::warn!(
                target: LOG_TARGET,
                stage = %self.stage,
                code = error.code(),
                error = %error,
                "outbound handler failed after its promise was already resolved"
            );
        }
    }
}

fn stage_label<I, O>(config: &DuplexConfig) -> Cow<'static, str> {
    match &config.name {
        Some(name) => Cow::Owned(name.clone()),
        None => Cow::Owned(format!(
            "{}+{}",
            short_type_name::<I>(),
            short_type_name::<O>()
        )),
    }
}

fn short_type_name<T>() -> &'static str {
    let full = any::type_name::<T>();
    // 泛型参数中也含 `::`，只截取外层路径。
    let outer = full.split('<').next().unwrap_or(full);
    match outer.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

fn validate<I, O>(inbound: &I, outbound: &O) -> Result<(), PipelineError>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    if inbound.as_outbound().is_some() {
        return Err(PipelineError::InboundImplementsOutbound {
            handler: Cow::Borrowed(any::type_name::<I>()),
        });
    }
    if outbound.as_inbound().is_some() {
        return Err(PipelineError::OutboundImplementsInbound {
            handler: Cow::Borrowed(any::type_name::<O>()),
        });
    }
    Ok(())
}

impl<I, O> ChannelHandler for CombinedDuplexHandler<I, O>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    fn on_handler_added(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        let (inbound, outbound, inbound_ctx, outbound_ctx) = {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            if slots.attachment.is_some() {
                return Err(PipelineError::AlreadyAttached {
                    stage: self.stage.clone(),
                }
                .into());
            }
            let (Some(inbound), Some(outbound)) = (slots.inbound.present(), slots.outbound.present())
            else {
                return Err(PipelineError::NotInitialized {
                    stage: self.stage.clone(),
                }
                .into());
            };
            let inbound_ctx = DelegatingContext::new(ctx, self.stage.clone(), Direction::Inbound);
            let outbound_ctx = DelegatingContext::new(ctx, self.stage.clone(), Direction::Outbound);
            slots.attachment = Some(Attachment {
                owner: ctx.downgrade(),
                inbound_ctx: Arc::clone(&inbound_ctx),
                outbound_ctx: Arc::clone(&outbound_ctx),
            });
            (inbound, outbound, inbound_ctx, outbound_ctx)
        };
        tracing::debug!(target: LOG_TARGET, stage = %self.stage, position = ctx.name(), "attached");

        let inbound_result = inbound.on_handler_added(inbound_ctx.as_ref());
        let outbound_result = outbound.on_handler_added(outbound_ctx.as_ref());
        inbound_result.and(outbound_result)
    }

    /// 级联卸载：对仍在位的每一半各执行一次卸载钩子。
    ///
    /// 只有挂载时记录的宿主位置可以触发级联；其他位置（例如重复挂载失败后的回滚）调用时直接忽略。
    fn on_handler_removed(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        let (inbound, outbound) = {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            let Some(attachment) = slots.attachment.as_ref() else {
                return Ok(());
            };
            if !Weak::ptr_eq(&attachment.owner, &ctx.downgrade()) {
                tracing::debug!(
                    target: LOG_TARGET,
                    stage = %self.stage,
                    position = ctx.name(),
                    "removal from a foreign position ignored"
                );
                return Ok(());
            }
            (
                slots
                    .inbound
                    .take_present()
                    .map(|handler| (handler, Arc::clone(&attachment.inbound_ctx))),
                slots
                    .outbound
                    .take_present()
                    .map(|handler| (handler, Arc::clone(&attachment.outbound_ctx))),
            )
        };
        tracing::debug!(
            target: LOG_TARGET,
            stage = %self.stage,
            inbound = inbound.is_some(),
            outbound = outbound.is_some(),
            "stage removed, cascading to remaining halves"
        );
        if let Some((handler, delegate)) = inbound {
            self.finish_removal(handler.as_ref(), &delegate);
        }
        if let Some((handler, delegate)) = outbound {
            self.finish_removal(handler.as_ref(), &delegate);
        }
        Ok(())
    }

    fn is_sharable(&self) -> bool {
        false
    }

    fn as_inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }

    fn as_outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl<I, O> InboundHandler for CombinedDuplexHandler<I, O>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    fn on_channel_registered(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Registered)
    }

    fn on_channel_unregistered(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Unregistered)
    }

    fn on_channel_active(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Active)
    }

    fn on_channel_inactive(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Inactive)
    }

    fn on_read(&self, ctx: &dyn ChannelHandlerContext, msg: PipelineMessage) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Read(msg))
    }

    fn on_read_complete(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::ReadComplete)
    }

    fn on_user_event(&self, ctx: &dyn ChannelHandlerContext, event: UserEvent) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::UserEvent(event))
    }

    fn on_writability_changed(
        &self,
        ctx: &dyn ChannelHandlerContext,
        is_writable: bool,
    ) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::WritabilityChanged(is_writable))
    }

    fn on_exception_caught(
        &self,
        ctx: &dyn ChannelHandlerContext,
        error: ChannelError,
    ) -> HandlerResult {
        self.route_inbound(ctx, InboundEvent::Exception(error))
    }
}

impl<I, O> OutboundHandler for CombinedDuplexHandler<I, O>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    fn on_bind(
        &self,
        ctx: &dyn ChannelHandlerContext,
        local: SocketAddr,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Bind { local, promise })
    }

    fn on_connect(
        &self,
        ctx: &dyn ChannelHandlerContext,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.route_outbound(
            ctx,
            OutboundEvent::Connect {
                remote,
                local,
                promise,
            },
        )
    }

    fn on_disconnect(
        &self,
        ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Disconnect { promise })
    }

    fn on_close(&self, ctx: &dyn ChannelHandlerContext, promise: ChannelPromise) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Close { promise })
    }

    fn on_deregister(
        &self,
        ctx: &dyn ChannelHandlerContext,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Deregister { promise })
    }

    fn on_read_request(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::ReadRequest)
    }

    fn on_write(
        &self,
        ctx: &dyn ChannelHandlerContext,
        msg: PipelineMessage,
        promise: ChannelPromise,
    ) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Write { msg, promise })
    }

    fn on_flush(&self, ctx: &dyn ChannelHandlerContext) -> HandlerResult {
        self.route_outbound(ctx, OutboundEvent::Flush)
    }
}

impl<I, O> fmt::Debug for CombinedDuplexHandler<I, O>
where
    I: InboundHandler,
    O: OutboundHandler,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedDuplexHandler")
            .field("stage", &self.stage)
            .field("state", &self.state())
            .finish()
    }
}
