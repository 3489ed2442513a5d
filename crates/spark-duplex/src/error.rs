//! 组合器与参考 Pipeline 共享的错误域。
//!
//! # 设计背景（Why）
//! - 框架层面存在两类截然不同的失败：一类是调用方误用 API（重复移除、未挂载即调度、角色歧义的 Handler），
//!   必须同步返回给调用者；另一类是 Handler 在事件处理中产生的运行期错误，需要沿 Pipeline 的异常通道或
//!   Promise 传播。
//! - 前者由 [`PipelineError`] 承载，派生 [`thiserror::Error`]；后者由 [`ChannelError`] 承载，
//!   可廉价克隆并保持对象身份，便于下游断言“观测到的是同一个错误”。
//!
//! # 契约说明（What）
//! - [`PipelineError::kind`] 将所有同步失败归类为 `IllegalArgument` / `IllegalState` / `Handler` 三类；
//! - `ChannelError::from(PipelineError)` 无损包装同步错误，可通过 [`ChannelError::as_pipeline_error`] 还原；
//! - 错误码遵循 `<域>.<语义>` 约定，见 [`codes`]。

use std::{borrow::Cow, error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

/// Handler 钩子的统一返回类型。
pub type HandlerResult = Result<(), ChannelError>;

/// 稳定错误码集合。
pub mod codes {
    /// 参数非法（例如角色歧义的 Handler）。
    pub const ILLEGAL_ARGUMENT: &str = "pipeline.illegal_argument";
    /// 状态非法（例如未挂载即调度、重复移除）。
    pub const ILLEGAL_STATE: &str = "pipeline.illegal_state";
    /// Handler 生命周期钩子执行失败。
    pub const HANDLER_FAILED: &str = "pipeline.handler_failed";
    /// `on_handler_removed` 钩子执行失败。
    pub const HANDLER_REMOVED_FAILED: &str = "handler.removed_failed";
    /// 通道已关闭，写入被拒绝。
    pub const CHANNEL_CLOSED: &str = "channel.closed";
}

/// 事件方向，用于在错误与日志中标注组合器的哪一半。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 入站方向（传输层 → 应用层）。
    Inbound,
    /// 出站方向（应用层 → 传输层）。
    Outbound,
}

impl Direction {
    /// 返回稳定的小写标签，供日志字段使用。
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 同步失败的粗粒度分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// 参数错误：调用方提供了不可接受的输入。
    IllegalArgument,
    /// 状态错误：操作与当前生命周期状态不符。
    IllegalState,
    /// Handler 自身在生命周期钩子中返回了错误。
    Handler,
}

/// 组合器与 Pipeline 同步返回给调用方的错误。
///
/// # 教案式说明
/// - **意图（Why）**：所有误用都在调用点立即暴露，绝不延迟到事件流中；调用方可据此修正调用顺序。
/// - **契约（What）**：
///   - 所有变体均可 `Clone`，并且不会破坏组合器状态：未牵涉的一半仍可继续使用；
///   - [`kind`](Self::kind) 提供机读分类，测试与上层策略应优先匹配分类而非错误文案。
#[derive(Clone, Debug, Error)]
pub enum PipelineError {
    /// 入站槽位的 Handler 同时声明了出站能力。
    #[error("inbound handler `{handler}` must not implement the outbound capability set")]
    InboundImplementsOutbound { handler: Cow<'static, str> },

    /// 出站槽位的 Handler 同时声明了入站能力。
    #[error("outbound handler `{handler}` must not implement the inbound capability set")]
    OutboundImplementsInbound { handler: Cow<'static, str> },

    /// 组合器被声明为可共享。
    #[error("combined duplex handler `{stage}` must not be sharable")]
    Sharable { stage: Cow<'static, str> },

    /// 重复调用 `init`。
    #[error("combined duplex handler `{stage}` was already initialized")]
    AlreadyInitialized { stage: Cow<'static, str> },

    /// 延迟初始化形态在挂载前未调用 `init`。
    #[error("init() must be invoked before `{stage}` is added to a pipeline")]
    NotInitialized { stage: Cow<'static, str> },

    /// 组合器已挂载到某个 Pipeline 位置，禁止再次挂载或重新初始化。
    #[error("combined duplex handler `{stage}` is already attached to a pipeline")]
    AlreadyAttached { stage: Cow<'static, str> },

    /// 组合器尚未挂载，无法调度事件或执行移除。
    #[error("combined duplex handler `{stage}` is not attached to a pipeline yet")]
    NotAttached { stage: Cow<'static, str> },

    /// 指定方向的 Handler 从未存在。
    #[error("{direction} handler of `{stage}` was never added")]
    HalfAbsent {
        stage: Cow<'static, str>,
        direction: Direction,
    },

    /// 指定方向的 Handler 已被移除。
    #[error("{direction} handler of `{stage}` was already removed")]
    HalfRemoved {
        stage: Cow<'static, str>,
        direction: Direction,
    },

    /// Promise 已被决议，不允许再次决议。
    #[error("promise was already resolved")]
    PromiseAlreadyResolved,

    /// Pipeline 中已存在同名阶段。
    #[error("duplicate handler name `{name}`")]
    DuplicateName { name: String },

    /// Pipeline 中不存在指定名称的阶段。
    #[error("handler `{name}` not found")]
    HandlerNotFound { name: String },

    /// 非共享 Handler 被重复加入 Pipeline。
    #[error("handler `{name}` is not sharable and was already added")]
    HandlerNotSharable { name: String },

    /// `on_handler_added` 钩子失败，阶段已被回滚。
    #[error("handler `{name}` failed in on_handler_added: {source}")]
    HandlerAddedFailed {
        name: String,
        #[source]
        source: ChannelError,
    },

    /// 委托上下文的宿主上下文已被释放，无法继续转发。
    #[error("owner context of `{stage}` has been dropped")]
    ContextDetached { stage: Cow<'static, str> },

    /// 通道已关闭。
    #[error("channel is closed")]
    ChannelClosed,
}

impl PipelineError {
    /// 返回机读分类。
    ///
    /// `HandlerAddedFailed` 会穿透包装：若底层错误本身来自框架的同步校验，则返回其原始分类。
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::InboundImplementsOutbound { .. }
            | PipelineError::OutboundImplementsInbound { .. } => PipelineErrorKind::IllegalArgument,
            PipelineError::HandlerAddedFailed { source, .. } => source
                .as_pipeline_error()
                .map(PipelineError::kind)
                .unwrap_or(PipelineErrorKind::Handler),
            _ => PipelineErrorKind::IllegalState,
        }
    }

    /// 返回与分类对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ChannelClosed => codes::CHANNEL_CLOSED,
            _ => match self.kind() {
                PipelineErrorKind::IllegalArgument => codes::ILLEGAL_ARGUMENT,
                PipelineErrorKind::IllegalState => codes::ILLEGAL_STATE,
                PipelineErrorKind::Handler => codes::HANDLER_FAILED,
            },
        }
    }
}

/// 沿异常通道与 Promise 传播的运行期错误。
///
/// # 教案式说明
/// - **意图（Why）**：同一个错误可能先被组合器内部的入站 Handler 观测，再被下游阶段观测；
///   测试与业务都需要确认两者看到的是同一个对象，因此内部以 `Arc` 共享，[`ptr_eq`](Self::ptr_eq)
///   比较身份。
/// - **逻辑（How）**：`code` 为 `'static` 稳定错误码；`message` 面向排障；`source` 保存底层原因；
///   若错误源自 [`PipelineError`]，则额外保留原始值以便无损还原。
/// - **契约（What）**：克隆只增加引用计数；`Display` 输出 `code: message`。
#[derive(Clone)]
pub struct ChannelError {
    inner: Arc<ChannelErrorInner>,
}

struct ChannelErrorInner {
    code: &'static str,
    message: Cow<'static, str>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    origin: Option<PipelineError>,
}

impl ChannelError {
    /// 以错误码与描述构造错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            inner: Arc::new(ChannelErrorInner {
                code,
                message: message.into(),
                source: None,
                origin: None,
            }),
        }
    }

    /// 附带底层原因构造错误。
    pub fn with_source(
        code: &'static str,
        message: impl Into<Cow<'static, str>>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelErrorInner {
                code,
                message: message.into(),
                source: Some(Box::new(source)),
                origin: None,
            }),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.inner.code
    }

    /// 人类可读描述。
    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// 若错误由框架同步校验产生，返回原始的 [`PipelineError`]。
    pub fn as_pipeline_error(&self) -> Option<&PipelineError> {
        self.inner.origin.as_ref()
    }

    /// 判断两个句柄是否指向同一个错误对象。
    pub fn ptr_eq(&self, other: &ChannelError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<PipelineError> for ChannelError {
    fn from(error: PipelineError) -> Self {
        Self {
            inner: Arc::new(ChannelErrorInner {
                code: error.code(),
                message: Cow::Owned(error.to_string()),
                source: None,
                origin: Some(error),
            }),
        }
    }
}

impl fmt::Debug for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelError")
            .field("code", &self.inner.code)
            .field("message", &self.inner.message)
            .field("has_source", &self.inner.source.is_some())
            .finish()
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.code, self.inner.message)
    }
}

impl StdError for ChannelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        if let Some(source) = self.inner.source.as_deref() {
            return Some(source as &(dyn StdError + 'static));
        }
        self.inner
            .origin
            .as_ref()
            .map(|origin| origin as &(dyn StdError + 'static))
    }
}
