//! 出站操作的完成信号。
//!
//! # 设计背景（Why）
//! - bind/connect/disconnect/close/deregister/write 都携带一个“只能被决议一次”的完成信号；
//!   无论操作被哪个阶段最终处理，调用方都只会观测到一次成功或一次失败。
//! - 组合器在透传时原样转交同一个 Promise 句柄，不重新包装，保证身份与决议责任一起移动。
//!
//! # 契约说明（What）
//! - `set_success` / `set_failure`：严格模式，重复决议返回 [`PipelineError::PromiseAlreadyResolved`]；
//! - `try_success` / `try_failure`：宽松模式，重复决议返回 `false`，供“兜底失败”路径使用；
//! - 等待方式二选一：阻塞式 [`ChannelPromise::wait_timeout`] 或异步式 [`ChannelPromise::future`]。

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::error::{ChannelError, PipelineError};

/// 出站操作的完成信号，克隆后共享同一决议状态。
#[derive(Clone)]
pub struct ChannelPromise {
    shared: Arc<PromiseShared>,
}

struct PromiseShared {
    state: Mutex<PromiseState>,
    resolved: Condvar,
}

enum PromiseState {
    Pending { wakers: Vec<Waker> },
    Done(Result<(), ChannelError>),
}

impl ChannelPromise {
    /// 创建尚未决议的 Promise。
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PromiseShared {
                state: Mutex::new(PromiseState::Pending { wakers: Vec::new() }),
                resolved: Condvar::new(),
            }),
        }
    }

    /// 标记成功；若已决议则返回状态错误。
    pub fn set_success(&self) -> Result<(), PipelineError> {
        self.complete(Ok(()))
            .then_some(())
            .ok_or(PipelineError::PromiseAlreadyResolved)
    }

    /// 标记失败；若已决议则返回状态错误。
    pub fn set_failure(&self, error: ChannelError) -> Result<(), PipelineError> {
        self.complete(Err(error))
            .then_some(())
            .ok_or(PipelineError::PromiseAlreadyResolved)
    }

    /// 尝试标记成功，返回本次调用是否完成了决议。
    pub fn try_success(&self) -> bool {
        self.complete(Ok(()))
    }

    /// 尝试标记失败，返回本次调用是否完成了决议。
    pub fn try_failure(&self, error: ChannelError) -> bool {
        self.complete(Err(error))
    }

    /// 是否已决议。
    pub fn is_done(&self) -> bool {
        matches!(*self.shared.state.lock(), PromiseState::Done(_))
    }

    /// 是否以成功决议。
    pub fn is_success(&self) -> bool {
        matches!(*self.shared.state.lock(), PromiseState::Done(Ok(())))
    }

    /// 返回决议结果的快照；未决议时返回 `None`。
    pub fn result(&self) -> Option<Result<(), ChannelError>> {
        match &*self.shared.state.lock() {
            PromiseState::Done(result) => Some(result.clone()),
            PromiseState::Pending { .. } => None,
        }
    }

    /// 阻塞等待决议，超时返回 `None`。
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), ChannelError>> {
        let mut state = self.shared.state.lock();
        if let PromiseState::Pending { .. } = &*state {
            // 超时与否都以状态为准，避免虚假唤醒导致误判。
            let _ = self
                .shared
                .resolved
                .wait_while_for(&mut state, |s| matches!(s, PromiseState::Pending { .. }), timeout);
        }
        match &*state {
            PromiseState::Done(result) => Some(result.clone()),
            PromiseState::Pending { .. } => None,
        }
    }

    /// 返回等待决议的 Future。
    pub fn future(&self) -> PromiseFuture {
        PromiseFuture {
            promise: self.clone(),
        }
    }

    /// 判断两个句柄是否指向同一个 Promise。
    pub fn ptr_eq(&self, other: &ChannelPromise) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn complete(&self, result: Result<(), ChannelError>) -> bool {
        let wakers = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                PromiseState::Done(_) => return false,
                PromiseState::Pending { wakers } => {
                    let wakers = std::mem::take(wakers);
                    *state = PromiseState::Done(result);
                    wakers
                }
            }
        };
        self.shared.resolved.notify_all();
        for waker in wakers {
            waker.wake();
        }
        true
    }
}

impl Default for ChannelPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock() {
            PromiseState::Pending { .. } => "pending",
            PromiseState::Done(Ok(())) => "success",
            PromiseState::Done(Err(_)) => "failure",
        };
        f.debug_struct("ChannelPromise").field("state", &state).finish()
    }
}

/// [`ChannelPromise::future`] 返回的 Future。
#[derive(Debug)]
pub struct PromiseFuture {
    promise: ChannelPromise,
}

impl Future for PromiseFuture {
    type Output = Result<(), ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.promise.shared.state.lock();
        match &mut *state {
            PromiseState::Done(result) => Poll::Ready(result.clone()),
            PromiseState::Pending { wakers } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
