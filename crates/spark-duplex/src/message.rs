//! Pipeline 中流转的消息与用户事件。

use std::{any::Any, fmt, sync::Arc};

use bytes::Bytes;

/// 在 Handler 之间流转的消息。
///
/// # 契约说明（What）
/// - `Buffer`：传输层的原始字节，使用 [`Bytes`] 以便零拷贝切片；
/// - `User`：编解码后的业务对象，由接收方通过 [`PipelineMessage::downcast_user`] 还原具体类型。
pub enum PipelineMessage {
    /// 原始字节。
    Buffer(Bytes),
    /// 业务对象。
    User(Box<dyn Any + Send + Sync>),
}

impl PipelineMessage {
    /// 由字节构造消息。
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        PipelineMessage::Buffer(bytes.into())
    }

    /// 由业务对象构造消息。
    pub fn from_user<T: Any + Send + Sync>(value: T) -> Self {
        PipelineMessage::User(Box::new(value))
    }

    /// 若为字节消息，返回其引用。
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PipelineMessage::Buffer(bytes) => Some(bytes),
            PipelineMessage::User(_) => None,
        }
    }

    /// 以借用方式查看业务对象。
    pub fn user_ref<T: Any>(&self) -> Option<&T> {
        match self {
            PipelineMessage::User(value) => value.downcast_ref::<T>(),
            PipelineMessage::Buffer(_) => None,
        }
    }

    /// 取出业务对象；类型不匹配时原样返还消息。
    pub fn downcast_user<T: Any>(self) -> Result<Box<T>, Self> {
        match self {
            PipelineMessage::User(value) => value.downcast::<T>().map_err(PipelineMessage::User),
            other => Err(other),
        }
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMessage::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            PipelineMessage::User(_) => f.write_str("User(..)"),
        }
    }
}

impl From<Bytes> for PipelineMessage {
    fn from(bytes: Bytes) -> Self {
        PipelineMessage::Buffer(bytes)
    }
}

/// 沿入站方向广播的用户自定义事件。
///
/// 事件以 `Arc` 共享，克隆后仍指向同一对象，可通过 [`UserEvent::ptr_eq`] 校验身份。
#[derive(Clone)]
pub struct UserEvent {
    payload: Arc<dyn Any + Send + Sync>,
}

impl UserEvent {
    /// 包装任意业务事件。
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
        }
    }

    /// 借用具体事件类型。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// 判断两个事件句柄是否指向同一对象。
    pub fn ptr_eq(&self, other: &UserEvent) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserEvent(..)")
    }
}
