#![doc = r#"
# spark-duplex

## 设计意图（Why）
- 在事件驱动的协议处理链中，很多 Handler 只关心单一方向：解码器处理入站字节，编码器处理出站对象。
  两者往往需要作为一个整体安装在同一个位置，安装之后又希望能各自独立卸下。
- 本 crate 提供 [`CombinedDuplexHandler`]：把一个入站 Handler 与一个出站 Handler 打包成单一的双向阶段，
  并定义它所依赖的 Handler、上下文、Pipeline 与 Promise 契约。

## 核心契约（What）
- **构造期校验**：入站槽位的 Handler 不得声明出站能力，反之亦然（`IllegalArgument`）；组合器不可共享
  （`IllegalState`）。
- **生命周期**：构造（直接或延迟 + `init`）→ 挂载一次 → 事件调度与局部移除 → 随位置一起卸载，
  对仍在位的每一半各执行一次卸载钩子。
- **路由**：在位的一半经由委托上下文处理事件；已移除的一半退化为透传。
- **失败传播**：误用同步返回 [`PipelineError`]；Handler 运行期错误经异常通道或 Promise 传播为 [`ChannelError`]。

## 模块速览（How）
- [`handler`]：`ChannelHandler` / `InboundHandler` / `OutboundHandler` 三层合约；
- [`context`]：位置上下文，事件传播的唯一入口；
- [`pipeline`]：Pipeline 控制面与事件入口；
- [`combined`]：双向组合器；
- [`embedded`]：内存态参考 Pipeline，用于测试与演示；
- [`config`]：可由 `serde` 反序列化的配置；
- [`error`] / [`promise`] / [`message`] / [`event`]：共享的值类型。
"#]
#![deny(unsafe_code)]

pub mod combined;
pub mod config;
pub mod context;
pub mod embedded;
pub mod error;
pub mod event;
pub mod handler;
pub mod message;
pub mod pipeline;
pub mod promise;

pub use combined::{CombinedDuplexHandler, DuplexState, HalfState};
pub use config::{ChannelMetadata, DuplexConfig};
pub use context::ChannelHandlerContext;
pub use embedded::EmbeddedPipeline;
pub use error::{ChannelError, Direction, HandlerResult, PipelineError, PipelineErrorKind, codes};
pub use event::{InboundEvent, OutboundEvent};
pub use handler::{ChannelHandler, DuplexHandler, InboundHandler, OutboundHandler};
pub use message::{PipelineMessage, UserEvent};
pub use pipeline::ChannelPipeline;
pub use promise::{ChannelPromise, PromiseFuture};
