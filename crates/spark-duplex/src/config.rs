//! 组合器与参考 Pipeline 的声明式配置。
//!
//! 配置结构实现 `serde::Deserialize`，可直接嵌入宿主的 TOML/JSON 配置文件；
//! 未出现的字段取默认值，未知字段视为错误，避免拼写错误被静默忽略。

use serde::Deserialize;

/// 组合器配置。
///
/// # 契约说明（What）
/// - `name`：日志中的阶段标签；缺省时使用两个 Handler 的类型名拼接；
/// - `sharable`：组合器持有可变的生命周期状态，只能挂载到一个位置，取值为 `true` 时构造即失败。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuplexConfig {
    /// 日志标签。
    pub name: Option<String>,
    /// 是否声明为可共享。
    pub sharable: bool,
}

impl DuplexConfig {
    /// 以名称构造配置。
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// 参考通道的能力描述。
///
/// `has_disconnect = false` 时，通道不区分断开与关闭：任何阶段发出的 disconnect 都会在交给下一个
/// 阶段之前被转换为 close。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelMetadata {
    /// 通道是否支持独立的断开操作。
    pub has_disconnect: bool,
}
