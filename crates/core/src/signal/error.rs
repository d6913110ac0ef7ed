use crate::signal::entity::{SignalId, SignalStatus};
use thiserror::Error;

/// # Summary
/// 信号域错误枚举，处理结果上报与生命周期迁移失败。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    // 未知信号
    #[error("Signal not found: {0}")]
    NotFound(SignalId),
    // 信号已处于终态
    #[error("Signal {id} already resolved as {status:?}")]
    AlreadyResolved { id: SignalId, status: SignalStatus },
}

/// # Summary
/// 信号下游投递错误。调用方只记录日志，不影响信号本身。
#[derive(Error, Debug)]
pub enum SinkError {
    // 下游通道已关闭或无订阅者
    #[error("Sink closed: {0}")]
    Closed(String),
    // 投递失败
    #[error("Delivery failed: {0}")]
    Delivery(String),
}
