use crate::signal::entity::{Outcome, Signal, SignalId};
use crate::signal::error::{SignalError, SinkError};
use async_trait::async_trait;

/// # Summary
/// 信号下游（外部协作者）接口，负责将新信号扇出给订阅方。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持并发调用。
/// - 无需确认；投递失败只会被记录。
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// # Summary
    /// 发布一个刚生成的信号。
    ///
    /// # Arguments
    /// * `signal`: 待发布的信号。
    ///
    /// # Returns
    /// * 成功返回 `Ok(())`。
    /// * 失败返回 `Err(SinkError)`。
    async fn emit(&self, signal: &Signal) -> Result<(), SinkError>;
}

/// # Summary
/// 结果上报接口，外部在信号结算后调用。
#[async_trait]
pub trait OutcomeRecorder: Send + Sync {
    /// # Summary
    /// 上报信号结果。
    ///
    /// # Logic
    /// 1. 将信号迁移到终态。
    /// 2. 若结果可作为标签，生成训练样本并推进训练计数。
    ///
    /// # Arguments
    /// * `signal_id`: 信号标识。
    /// * `outcome`: 结果。
    ///
    /// # Returns
    /// 未知信号或重复结算返回 `SignalError`。
    async fn record_outcome(&self, signal_id: &SignalId, outcome: Outcome)
    -> Result<(), SignalError>;
}
