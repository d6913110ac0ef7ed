use crate::common::Timeframe;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// # Summary
/// 分析域错误枚举，覆盖 K 线输入校验的全部失败场景。
///
/// # Invariants
/// - 返回任何错误时，分析状态保持调用前的样子。
/// - `TimestampRegression` 属于数据源契约违约，必须向调用方传播；
///   其余变体只导致本轮跳过。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    // K 线数值不自洽
    #[error("Malformed bar for {symbol} {timeframe} at {timestamp}")]
    MalformedBar {
        symbol: String,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
    },
    // K 线不属于当前状态的品种
    #[error("Bar for {found} routed to state of {expected}")]
    SymbolMismatch { expected: String, found: String },
    // 时间戳与上一根相同
    #[error("Duplicate bar for {symbol} {timeframe} at {timestamp}")]
    DuplicateTimestamp {
        symbol: String,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
    },
    // 时间戳倒退，数据源违约
    #[error("Timestamp regression for {symbol} {timeframe}: {timestamp} after {last}")]
    TimestampRegression {
        symbol: String,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },
    // 分析参数不可用（如指标周期为 0）
    #[error("Invalid analysis parameter: {0}")]
    InvalidParameter(String),
}

impl AnalysisError {
    /// 是否属于必须上抛的契约违约。
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, AnalysisError::TimestampRegression { .. })
    }
}
