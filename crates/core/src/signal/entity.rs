use crate::analysis::entity::{
    DisplacementMove, Evidence, LiquiditySweep, PriceZone, StructureEvent,
};
use crate::common::Direction;
use crate::model::entity::Label;
use crate::signal::error::SignalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 信号的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignalId(pub String);

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Summary
/// 汇合评分的强度分级。
///
/// # Invariants
/// - `Filtered` 永远不会成为信号。
/// - 排序从弱到强，可直接比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrengthCategory {
    Filtered,
    Medium,
    High,
    VeryHigh,
}

impl std::fmt::Display for StrengthCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrengthCategory::Filtered => "FILTERED",
            StrengthCategory::Medium => "MEDIUM",
            StrengthCategory::High => "HIGH",
            StrengthCategory::VeryHigh => "VERY_HIGH",
        };
        f.write_str(s)
    }
}

/// # Summary
/// 各证据项的得分明细，总和即原始评分。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    // 高周期趋势一致性
    pub trend: f64,
    // 流动性扫荡（随时间衰减）
    pub sweep: f64,
    // 位移确认
    pub displacement: f64,
    // 入场区域（FVG / OB）
    pub zone: f64,
    // 交易时段
    pub session: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.trend + self.sweep + self.displacement + self.zone + self.session
    }
}

/// # Summary
/// 一轮评估中产生的候选交易形态。
///
/// # Invariants
/// - 生命周期仅限一轮评估，不被持久化。
/// - `raw_score == breakdown.total()`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub symbol: String,
    pub direction: Direction,
    // 支撑趋势判断的最新结构事件
    pub structure: Option<StructureEvent>,
    // 同向的最近一次流动性扫荡
    pub sweep: Option<LiquiditySweep>,
    // 入场区域证据
    pub evidence: Option<Evidence>,
    // 同向的最近一次位移
    pub displacement: Option<DisplacementMove>,
    pub breakdown: ScoreBreakdown,
    pub raw_score: f64,
    pub strength: StrengthCategory,
}

impl Setup {
    /// 入场区间，无证据时为 `None`。
    pub fn zone(&self) -> Option<PriceZone> {
        self.evidence.as_ref().map(Evidence::zone)
    }
}

/// # Summary
/// 入场方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    // 以当前价立即入场
    Market,
    // 在区域近端挂单
    Limit,
}

/// # Summary
/// 信号生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Won,
    Lost,
    Expired,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Pending)
    }
}

/// # Summary
/// 外部上报的信号结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
    Expired,
}

impl Outcome {
    pub fn status(&self) -> SignalStatus {
        match self {
            Outcome::Won => SignalStatus::Won,
            Outcome::Lost => SignalStatus::Lost,
            Outcome::Expired => SignalStatus::Expired,
        }
    }

    /// 只有盈亏结果可作为训练标签。
    pub fn label(&self) -> Option<Label> {
        match self {
            Outcome::Won => Some(Label::Won),
            Outcome::Lost => Some(Label::Lost),
            Outcome::Expired => None,
        }
    }
}

/// # Summary
/// 对外发布的交易信号。
///
/// # Invariants
/// - 创建后除 `status` 外不可变。
/// - `status` 恰好发生一次终态转换。
/// - `risk_reward_ratio >= min_risk_reward`，`ml_confidence ∈ [0, 1]`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_type: EntryType,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk_reward_ratio: f64,
    pub strength: StrengthCategory,
    pub raw_score: f64,
    // 模型未训练时为空
    pub ml_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// # Summary
    /// 将信号迁移到终态。
    ///
    /// # Logic
    /// 1. 若已处于终态，拒绝迁移。
    /// 2. 写入终态与结算时间。
    ///
    /// # Arguments
    /// * `outcome`: 结果。
    /// * `now`: 结算时间。
    ///
    /// # Returns
    /// 成功返回 `Ok(())`，重复结算返回 `SignalError::AlreadyResolved`。
    pub fn resolve(&mut self, outcome: Outcome, now: DateTime<Utc>) -> Result<(), SignalError> {
        if self.status.is_terminal() {
            return Err(SignalError::AlreadyResolved {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = outcome.status();
        self.resolved_at = Some(now);
        Ok(())
    }

    /// 单位风险（入场与止损的距离）。
    pub fn risk(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }
}

/// # Summary
/// 信号绩效统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub wins: usize,
    pub losses: usize,
    pub expired: usize,
    pub pending: usize,
    // 胜率 = wins / (wins + losses)，无已结算信号时为 0
    pub win_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pending() -> Signal {
        Signal {
            id: SignalId("s-1".to_string()),
            symbol: "XAUUSD".to_string(),
            direction: Direction::Bullish,
            entry_type: EntryType::Market,
            entry_price: 2650.0,
            stop_price: 2645.0,
            target_price: 2665.0,
            risk_reward_ratio: 3.0,
            strength: StrengthCategory::High,
            raw_score: 70.0,
            ml_confidence: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
            status: SignalStatus::Pending,
            resolved_at: None,
        }
    }

    #[test]
    fn test_single_terminal_transition() {
        let mut signal = pending();
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        signal.resolve(Outcome::Won, now).unwrap();
        assert_eq!(signal.status, SignalStatus::Won);
        assert_eq!(signal.resolved_at, Some(now));

        // 第二次结算被拒绝，状态不变
        let err = signal.resolve(Outcome::Lost, now).unwrap_err();
        assert!(matches!(err, SignalError::AlreadyResolved { .. }));
        assert_eq!(signal.status, SignalStatus::Won);
    }

    #[test]
    fn test_strength_ordering() {
        assert!(StrengthCategory::VeryHigh > StrengthCategory::High);
        assert!(StrengthCategory::Medium > StrengthCategory::Filtered);
    }

    #[test]
    fn test_only_won_and_lost_become_labels() {
        assert_eq!(Outcome::Won.label(), Some(Label::Won));
        assert_eq!(Outcome::Lost.label(), Some(Label::Lost));
        assert_eq!(Outcome::Expired.label(), None);
    }

    #[test]
    fn test_risk_is_distance_to_stop() {
        assert_eq!(pending().risk(), 5.0);
    }
}
