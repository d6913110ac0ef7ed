use crate::common::{Direction, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 摆动点的类型。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SwingKind {
    High,
    Low,
}

/// # Summary
/// 分形规则识别出的摆动高/低点。
///
/// # Invariants
/// - 只有在其后 N 根 K 线都未能超越它时才 `confirmed`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: SwingKind,
    pub confirmed: bool,
}

/// # Summary
/// 结构事件种类。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StructureKind {
    // 顺势突破 (BOS)
    BreakOfStructure,
    // 逆势突破，趋势性质改变 (ChoCH)
    ChangeOfCharacter,
}

/// # Summary
/// 收盘价严格突破已确认摆动点时产生的结构事件。
///
/// # Invariants
/// - `level` 为被突破的摆动点价格。
/// - 最新一条未被反转的事件方向即该周期的趋势偏向。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub kind: StructureKind,
    pub direction: Direction,
    pub level: f64,
}

/// # Summary
/// 流动性池的来源。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LiquidityOrigin {
    // 前一交易时段最高价
    PriorSessionHigh,
    // 前一交易时段最低价
    PriorSessionLow,
    // 等高点
    EqualHighs,
    // 等低点
    EqualLows,
}

impl LiquidityOrigin {
    /// 该流动性是否位于价格上方（买方止损聚集区）。
    pub fn is_high_side(&self) -> bool {
        matches!(self, LiquidityOrigin::PriorSessionHigh | LiquidityOrigin::EqualHighs)
    }

    /// 被扫荡后预期的反转方向：扫上方流动性看空，扫下方流动性看多。
    pub fn reversal_direction(&self) -> Direction {
        if self.is_high_side() {
            Direction::Bearish
        } else {
            Direction::Bullish
        }
    }
}

/// # Summary
/// 关键价位上的流动性区域。
///
/// # Invariants
/// - 永不删除，作为历史记录保留。
/// - `swept` 至多从 `false` 变为 `true` 一次；再次扫荡需要新的区域记录。
/// - `breached` 表示价格收盘穿越且未收回，此后不再参与扫荡判断。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub id: u64,
    pub level: f64,
    pub origin: LiquidityOrigin,
    pub swept: bool,
    pub sweep_timestamp: Option<DateTime<Utc>>,
    pub breached: bool,
    pub created_at: DateTime<Utc>,
}

impl LiquidityZone {
    /// 仍可被扫荡或作为目标位的区域。
    pub fn is_active(&self) -> bool {
        !self.swept && !self.breached
    }
}

/// # Summary
/// 一次止损猎杀（流动性扫荡）记录。
///
/// # Invariants
/// - `extreme` 为刺穿价位的影线极值，是信号止损的失效点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySweep {
    pub zone_id: u64,
    pub level: f64,
    pub origin: LiquidityOrigin,
    pub extreme: f64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

/// # Summary
/// 三根 K 线形成的公允价值缺口。
///
/// # Invariants
/// - `low < high`。
/// - `fill_percent` 单调不减，范围 `[0, 100]`；达到 100 即失效但不删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub timeframe: Timeframe,
    pub start_time: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub direction: Direction,
    pub fill_percent: f64,
}

impl FairValueGap {
    pub fn is_void(&self) -> bool {
        self.fill_percent >= 100.0
    }
}

/// # Summary
/// 位移发生前最后一根反向 K 线构成的订单块。
///
/// # Invariants
/// - `mitigation_percent` 单调不减；达到 100 时 `mitigated` 置为 `true` 且不再回退。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub direction: Direction,
    pub mitigation_percent: f64,
    pub mitigated: bool,
}

/// # Summary
/// 短时间内超出波动率阈值的单向运动。
///
/// # Invariants
/// - `magnitude` 以 ATR 的倍数表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementMove {
    pub timeframe: Timeframe,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub magnitude: f64,
    pub direction: Direction,
}

/// # Summary
/// 价格区间 `[low, high]`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceZone {
    pub low: f64,
    pub high: f64,
}

impl PriceZone {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// 两个区间的交集；不相交返回 `None`。
    pub fn intersect(&self, other: &PriceZone) -> Option<PriceZone> {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        (low <= high).then_some(PriceZone { low, high })
    }
}

/// # Summary
/// 入场区域证据的标签联合体。
/// FVG、订单块以及二者重叠的汇合区共享同一组能力：区间、方向、消化程度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Evidence {
    FairValueGap(FairValueGap),
    OrderBlock(OrderBlock),
    Confluence {
        gap: FairValueGap,
        block: OrderBlock,
    },
}

impl Evidence {
    /// 入场区间。汇合区取两者交集，不相交时退化为订单块区间。
    pub fn zone(&self) -> PriceZone {
        match self {
            Evidence::FairValueGap(g) => PriceZone {
                low: g.low,
                high: g.high,
            },
            Evidence::OrderBlock(b) => PriceZone {
                low: b.low,
                high: b.high,
            },
            Evidence::Confluence { gap, block } => {
                let g = PriceZone {
                    low: gap.low,
                    high: gap.high,
                };
                let b = PriceZone {
                    low: block.low,
                    high: block.high,
                };
                g.intersect(&b).unwrap_or(b)
            }
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Evidence::FairValueGap(g) => g.direction,
            Evidence::OrderBlock(b) => b.direction,
            Evidence::Confluence { block, .. } => block.direction,
        }
    }

    /// 已被消化的百分比 `[0, 100]`。汇合区取两者中较大者。
    pub fn mitigation_percent(&self) -> f64 {
        match self {
            Evidence::FairValueGap(g) => g.fill_percent,
            Evidence::OrderBlock(b) => b.mitigation_percent,
            Evidence::Confluence { gap, block } => gap.fill_percent.max(block.mitigation_percent),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.mitigation_percent() >= 100.0
    }

    pub fn is_confluence(&self) -> bool {
        matches!(self, Evidence::Confluence { .. })
    }
}
