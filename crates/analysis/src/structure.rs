use crate::buffer::RollingBuffer;
use serde::{Deserialize, Serialize};
use shikake_core::analysis::entity::{StructureEvent, StructureKind, SwingKind, SwingPoint};
use shikake_core::common::Direction;
use shikake_core::market::entity::PriceBar;
use tracing::debug;

// 保留的摆动点与结构事件上限
const MAX_SWINGS: usize = 100;
const MAX_EVENTS: usize = 50;

/// 已确认摆动点及其是否已被收盘突破。
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackedSwing {
    point: SwingPoint,
    broken: bool,
}

/// # Summary
/// 单个周期的市场结构状态。
///
/// # Invariants
/// - 摆动点按时间顺序追加，每个摆动点至多被突破一次。
/// - `trend` 为最新一条结构事件的方向。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureState {
    swings: Vec<TrackedSwing>,
    events: Vec<StructureEvent>,
    trend: Option<Direction>,
}

impl StructureState {
    pub fn trend(&self) -> Option<Direction> {
        self.trend
    }

    pub fn events(&self) -> &[StructureEvent] {
        &self.events
    }

    pub fn last_event(&self) -> Option<&StructureEvent> {
        self.events.last()
    }

    /// 全部已确认摆动点（时间顺序）。
    pub fn swings(&self) -> impl DoubleEndedIterator<Item = &SwingPoint> + Clone + '_ {
        self.swings.iter().map(|s| &s.point)
    }

    /// 最近的某类摆动点。
    pub fn latest_swing(&self, kind: SwingKind) -> Option<&SwingPoint> {
        self.swings().rev().find(|s| s.kind == kind)
    }
}

/// # Summary
/// 结构更新的产出：本根 K 线新确认的摆动点与触发的结构事件。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureUpdate {
    pub new_swings: Vec<SwingPoint>,
    pub events: Vec<StructureEvent>,
}

/// # Summary
/// 分形摆动点识别与 BOS / ChoCH 判定。
#[derive(Debug, Clone, Copy)]
pub struct StructureAnalyzer {
    // 分形两侧各需的 K 线数
    swing_strength: usize,
}

impl StructureAnalyzer {
    pub fn new(swing_strength: usize) -> Self {
        Self {
            swing_strength: swing_strength.max(1),
        }
    }

    /// # Summary
    /// 在新 K 线已写入窗口后推进结构状态。
    ///
    /// # Logic
    /// 1. 取距最新 `swing_strength` 根的候选 K 线，严格高于（低于）两侧各 N 根即确认摆动点。
    /// 2. 用最新收盘价检查未突破的摆动高点：严格高于最近一个即触发向上事件，
    ///    所有被越过的摆动高点一并标记为已突破。
    /// 3. 对摆动低点做对称处理。
    /// 4. 无趋势或顺势为 BOS，逆势为 ChoCH，并更新趋势偏向。
    ///
    /// # Arguments
    /// * `state`: 该周期的结构状态。
    /// * `bars`: 已包含最新 K 线的窗口。
    ///
    /// # Returns
    /// 本次更新的产出。
    pub fn update(
        &self,
        state: &mut StructureState,
        bars: &RollingBuffer<PriceBar>,
    ) -> StructureUpdate {
        let mut update = StructureUpdate::default();
        let Some(latest) = bars.last() else {
            return update;
        };

        for swing in self.confirm_swings(bars) {
            debug!(
                "{} {} swing {:?} confirmed at {} ({})",
                latest.symbol, swing.timeframe, swing.kind, swing.price, swing.timestamp
            );
            state.swings.push(TrackedSwing {
                point: swing.clone(),
                broken: false,
            });
            update.new_swings.push(swing);
        }
        if state.swings.len() > MAX_SWINGS {
            let excess = state.swings.len() - MAX_SWINGS;
            state.swings.drain(..excess);
        }

        for direction in [Direction::Bullish, Direction::Bearish] {
            if let Some(level) = Self::break_swings(state, latest.close, direction) {
                let kind = match state.trend {
                    Some(trend) if trend != direction => StructureKind::ChangeOfCharacter,
                    _ => StructureKind::BreakOfStructure,
                };
                let event = StructureEvent {
                    timeframe: latest.timeframe,
                    timestamp: latest.timestamp,
                    kind,
                    direction,
                    level,
                };
                debug!(
                    "{} {} {:?} {} through {}",
                    latest.symbol, latest.timeframe, kind, direction, level
                );
                state.trend = Some(direction);
                state.events.push(event.clone());
                update.events.push(event);
            }
        }
        if state.events.len() > MAX_EVENTS {
            let excess = state.events.len() - MAX_EVENTS;
            state.events.drain(..excess);
        }

        update
    }

    /// 以最新 K 线为右侧第 N 根，判断候选 K 线是否构成分形。
    fn confirm_swings(&self, bars: &RollingBuffer<PriceBar>) -> Vec<SwingPoint> {
        let n = self.swing_strength;
        let len = bars.len();
        if len < 2 * n + 1 {
            return Vec::new();
        }
        let center = len - 1 - n;
        let Some(candidate) = bars.get(center) else {
            return Vec::new();
        };
        let neighbours: Vec<&PriceBar> = (center - n..=center + n)
            .filter(|i| *i != center)
            .filter_map(|i| bars.get(i))
            .collect();

        let mut swings = Vec::new();
        if neighbours.iter().all(|b| candidate.high > b.high) {
            swings.push(Self::swing(candidate, candidate.high, SwingKind::High));
        }
        if neighbours.iter().all(|b| candidate.low < b.low) {
            swings.push(Self::swing(candidate, candidate.low, SwingKind::Low));
        }
        swings
    }

    fn swing(bar: &PriceBar, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint {
            timeframe: bar.timeframe,
            timestamp: bar.timestamp,
            price,
            kind,
            confirmed: true,
        }
    }

    /// # Summary
    /// 标记被收盘价严格越过的摆动点。
    ///
    /// # Returns
    /// 若最近一个未突破的摆动点被越过，返回其价位。
    fn break_swings(state: &mut StructureState, close: f64, direction: Direction) -> Option<f64> {
        let kind = match direction {
            Direction::Bullish => SwingKind::High,
            Direction::Bearish => SwingKind::Low,
        };
        let exceeds = |price: f64| match direction {
            Direction::Bullish => close > price,
            Direction::Bearish => close < price,
        };

        let latest = state
            .swings
            .iter()
            .rev()
            .find(|s| s.point.kind == kind && !s.broken)?;
        if !exceeds(latest.point.price) {
            return None;
        }
        let level = latest.point.price;
        for swing in state
            .swings
            .iter_mut()
            .filter(|s| s.point.kind == kind && !s.broken && exceeds(s.point.price))
        {
            swing.broken = true;
        }
        Some(level)
    }
}
