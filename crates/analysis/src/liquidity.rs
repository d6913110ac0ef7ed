use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shikake_core::analysis::entity::{
    LiquidityOrigin, LiquiditySweep, LiquidityZone, SwingKind, SwingPoint,
};
use shikake_core::common::Direction;
use shikake_core::market::entity::PriceBar;
use std::collections::HashMap;
use tracing::debug;

const MAX_ZONES: usize = 200;
const MAX_SWEEPS: usize = 50;

/// 当前 UTC 交易日的高低点。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SessionRange {
    date: NaiveDate,
    high: f64,
    low: f64,
}

/// # Summary
/// 单个品种在入场周期上的流动性状态。
///
/// # Invariants
/// - `zones` 只追加；失效区域保留为历史，超出上限时淘汰最旧的失效区域。
/// - `pending` 中的区域已被上一根 K 线刺穿且收盘未收回，等待下一根裁决。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidityState {
    zones: Vec<LiquidityZone>,
    pending: HashMap<u64, f64>,
    sweeps: Vec<LiquiditySweep>,
    session: Option<SessionRange>,
    next_id: u64,
}

impl LiquidityState {
    pub fn zones(&self) -> &[LiquidityZone] {
        &self.zones
    }

    /// 未被扫荡且未被击穿的区域。
    pub fn active_zones(&self) -> impl Iterator<Item = &LiquidityZone> + '_ {
        self.zones.iter().filter(|z| z.is_active())
    }

    pub fn sweeps(&self) -> &[LiquiditySweep] {
        &self.sweeps
    }

    /// 预期反转方向为 `direction` 的最近一次扫荡。
    pub fn latest_sweep(&self, direction: Direction) -> Option<&LiquiditySweep> {
        self.sweeps.iter().rev().find(|s| s.direction == direction)
    }

    fn add_zone(&mut self, level: f64, origin: LiquidityOrigin, bar: &PriceBar) -> LiquidityZone {
        self.next_id += 1;
        let zone = LiquidityZone {
            id: self.next_id,
            level,
            origin,
            swept: false,
            sweep_timestamp: None,
            breached: false,
            created_at: bar.timestamp,
        };
        debug!("{} liquidity zone {:?} at {}", bar.symbol, origin, level);
        self.zones.push(zone.clone());
        zone
    }

    fn prune(&mut self) {
        while self.zones.len() > MAX_ZONES {
            match self.zones.iter().position(|z| !z.is_active()) {
                Some(idx) => {
                    self.zones.remove(idx);
                }
                None => break,
            }
        }
        if self.sweeps.len() > MAX_SWEEPS {
            let excess = self.sweeps.len() - MAX_SWEEPS;
            self.sweeps.drain(..excess);
        }
    }
}

/// # Summary
/// 流动性映射器：维护前一交易日高低点与等高/等低点，并识别止损猎杀。
#[derive(Debug, Clone, Copy)]
pub struct LiquidityMapper {
    // 等高/等低点相对容差
    tolerance: f64,
    // 回看的同类摆动点数量
    lookback: usize,
}

impl LiquidityMapper {
    pub fn new(tolerance: f64, lookback: usize) -> Self {
        Self { tolerance, lookback }
    }

    /// # Summary
    /// 用一根入场周期 K 线推进流动性状态。
    ///
    /// # Logic
    /// 1. UTC 日期切换时，以上一交易日的高低点创建新区域。
    /// 2. 本根 K 线确认的摆动点若与回看范围内的同类摆动点在容差内相等，创建等高/等低区域。
    /// 3. 逐个检查有效区域：
    ///    - 上一根已刺穿待裁决的区域，本根收盘收回则记为扫荡，否则标记击穿。
    ///    - 影线刺穿且同根收盘收回即扫荡；收盘未收回则挂起等待下一根。
    ///
    /// # Arguments
    /// * `state`: 该品种的流动性状态。
    /// * `bar`: 最新的入场周期 K 线。
    /// * `new_swings`: 本根 K 线确认的摆动点。
    /// * `history`: 入场周期全部已确认摆动点（包含 `new_swings`）。
    ///
    /// # Returns
    /// 本根 K 线产生的扫荡记录。
    pub fn update<'a>(
        &self,
        state: &mut LiquidityState,
        bar: &PriceBar,
        new_swings: &[SwingPoint],
        history: impl DoubleEndedIterator<Item = &'a SwingPoint> + Clone,
    ) -> Vec<LiquiditySweep> {
        self.roll_session(state, bar);
        let fresh = self.map_equal_levels(state, bar, new_swings, history);

        let mut sweeps = Vec::new();
        for zone in state.zones.iter_mut() {
            if !zone.is_active() || fresh.contains(&zone.id) {
                continue;
            }
            let high_side = zone.origin.is_high_side();
            let (pierced, returned, wick) = if high_side {
                (bar.high > zone.level, bar.close < zone.level, bar.high)
            } else {
                (bar.low < zone.level, bar.close > zone.level, bar.low)
            };
            let deeper = |a: f64, b: f64| if high_side { a.max(b) } else { a.min(b) };

            let verdict = match state.pending.remove(&zone.id) {
                Some(prev) => {
                    let extreme = if pierced { deeper(prev, wick) } else { prev };
                    Some((returned, extreme))
                }
                None if pierced => {
                    if returned {
                        Some((true, wick))
                    } else {
                        state.pending.insert(zone.id, wick);
                        None
                    }
                }
                None => None,
            };

            match verdict {
                Some((true, extreme)) => {
                    zone.swept = true;
                    zone.sweep_timestamp = Some(bar.timestamp);
                    let sweep = LiquiditySweep {
                        zone_id: zone.id,
                        level: zone.level,
                        origin: zone.origin,
                        extreme,
                        timestamp: bar.timestamp,
                        direction: zone.origin.reversal_direction(),
                    };
                    debug!(
                        "{} swept {:?} {} (wick {}), {} candidate",
                        bar.symbol, zone.origin, zone.level, extreme, sweep.direction
                    );
                    sweeps.push(sweep);
                }
                Some((false, _)) => {
                    zone.breached = true;
                    debug!("{} breached {:?} {}", bar.symbol, zone.origin, zone.level);
                }
                None => {}
            }
        }

        state.sweeps.extend(sweeps.iter().cloned());
        state.prune();
        sweeps
    }

    fn roll_session(&self, state: &mut LiquidityState, bar: &PriceBar) {
        let date = bar.timestamp.date_naive();
        match state.session {
            Some(mut session) if session.date == date => {
                session.high = session.high.max(bar.high);
                session.low = session.low.min(bar.low);
                state.session = Some(session);
            }
            previous => {
                if let Some(prior) = previous {
                    state.add_zone(prior.high, LiquidityOrigin::PriorSessionHigh, bar);
                    state.add_zone(prior.low, LiquidityOrigin::PriorSessionLow, bar);
                }
                state.session = Some(SessionRange {
                    date,
                    high: bar.high,
                    low: bar.low,
                });
            }
        }
    }

    /// 返回本根新建的等高/等低区域 id。
    fn map_equal_levels<'a>(
        &self,
        state: &mut LiquidityState,
        bar: &PriceBar,
        new_swings: &[SwingPoint],
        history: impl DoubleEndedIterator<Item = &'a SwingPoint> + Clone,
    ) -> Vec<u64> {
        let mut created = Vec::new();
        for swing in new_swings {
            let origin = match swing.kind {
                SwingKind::High => LiquidityOrigin::EqualHighs,
                SwingKind::Low => LiquidityOrigin::EqualLows,
            };
            let partner = history
                .clone()
                .rev()
                .filter(|s| s.kind == swing.kind && s.timestamp < swing.timestamp)
                .take(self.lookback)
                .find(|s| self.is_equal(s.price, swing.price));
            let Some(partner) = partner else {
                continue;
            };
            let level = match swing.kind {
                SwingKind::High => partner.price.max(swing.price),
                SwingKind::Low => partner.price.min(swing.price),
            };
            let duplicate = state
                .zones
                .iter()
                .any(|z| z.is_active() && z.origin == origin && self.is_equal(z.level, level));
            if !duplicate {
                created.push(state.add_zone(level, origin, bar).id);
            }
        }
        created
    }

    fn is_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance * a.abs().max(b.abs())
    }
}
