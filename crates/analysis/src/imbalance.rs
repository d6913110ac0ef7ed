use crate::buffer::RollingBuffer;
use serde::{Deserialize, Serialize};
use shikake_core::analysis::entity::{DisplacementMove, FairValueGap, OrderBlock};
use shikake_core::common::Direction;
use shikake_core::market::entity::PriceBar;
use tracing::debug;

// 缺口与订单块历史上限
const MAX_HISTORY: usize = 50;

/// # Summary
/// 单个周期的失衡区域（FVG 与订单块）。
///
/// # Invariants
/// - 填补/消化百分比单调不减；达到 100 后失效但保留，直到被历史上限淘汰。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImbalanceState {
    gaps: Vec<FairValueGap>,
    blocks: Vec<OrderBlock>,
}

impl ImbalanceState {
    pub fn gaps(&self) -> &[FairValueGap] {
        &self.gaps
    }

    pub fn blocks(&self) -> &[OrderBlock] {
        &self.blocks
    }
}

/// # Summary
/// 计算一根 K 线对区间 `[low, high]` 的侵入百分比。
///
/// # Logic
/// 多头区域位于价格下方，从上方被侵入：`(high − bar.low) / (high − low)`；
/// 空头区域对称。结果截断到 `[0, 100]`；零宽区间只要被触及即为 100。
fn intrusion_percent(low: f64, high: f64, direction: Direction, bar: &PriceBar) -> f64 {
    let width = high - low;
    let penetration = match direction {
        Direction::Bullish => high - bar.low,
        Direction::Bearish => bar.high - low,
    };
    if width <= 0.0 {
        return if penetration >= 0.0 { 100.0 } else { 0.0 };
    }
    (penetration / width * 100.0).clamp(0.0, 100.0)
}

/// # Summary
/// 失衡检测器：三根 K 线公允价值缺口与位移前的订单块。
#[derive(Debug, Clone, Copy)]
pub struct ImbalanceDetector {
    // 缺口必须严格大于此尺寸
    fvg_min_size: f64,
    // 订单块回看 K 线数
    order_block_lookback: usize,
}

impl ImbalanceDetector {
    pub fn new(fvg_min_size: f64, order_block_lookback: usize) -> Self {
        Self {
            fvg_min_size,
            order_block_lookback,
        }
    }

    /// # Summary
    /// 用最新 K 线更新所有既有缺口与订单块的填补进度。
    ///
    /// # Logic
    /// 1. 对每个未失效的区域计算本根 K 线的侵入百分比，取历史最大值。
    /// 2. 订单块达到 100% 时标记 `mitigated`。
    pub fn mitigate(&self, state: &mut ImbalanceState, bar: &PriceBar) {
        for gap in state.gaps.iter_mut().filter(|g| !g.is_void()) {
            let pct = intrusion_percent(gap.low, gap.high, gap.direction, bar);
            gap.fill_percent = gap.fill_percent.max(pct);
        }
        for block in state.blocks.iter_mut().filter(|b| !b.mitigated) {
            let pct = intrusion_percent(block.low, block.high, block.direction, bar);
            block.mitigation_percent = block.mitigation_percent.max(pct);
            if block.mitigation_percent >= 100.0 {
                block.mitigated = true;
            }
        }
    }

    /// # Summary
    /// 检查以最新 K 线为第三根的窗口是否形成公允价值缺口。
    ///
    /// # Logic
    /// 1. 多头：第三根最低价高于第一根最高价；空头：第三根最高价低于第一根最低价。
    /// 2. 缺口尺寸必须严格大于 `fvg_min_size`。
    /// 3. 第二根的实体方向必须与缺口方向一致。
    ///
    /// # Returns
    /// 新缺口（已写入状态），否则 `None`。
    pub fn detect_gap(
        &self,
        state: &mut ImbalanceState,
        bars: &RollingBuffer<PriceBar>,
    ) -> Option<FairValueGap> {
        let (first, middle, third) = (bars.back(2)?, bars.back(1)?, bars.last()?);

        let (low, high, direction) = if third.low > first.high {
            (first.high, third.low, Direction::Bullish)
        } else if third.high < first.low {
            (third.high, first.low, Direction::Bearish)
        } else {
            return None;
        };
        if high - low <= self.fvg_min_size || middle.body_direction() != Some(direction) {
            return None;
        }

        let gap = FairValueGap {
            timeframe: middle.timeframe,
            start_time: middle.timestamp,
            low,
            high,
            direction,
            fill_percent: 0.0,
        };
        debug!(
            "{} {} fair value gap {} [{}, {}]",
            middle.symbol, middle.timeframe, direction, low, high
        );
        state.gaps.push(gap.clone());
        if state.gaps.len() > MAX_HISTORY {
            let excess = state.gaps.len() - MAX_HISTORY;
            state.gaps.drain(..excess);
        }
        Some(gap)
    }

    /// # Summary
    /// 新位移出现时，寻找其起点之前最后一根反向 K 线作为订单块。
    ///
    /// # Logic
    /// 1. 定位位移起点在窗口中的位置。
    /// 2. 向前最多回看 `order_block_lookback` 根，取第一根实体与位移反向的 K 线。
    /// 3. 同一根 K 线只生成一个订单块。
    ///
    /// # Returns
    /// 新订单块（已写入状态），否则 `None`。
    pub fn detect_order_block(
        &self,
        state: &mut ImbalanceState,
        bars: &RollingBuffer<PriceBar>,
        movement: &DisplacementMove,
    ) -> Option<OrderBlock> {
        let start = (0..bars.len())
            .rev()
            .find(|i| bars.get(*i).is_some_and(|b| b.timestamp == movement.start_time))?;
        let opposing = movement.direction.opposite();
        let origin = (start.saturating_sub(self.order_block_lookback)..start)
            .rev()
            .filter_map(|i| bars.get(i))
            .find(|b| b.body_direction() == Some(opposing))?;

        if state.blocks.iter().any(|b| b.timestamp == origin.timestamp) {
            return None;
        }
        let block = OrderBlock {
            timeframe: origin.timeframe,
            timestamp: origin.timestamp,
            low: origin.low,
            high: origin.high,
            direction: movement.direction,
            mitigation_percent: 0.0,
            mitigated: false,
        };
        debug!(
            "{} {} order block {} [{}, {}]",
            origin.symbol, origin.timeframe, movement.direction, origin.low, origin.high
        );
        state.blocks.push(block.clone());
        if state.blocks.len() > MAX_HISTORY {
            let excess = state.blocks.len() - MAX_HISTORY;
            state.blocks.drain(..excess);
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use shikake_core::common::Timeframe;

    fn buffer(bars: &[(f64, f64, f64, f64)]) -> RollingBuffer<PriceBar> {
        let mut buf = RollingBuffer::new(20);
        for (i, (open, high, low, close)) in (0i64..).zip(bars.iter().copied()) {
            buf.push(PriceBar {
                symbol: "XAUUSD".to_string(),
                timeframe: Timeframe::M15,
                timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
                    + Duration::minutes(15 * i),
                open,
                high,
                low,
                close,
                volume: 1.0,
            });
        }
        buf
    }

    #[test]
    fn test_gap_size_must_exceed_minimum() {
        let detector = ImbalanceDetector::new(5.0, 5);
        let mut state = ImbalanceState::default();
        // 缺口恰好为 5，不满足严格大于
        let bars = buffer(&[
            (2636.0, 2640.0, 2634.0, 2639.0),
            (2639.0, 2652.0, 2638.0, 2650.0),
            (2650.0, 2655.0, 2645.0, 2653.0),
        ]);
        assert!(detector.detect_gap(&mut state, &bars).is_none());
    }

    #[test]
    fn test_middle_body_must_agree() {
        let detector = ImbalanceDetector::new(5.0, 5);
        let mut state = ImbalanceState::default();
        // 几何上是多头缺口，但中间为阴线
        let bars = buffer(&[
            (2636.0, 2640.0, 2634.0, 2639.0),
            (2652.0, 2653.0, 2638.0, 2641.0),
            (2650.0, 2655.0, 2646.0, 2653.0),
        ]);
        assert!(detector.detect_gap(&mut state, &bars).is_none());
    }

    #[test]
    fn test_order_block_is_last_opposing_bar() {
        let detector = ImbalanceDetector::new(5.0, 5);
        let mut state = ImbalanceState::default();
        let bars = buffer(&[
            (100.0, 101.0, 97.0, 98.0),
            (98.0, 99.5, 97.5, 99.0),
            (99.0, 99.2, 96.0, 96.5),
            (96.5, 104.0, 96.4, 103.5),
        ]);
        let movement = DisplacementMove {
            timeframe: Timeframe::M15,
            start_time: bars.get(3).unwrap().timestamp,
            end_time: bars.get(3).unwrap().timestamp,
            magnitude: 2.5,
            direction: Direction::Bullish,
        };
        let block = detector
            .detect_order_block(&mut state, &bars, &movement)
            .unwrap();
        assert_eq!(block.timestamp, bars.get(2).unwrap().timestamp);
        assert_eq!((block.low, block.high), (96.0, 99.2));

        // 同一根 K 线不会重复生成订单块
        assert!(detector
            .detect_order_block(&mut state, &bars, &movement)
            .is_none());
    }

    #[test]
    fn test_block_mitigation_is_monotone() {
        let detector = ImbalanceDetector::new(5.0, 5);
        let mut state = ImbalanceState::default();
        state.blocks.push(OrderBlock {
            timeframe: Timeframe::M15,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap(),
            low: 100.0,
            high: 110.0,
            direction: Direction::Bullish,
            mitigation_percent: 0.0,
            mitigated: false,
        });
        let bars = buffer(&[(112.0, 115.0, 106.0, 114.0), (114.0, 118.0, 108.0, 117.0)]);
        detector.mitigate(&mut state, bars.get(0).unwrap());
        assert_eq!(state.blocks()[0].mitigation_percent, 40.0);
        detector.mitigate(&mut state, bars.get(1).unwrap());
        assert_eq!(state.blocks()[0].mitigation_percent, 40.0);

        let deep = buffer(&[(104.0, 105.0, 99.0, 100.5)]);
        detector.mitigate(&mut state, deep.get(0).unwrap());
        assert!(state.blocks()[0].mitigated);
    }
}
