use chrono::{DateTime, Utc};
use shikake_analysis::state::{SymbolState, TimeframeState};
use shikake_core::analysis::entity::{
    Evidence, FairValueGap, OrderBlock, PriceZone, StructureEvent,
};
use shikake_core::common::{Direction, Timeframe, count_to_f64};
use shikake_core::config::{EngineConfig, KillZone, ScoreWeights, StrengthThresholds};
use shikake_core::signal::entity::{ScoreBreakdown, Setup, StrengthCategory};

/// # Summary
/// 汇合评分器：把结构、流动性、缺口/订单块、位移与时段证据合成为一个加权分数。
///
/// # Invariants
/// - 各子项得分位于 `[0, 对应权重]`，总分不超过权重之和。
/// - 每个方向至少生成一个无入场区域的候选。
/// - 同分时保留先生成的候选。
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    weights: ScoreWeights,
    thresholds: StrengthThresholds,
    sweep_recency_bars: usize,
    higher_timeframe: Timeframe,
    entry_timeframe: Timeframe,
    kill_zones: Vec<KillZone>,
}

impl ConfluenceScorer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            weights: config.weights,
            thresholds: config.strength,
            sweep_recency_bars: config.sweep_recency_bars,
            higher_timeframe: config.higher_timeframe,
            entry_timeframe: config.entry_timeframe,
            kill_zones: config.kill_zones.clone(),
        }
    }

    /// 分数到强度等级的映射，边界值归入较高一级。
    pub fn categorize(&self, score: f64) -> StrengthCategory {
        let t = &self.thresholds;
        if score >= t.very_high {
            StrengthCategory::VeryHigh
        } else if score >= t.high {
            StrengthCategory::High
        } else if score >= t.medium {
            StrengthCategory::Medium
        } else {
            StrengthCategory::Filtered
        }
    }

    /// 趋势得分：高周期同向满分，仅入场周期同向得一半。
    pub fn trend_credit(
        &self,
        direction: Direction,
        higher: Option<Direction>,
        entry: Option<Direction>,
    ) -> f64 {
        if higher == Some(direction) {
            self.weights.trend
        } else if entry == Some(direction) {
            self.weights.trend / 2.0
        } else {
            0.0
        }
    }

    /// 扫荡得分：发生在最新一根 K 线上为满分，之后按 K 线数线性衰减，窗口外为 0。
    pub fn sweep_credit(&self, bars_ago: Option<usize>) -> f64 {
        let Some(age) = bars_ago else {
            return 0.0;
        };
        let window = count_to_f64(self.sweep_recency_bars.max(1));
        let age = count_to_f64(age);
        if age >= window {
            0.0
        } else {
            self.weights.sweep * (1.0 - age / window)
        }
    }

    /// 区域得分：按未被消化的比例给分，FVG 与订单块重叠的汇合区给满分。
    pub fn zone_credit(&self, evidence: Option<&Evidence>) -> f64 {
        match evidence {
            None => 0.0,
            Some(e) if e.is_confluence() => self.weights.zone,
            Some(e) => {
                let remaining = (1.0 - e.mitigation_percent() / 100.0).clamp(0.0, 1.0);
                self.weights.zone * remaining
            }
        }
    }

    pub fn session_credit(&self, now: DateTime<Utc>) -> f64 {
        let time = now.time();
        if self.kill_zones.iter().any(|z| z.contains(time)) {
            self.weights.session
        } else {
            0.0
        }
    }

    /// # Summary
    /// 生成本轮全部候选形态并打分。
    ///
    /// # Logic
    /// 1. 入场周期尚无 K 线时没有候选。
    /// 2. 对每个方向收集共享证据：结构事件、窗口内最近扫荡、近期位移。
    /// 3. 该方向每个合格入场区域生成一个候选，最后追加一个无区域候选。
    ///
    /// # Arguments
    /// * `state`: 已吸收本轮 K 线的品种状态。
    /// * `now`: 评估时刻，用于时段判断。
    ///
    /// # Returns
    /// 按生成顺序排列的候选。
    pub fn candidates(&self, state: &SymbolState, now: DateTime<Utc>) -> Vec<Setup> {
        let Some(entry) = state.timeframe(self.entry_timeframe) else {
            return Vec::new();
        };
        let Some(price) = entry.last_bar().map(|b| b.close) else {
            return Vec::new();
        };
        let higher = state.timeframe(self.higher_timeframe);
        let higher_trend = higher.and_then(|h| h.structure().trend());
        let entry_trend = entry.structure().trend();
        let session = self.session_credit(now);

        let mut setups = Vec::new();
        for direction in [Direction::Bullish, Direction::Bearish] {
            let structure = higher
                .and_then(|h| latest_event(h, direction))
                .or_else(|| latest_event(entry, direction))
                .cloned();
            // 窗口外的扫荡不计分，也不作为止损依据
            let sweep = state
                .liquidity()
                .latest_sweep(direction)
                .filter(|s| entry.bars_since(s.timestamp) < self.sweep_recency_bars.max(1))
                .cloned();
            let sweep_age = sweep.as_ref().map(|s| entry.bars_since(s.timestamp));
            let displacement = entry
                .recent_displacement(direction, self.sweep_recency_bars)
                .cloned();

            let base = ScoreBreakdown {
                trend: self.trend_credit(direction, higher_trend, entry_trend),
                sweep: self.sweep_credit(sweep_age),
                displacement: if displacement.is_some() {
                    self.weights.displacement
                } else {
                    0.0
                },
                zone: 0.0,
                session,
            };

            let zones = eligible_evidence(entry, direction, price);
            for evidence in zones.into_iter().map(Some).chain(std::iter::once(None)) {
                let breakdown = ScoreBreakdown {
                    zone: self.zone_credit(evidence.as_ref()),
                    ..base
                };
                let raw_score = breakdown.total();
                setups.push(Setup {
                    symbol: state.symbol().to_string(),
                    direction,
                    structure: structure.clone(),
                    sweep: sweep.clone(),
                    evidence,
                    displacement: displacement.clone(),
                    breakdown,
                    raw_score,
                    strength: self.categorize(raw_score),
                });
            }
        }
        setups
    }

    /// 本轮最高分候选，同分取先生成者。
    pub fn best(&self, state: &SymbolState, now: DateTime<Utc>) -> Option<Setup> {
        self.candidates(state, now)
            .into_iter()
            .fold(None, |best: Option<Setup>, setup| match best {
                Some(b) if b.raw_score >= setup.raw_score => Some(b),
                _ => Some(setup),
            })
    }
}

fn latest_event(tf: &TimeframeState, direction: Direction) -> Option<&StructureEvent> {
    tf.structure()
        .events()
        .iter()
        .rev()
        .find(|e| e.direction == direction)
}

fn gap_zone(gap: &FairValueGap) -> PriceZone {
    PriceZone {
        low: gap.low,
        high: gap.high,
    }
}

fn block_zone(block: &OrderBlock) -> PriceZone {
    PriceZone {
        low: block.low,
        high: block.high,
    }
}

/// 价格尚未收穿区域远端，区域仍可作为入场依据。
fn holds(zone: PriceZone, direction: Direction, price: f64) -> bool {
    match direction {
        Direction::Bullish => price >= zone.low,
        Direction::Bearish => price <= zone.high,
    }
}

/// # Summary
/// 入场周期上该方向仍然有效的入场区域，最新的在前。
///
/// # Logic
/// 1. 未被完全填补的同向 FVG；若与某个未消化的同向订单块相交则合并为汇合区。
/// 2. 未参与汇合的其余订单块单独成为候选。
/// 3. 价格已收穿远端的区域剔除。
fn eligible_evidence(tf: &TimeframeState, direction: Direction, price: f64) -> Vec<Evidence> {
    let imbalance = tf.imbalance();
    let blocks: Vec<&OrderBlock> = imbalance
        .blocks()
        .iter()
        .rev()
        .filter(|b| b.direction == direction && !b.mitigated)
        .filter(|b| holds(block_zone(b), direction, price))
        .collect();
    let mut paired = vec![false; blocks.len()];

    let mut evidence = Vec::new();
    for gap in imbalance.gaps().iter().rev() {
        if gap.direction != direction || gap.is_void() || !holds(gap_zone(gap), direction, price) {
            continue;
        }
        let overlap = blocks
            .iter()
            .position(|b| gap_zone(gap).intersect(&block_zone(b)).is_some());
        match overlap {
            Some(i) => {
                paired[i] = true;
                evidence.push(Evidence::Confluence {
                    gap: gap.clone(),
                    block: blocks[i].clone(),
                });
            }
            None => evidence.push(Evidence::FairValueGap(gap.clone())),
        }
    }
    evidence.extend(
        blocks
            .iter()
            .zip(&paired)
            .filter(|(_, used)| !**used)
            .map(|(b, _)| Evidence::OrderBlock((*b).clone())),
    );
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scorer() -> ConfluenceScorer {
        ConfluenceScorer::from_config(&EngineConfig::default())
    }

    #[test]
    fn test_categories_inclusive_at_boundaries() {
        let s = scorer();
        assert_eq!(s.categorize(80.0), StrengthCategory::VeryHigh);
        assert_eq!(s.categorize(72.0), StrengthCategory::High);
        assert_eq!(s.categorize(65.0), StrengthCategory::High);
        assert_eq!(s.categorize(50.0), StrengthCategory::Medium);
        assert_eq!(s.categorize(49.99), StrengthCategory::Filtered);
    }

    #[test]
    fn test_trend_half_credit() {
        let s = scorer();
        let up = Some(Direction::Bullish);
        let down = Some(Direction::Bearish);
        assert_eq!(s.trend_credit(Direction::Bullish, up, down), 30.0);
        assert_eq!(s.trend_credit(Direction::Bullish, down, up), 15.0);
        assert_eq!(s.trend_credit(Direction::Bullish, None, None), 0.0);
    }

    #[test]
    fn test_sweep_decays_linearly() {
        let s = scorer();
        assert_eq!(s.sweep_credit(None), 0.0);
        assert_eq!(s.sweep_credit(Some(0)), 25.0);
        assert_eq!(s.sweep_credit(Some(5)), 12.5);
        assert_eq!(s.sweep_credit(Some(10)), 0.0);
    }

    #[test]
    fn test_zone_credit_scales_with_fill() {
        let s = scorer();
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let gap = FairValueGap {
            timeframe: Timeframe::M15,
            start_time: t,
            low: 2640.0,
            high: 2646.0,
            direction: Direction::Bullish,
            fill_percent: 50.0,
        };
        let block = OrderBlock {
            timeframe: Timeframe::M15,
            timestamp: t,
            low: 2638.0,
            high: 2642.0,
            direction: Direction::Bullish,
            mitigation_percent: 20.0,
            mitigated: false,
        };
        assert_eq!(s.zone_credit(Some(&Evidence::FairValueGap(gap.clone()))), 7.5);
        assert_eq!(s.zone_credit(Some(&Evidence::Confluence { gap, block })), 15.0);
    }

    #[test]
    fn test_session_credit_in_kill_zone() {
        let s = scorer();
        let london = Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0).unwrap();
        let asia = Utc.with_ymd_and_hms(2025, 3, 3, 3, 0, 0).unwrap();
        assert_eq!(s.session_credit(london), 10.0);
        assert_eq!(s.session_credit(asia), 0.0);
    }
}
