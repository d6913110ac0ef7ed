use chrono::{DateTime, Utc};
use shikake_core::common::Direction;
use shikake_core::config::EngineConfig;
use shikake_core::signal::entity::{EntryType, Setup, Signal, SignalId, SignalStatus};
use thiserror::Error;
use uuid::Uuid;

/// # Summary
/// 构建信号时所需的行情快照（入场周期）。
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    // 最新收盘价
    pub price: f64,
    pub atr: Option<f64>,
    // 与信号方向相反的最新已确认摆动点：做多取摆动低点，做空取摆动高点
    pub opposing_swing: Option<f64>,
    // 未被扫荡、未被突破的流动性价位：做多取上方，做空取下方
    pub liquidity_targets: Vec<f64>,
}

/// # Summary
/// 信号被丢弃的原因。丢弃不产生任何副作用。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildRejection {
    #[error("No invalidation level available")]
    NoInvalidation,
    #[error("Non-positive risk: entry {entry}, stop {stop}")]
    NonPositiveRisk { entry: f64, stop: f64 },
    #[error("Risk/reward {ratio:.2} below minimum {required:.2}")]
    BelowMinimum { ratio: f64, required: f64 },
}

/// # Summary
/// 信号构建器：把合格形态转换为带入场、止损、目标的具体信号。
///
/// # Invariants
/// - 产出的信号满足 `risk > 0` 且 `risk_reward_ratio >= min_risk_reward`。
/// - 比较前不做任何取整。
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    min_risk_reward: f64,
    stop_buffer_atr: f64,
    target_risk_multiple: f64,
}

impl SignalBuilder {
    pub fn new(min_risk_reward: f64, stop_buffer_atr: f64, target_risk_multiple: f64) -> Self {
        Self {
            min_risk_reward,
            stop_buffer_atr,
            target_risk_multiple,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.min_risk_reward,
            config.stop_buffer_atr,
            config.target_risk_multiple,
        )
    }

    /// # Summary
    /// 计算入场方式与入场价。
    ///
    /// # Logic
    /// 1. 无入场区域，或当前价位于区域内：市价入场。
    /// 2. 否则在区域近端挂限价：做多取区域上沿，做空取区域下沿。
    pub fn entry(&self, setup: &Setup, price: f64) -> (EntryType, f64) {
        match setup.zone() {
            Some(zone) if !zone.contains(price) => match setup.direction {
                Direction::Bullish => (EntryType::Limit, zone.high),
                Direction::Bearish => (EntryType::Limit, zone.low),
            },
            _ => (EntryType::Market, price),
        }
    }

    /// # Summary
    /// 计算止损价。
    ///
    /// # Logic
    /// 1. 在扫荡影线极值与区域远端中取保护性最强者（做多取最低，做空取最高）。
    /// 2. 两者皆无时退化为最新反向摆动点。
    /// 3. 向外追加 `stop_buffer_atr × ATR` 的缓冲，ATR 未就绪时不加缓冲。
    pub fn stop(&self, setup: &Setup, snapshot: &MarketSnapshot) -> Option<f64> {
        let direction = setup.direction;
        let sweep = setup.sweep.as_ref().map(|s| s.extreme);
        let far_edge = setup.zone().map(|z| match direction {
            Direction::Bullish => z.low,
            Direction::Bearish => z.high,
        });
        let invalidation = [sweep, far_edge]
            .into_iter()
            .flatten()
            .reduce(|a, b| match direction {
                Direction::Bullish => a.min(b),
                Direction::Bearish => a.max(b),
            })
            .or(snapshot.opposing_swing)?;
        let buffer = snapshot.atr.unwrap_or(0.0) * self.stop_buffer_atr;
        Some(invalidation - direction.sign() * buffer)
    }

    /// # Summary
    /// 计算目标价：最近的反向流动性与 `entry ± multiple × risk` 中更近者。
    ///
    /// # Returns
    /// `(目标价, 盈亏比)`。采用默认目标时盈亏比即 `target_risk_multiple`。
    pub fn target(
        &self,
        direction: Direction,
        entry: f64,
        risk: f64,
        liquidity: &[f64],
    ) -> (f64, f64) {
        let reach = self.target_risk_multiple * risk;
        let nearest = liquidity
            .iter()
            .map(|level| (*level, (level - entry) * direction.sign()))
            .filter(|(_, distance)| *distance > 0.0)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((level, distance)) if distance < reach => (level, distance / risk),
            _ => (
                entry + direction.sign() * reach,
                self.target_risk_multiple,
            ),
        }
    }

    /// # Summary
    /// 由合格形态构建信号。
    ///
    /// # Logic
    /// 1. 计算入场、止损，风险必须为正。
    /// 2. 计算目标与盈亏比，低于下限即丢弃。
    /// 3. 生成新的信号 ID，状态为 `Pending`。
    ///
    /// # Arguments
    /// * `setup`: 通过评分与模型门槛的形态。
    /// * `snapshot`: 入场周期行情快照。
    /// * `ml_confidence`: 模型概率，无模型时为 `None`。
    /// * `now`: 信号创建时间。
    ///
    /// # Returns
    /// 信号或丢弃原因。
    pub fn build(
        &self,
        setup: &Setup,
        snapshot: &MarketSnapshot,
        ml_confidence: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Signal, BuildRejection> {
        let direction = setup.direction;
        let (entry_type, entry) = self.entry(setup, snapshot.price);
        let stop = self
            .stop(setup, snapshot)
            .ok_or(BuildRejection::NoInvalidation)?;
        let risk = (entry - stop) * direction.sign();
        if !(risk.is_finite() && risk > 0.0) {
            return Err(BuildRejection::NonPositiveRisk { entry, stop });
        }

        let (target, ratio) = self.target(direction, entry, risk, &snapshot.liquidity_targets);
        if !(ratio >= self.min_risk_reward) {
            return Err(BuildRejection::BelowMinimum {
                ratio,
                required: self.min_risk_reward,
            });
        }

        Ok(Signal {
            id: SignalId(Uuid::new_v4().to_string()),
            symbol: setup.symbol.clone(),
            direction,
            entry_type,
            entry_price: entry,
            stop_price: stop,
            target_price: target,
            risk_reward_ratio: ratio,
            strength: setup.strength,
            raw_score: setup.raw_score,
            ml_confidence,
            created_at: now,
            status: SignalStatus::Pending,
            resolved_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shikake_core::analysis::entity::{Evidence, OrderBlock};
    use shikake_core::common::Timeframe;
    use shikake_core::signal::entity::{ScoreBreakdown, StrengthCategory};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
    }

    fn setup(direction: Direction, zone: Option<(f64, f64)>) -> Setup {
        Setup {
            symbol: "XAUUSD".to_string(),
            direction,
            structure: None,
            sweep: None,
            evidence: zone.map(|(low, high)| {
                Evidence::OrderBlock(OrderBlock {
                    timeframe: Timeframe::M15,
                    timestamp: now(),
                    low,
                    high,
                    direction,
                    mitigation_percent: 0.0,
                    mitigated: false,
                })
            }),
            displacement: None,
            breakdown: ScoreBreakdown::default(),
            raw_score: 72.0,
            strength: StrengthCategory::High,
        }
    }

    /// 入场 2650.50，止损 2645.00，目标 2665.50：盈亏比约 2.73。
    fn example_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            price: 2650.5,
            atr: None,
            opposing_swing: None,
            liquidity_targets: vec![2665.5, 2690.0],
        }
    }

    #[test]
    fn test_rejects_ratio_below_minimum() {
        let builder = SignalBuilder::new(3.0, 0.25, 3.0);
        let s = setup(Direction::Bullish, Some((2645.0, 2652.0)));
        let err = builder
            .build(&s, &example_snapshot(), Some(0.71), now())
            .unwrap_err();
        match err {
            BuildRejection::BelowMinimum { ratio, required } => {
                assert!((ratio - 15.0 / 5.5).abs() < 1e-9);
                assert_eq!(required, 3.0);
            }
            other => unreachable!("unexpected rejection {other:?}"),
        }
    }

    #[test]
    fn test_emits_when_minimum_is_lower() {
        let builder = SignalBuilder::new(2.5, 0.25, 3.0);
        let s = setup(Direction::Bullish, Some((2645.0, 2652.0)));
        let signal = builder
            .build(&s, &example_snapshot(), Some(0.71), now())
            .unwrap();
        assert_eq!(signal.entry_type, EntryType::Market);
        assert_eq!(signal.entry_price, 2650.5);
        assert_eq!(signal.stop_price, 2645.0);
        assert_eq!(signal.target_price, 2665.5);
        assert!(signal.risk_reward_ratio >= 2.5);
        assert_eq!(signal.ml_confidence, Some(0.71));
        assert_eq!(signal.status, SignalStatus::Pending);
    }

    #[test]
    fn test_limit_entry_at_near_edge() {
        let builder = SignalBuilder::new(3.0, 0.25, 3.0);
        let bearish = setup(Direction::Bearish, Some((2660.0, 2664.0)));
        assert_eq!(builder.entry(&bearish, 2655.0), (EntryType::Limit, 2660.0));
        let bullish = setup(Direction::Bullish, Some((2640.0, 2646.0)));
        assert_eq!(builder.entry(&bullish, 2655.0), (EntryType::Limit, 2646.0));
        assert_eq!(
            builder.entry(&setup(Direction::Bullish, None), 2655.0),
            (EntryType::Market, 2655.0)
        );
    }

    #[test]
    fn test_default_target_and_atr_buffer() {
        let builder = SignalBuilder::new(3.0, 0.25, 3.0);
        let s = setup(Direction::Bearish, None);
        let snapshot = MarketSnapshot {
            price: 1.1000,
            atr: Some(0.0020),
            opposing_swing: Some(1.1030),
            liquidity_targets: Vec::new(),
        };
        let signal = builder.build(&s, &snapshot, None, now()).unwrap();
        // 止损 = 1.1030 + 0.25 × 0.0020
        assert!((signal.stop_price - 1.1035).abs() < 1e-12);
        assert!((signal.target_price - (1.1000 - 3.0 * 0.0035)).abs() < 1e-12);
        assert_eq!(signal.risk_reward_ratio, 3.0);
        assert_eq!(signal.ml_confidence, None);
    }

    #[test]
    fn test_rejects_without_invalidation_or_risk() {
        let builder = SignalBuilder::new(3.0, 0.25, 3.0);
        let s = setup(Direction::Bullish, None);
        let snapshot = MarketSnapshot {
            price: 2650.0,
            ..MarketSnapshot::default()
        };
        assert_eq!(
            builder.build(&s, &snapshot, None, now()).unwrap_err(),
            BuildRejection::NoInvalidation
        );

        // 反向摆动点位于入场价之上，风险为负
        let snapshot = MarketSnapshot {
            price: 2650.0,
            opposing_swing: Some(2655.0),
            ..MarketSnapshot::default()
        };
        assert!(matches!(
            builder.build(&s, &snapshot, None, now()),
            Err(BuildRejection::NonPositiveRisk { .. })
        ));
    }
}
