use shikake_core::common::Direction;
use shikake_core::market::entity::PriceBar;
use shikake_core::signal::entity::{EntryType, Outcome, Signal, SignalStatus};

/// # Summary
/// 单根 K 线的判定结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    // 未成交或未触及任何价位
    Untouched,
    // 限价单本根 K 线成交，尚未结算
    Filled,
    Resolved(Outcome),
}

/// # Summary
/// 依据后续 K 线判定待结算信号的结果（仅用于回放）。
///
/// # Invariants
/// - 只看同品种、开盘时间不早于信号创建时间的 K 线。
/// - 市价信号创建即成交；限价信号须先触及入场价，未成交前止损与目标都不生效。
/// - 限价成交的那根 K 线只检查止损，目标从下一根开始生效。
/// - 同一根 K 线同时触及止损与目标时按止损处理。
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeJudge;

impl OutcomeJudge {
    /// # Summary
    /// 用一根 K 线推进信号的成交与结算。
    ///
    /// # Arguments
    /// * `signal` - 待结算信号。
    /// * `bar` - 同品种的入场周期 K 线。
    /// * `filled` - 调用方记录的限价单是否已在之前的 K 线成交。
    ///
    /// # Returns
    /// 触及止损或目标时返回 `Resolved`，限价单本根成交时返回 `Filled`。
    pub fn judge(&self, signal: &Signal, bar: &PriceBar, filled: bool) -> Judgement {
        if signal.status != SignalStatus::Pending
            || bar.symbol != signal.symbol
            || bar.timestamp < signal.created_at
        {
            return Judgement::Untouched;
        }
        let filled_before = filled || signal.entry_type == EntryType::Market;
        let (entry_hit, stop_hit, target_hit) = match signal.direction {
            Direction::Bullish => (
                bar.low <= signal.entry_price,
                bar.low <= signal.stop_price,
                bar.high >= signal.target_price,
            ),
            Direction::Bearish => (
                bar.high >= signal.entry_price,
                bar.high >= signal.stop_price,
                bar.low <= signal.target_price,
            ),
        };
        if !filled_before && !entry_hit {
            return Judgement::Untouched;
        }
        if stop_hit {
            Judgement::Resolved(Outcome::Lost)
        } else if filled_before && target_hit {
            Judgement::Resolved(Outcome::Won)
        } else if filled_before {
            Judgement::Untouched
        } else {
            Judgement::Filled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use shikake_core::common::Timeframe;
    use shikake_core::signal::entity::{SignalId, StrengthCategory};

    fn signal(direction: Direction, stop: f64, target: f64) -> Signal {
        Signal {
            id: SignalId("s".to_string()),
            symbol: "XAUUSD".to_string(),
            direction,
            entry_type: EntryType::Market,
            entry_price: 2650.0,
            stop_price: stop,
            target_price: target,
            risk_reward_ratio: 3.0,
            strength: StrengthCategory::High,
            raw_score: 70.0,
            ml_confidence: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
            status: SignalStatus::Pending,
            resolved_at: None,
        }
    }

    fn bar(minutes: i64, high: f64, low: f64) -> PriceBar {
        PriceBar {
            symbol: "XAUUSD".to_string(),
            timeframe: Timeframe::M15,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
                + Duration::minutes(minutes),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
        }
    }

    fn resolved(outcome: Outcome) -> Judgement {
        Judgement::Resolved(outcome)
    }

    #[test]
    fn test_stop_wins_ties() {
        let judge = OutcomeJudge;
        let long = signal(Direction::Bullish, 2645.0, 2665.0);
        assert_eq!(judge.judge(&long, &bar(15, 2660.0, 2648.0), false), Judgement::Untouched);
        assert_eq!(
            judge.judge(&long, &bar(15, 2666.0, 2648.0), false),
            resolved(Outcome::Won)
        );
        assert_eq!(
            judge.judge(&long, &bar(15, 2666.0, 2644.0), false),
            resolved(Outcome::Lost)
        );
        // 创建前开盘的 K 线不参与判定
        assert_eq!(judge.judge(&long, &bar(-15, 2666.0, 2648.0), false), Judgement::Untouched);
        assert_eq!(
            judge.judge(&long, &bar(0, 2666.0, 2648.0), false),
            resolved(Outcome::Won)
        );

        let short = signal(Direction::Bearish, 2655.0, 2635.0);
        assert_eq!(
            judge.judge(&short, &bar(30, 2652.0, 2634.0), false),
            resolved(Outcome::Won)
        );
        assert_eq!(
            judge.judge(&short, &bar(30, 2656.0, 2634.0), false),
            resolved(Outcome::Lost)
        );
    }

    #[test]
    fn test_limit_entry_must_fill_first() {
        let judge = OutcomeJudge;
        // 多头限价 2640，止损 2630，目标 2670
        let long = Signal {
            entry_type: EntryType::Limit,
            entry_price: 2640.0,
            ..signal(Direction::Bullish, 2630.0, 2670.0)
        };
        // 未回到入场价就冲过目标：不算盈利
        assert_eq!(judge.judge(&long, &bar(15, 2672.0, 2645.0), false), Judgement::Untouched);
        // 回踩成交，本根只看止损
        assert_eq!(judge.judge(&long, &bar(30, 2671.0, 2639.0), false), Judgement::Filled);
        assert_eq!(
            judge.judge(&long, &bar(30, 2650.0, 2629.0), false),
            resolved(Outcome::Lost)
        );
        // 成交后目标生效
        assert_eq!(
            judge.judge(&long, &bar(45, 2671.0, 2650.0), true),
            resolved(Outcome::Won)
        );

        let short = Signal {
            entry_type: EntryType::Limit,
            entry_price: 2660.0,
            ..signal(Direction::Bearish, 2670.0, 2630.0)
        };
        assert_eq!(judge.judge(&short, &bar(15, 2655.0, 2628.0), false), Judgement::Untouched);
        assert_eq!(judge.judge(&short, &bar(30, 2661.0, 2640.0), false), Judgement::Filled);
        assert_eq!(
            judge.judge(&short, &bar(45, 2650.0, 2629.0), true),
            resolved(Outcome::Won)
        );
    }
}
