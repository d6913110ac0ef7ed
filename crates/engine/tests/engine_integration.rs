use chrono::{DateTime, Duration, TimeZone, Utc};
use shikake_analysis::state::SymbolState;
use shikake_core::common::{Direction, Timeframe};
use shikake_core::config::EngineConfig;
use shikake_core::market::entity::PriceBar;
use shikake_core::model::entity::{FEATURE_COUNT, ModelParameters, ModelState};
use shikake_core::signal::entity::{EntryType, StrengthCategory};
use shikake_engine::evaluator::{CycleVerdict, Evaluator};
use shikake_engine::scorer::ConfluenceScorer;

fn ohlc(tf: Timeframe, at: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
    PriceBar {
        symbol: "XAUUSD".to_string(),
        timeframe: tf,
        timestamp: at,
        open,
        high,
        low,
        close,
        volume: 100.0,
    }
}

fn h4(i: i64, high: f64, low: f64, close: f64) -> PriceBar {
    let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
    ohlc(
        Timeframe::H4,
        start + Duration::hours(4 * i),
        (high + low) / 2.0,
        high,
        low,
        close,
    )
}

/// 高周期上升结构：突破 2630 后再突破 2660。
fn bullish_h4() -> Vec<PriceBar> {
    vec![
        h4(0, 2610.0, 2600.0, 2605.0),
        h4(1, 2620.0, 2605.0, 2615.0),
        h4(2, 2630.0, 2615.0, 2625.0),
        h4(3, 2625.0, 2612.0, 2615.0),
        h4(4, 2622.0, 2610.0, 2614.0),
        h4(5, 2636.0, 2618.0, 2635.0),
        h4(6, 2660.0, 2632.0, 2650.0),
        h4(7, 2655.0, 2640.0, 2645.0),
        h4(8, 2652.0, 2638.0, 2644.0),
        h4(9, 2664.0, 2643.0, 2662.0),
    ]
}

/// 前一交易日 16 根 M15：区间 2652–2700，其中一根下探 2650。
fn prior_day() -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2025, 3, 3, 20, 0, 0).unwrap();
    (0i64..16)
        .map(|i| {
            let low = if i == 8 { 2650.0 } else { 2652.0 };
            ohlc(
                Timeframe::M15,
                start + Duration::minutes(15 * i),
                2676.0,
                2700.0,
                low,
                2676.0,
            )
        })
        .collect()
}

fn day2(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// 预热后的状态：高周期看多，当日第一根 K 线已开出。
fn warmed(evaluator: &Evaluator, config: &EngineConfig) -> SymbolState {
    let mut state = SymbolState::new("XAUUSD", config).unwrap();
    let mut bars = bullish_h4();
    bars.extend(prior_day());
    bars.push(ohlc(Timeframe::M15, day2(0), 2676.0, 2690.0, 2655.0, 2660.0));
    evaluator.evaluate(&mut state, &bars, None, day2(0)).unwrap();
    state
}

fn sweep_bar() -> PriceBar {
    // 影线 2648 刺穿前日低点 2650，同根收于 2651
    ohlc(Timeframe::M15, day2(15), 2655.0, 2662.0, 2648.0, 2651.0)
}

fn constant_model(bias: f64) -> ModelState {
    ModelState {
        version: 1,
        parameters: ModelParameters {
            weights: vec![0.0; FEATURE_COUNT],
            bias,
            means: vec![0.0; FEATURE_COUNT],
            scales: vec![1.0; FEATURE_COUNT],
        },
        trained_at: day2(0),
        training_example_count: 20,
    }
}

#[test]
fn test_sweep_in_uptrend_emits_signal() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);
    let mut state = warmed(&evaluator, &config);

    let eval = evaluator
        .evaluate(&mut state, &[sweep_bar()], None, day2(15))
        .unwrap();
    assert_eq!(eval.report.sweeps.len(), 1);
    assert_eq!(eval.verdict, CycleVerdict::Emitted);

    let setup = eval.setup.unwrap();
    assert_eq!(setup.direction, Direction::Bullish);
    assert_eq!(setup.breakdown.trend, 30.0);
    assert_eq!(setup.breakdown.sweep, 25.0);
    assert_eq!(setup.strength, StrengthCategory::Medium);

    // 成交量均匀，评估日为周二
    let features = eval.features.unwrap();
    assert_eq!(features.volume_ratio, 1.0);
    assert_eq!(features.day_of_week, 1.0);
    assert_eq!(features.sweep_score, 25.0);

    let signal = eval.signal.unwrap();
    assert_eq!(signal.entry_type, EntryType::Market);
    assert_eq!(signal.entry_price, 2651.0);
    assert!(signal.stop_price < 2648.0);
    assert!(signal.risk_reward_ratio >= config.min_risk_reward);
    assert_eq!(signal.ml_confidence, None);
    assert_eq!(state.signals.pending, Some(signal.id.clone()));

    // 已有待结算信号，后续周期被抑制
    let next = ohlc(Timeframe::M15, day2(30), 2651.0, 2656.0, 2649.0, 2654.0);
    let eval = evaluator.evaluate(&mut state, &[next], None, day2(30)).unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Suppressed);
    assert!(eval.signal.is_none());
}

#[test]
fn test_sweep_outside_window_is_dropped_from_setup() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);
    let scorer = ConfluenceScorer::from_config(&config);
    let mut state = warmed(&evaluator, &config);
    state.ingest(&[sweep_bar()]).unwrap();

    // 横盘 K 线，不触及任何流动性
    let quiet = |i: i64| ohlc(Timeframe::M15, day2(15 * i), 2655.0, 2658.0, 2653.0, 2655.0);
    for i in 2..11 {
        state.ingest(&[quiet(i)]).unwrap();
    }
    // 扫荡后第 9 根：仍在窗口内
    let bullish: Vec<_> = scorer
        .candidates(&state, day2(150))
        .into_iter()
        .filter(|s| s.direction == Direction::Bullish)
        .collect();
    assert!(!bullish.is_empty());
    assert!(bullish.iter().all(|s| s.sweep.is_some() && s.breakdown.sweep > 0.0));

    // 第 10 根：得分归零，扫荡不再随形态携带
    state.ingest(&[quiet(11)]).unwrap();
    let bullish: Vec<_> = scorer
        .candidates(&state, day2(165))
        .into_iter()
        .filter(|s| s.direction == Direction::Bullish)
        .collect();
    assert!(!bullish.is_empty());
    assert!(bullish.iter().all(|s| s.sweep.is_none() && s.breakdown.sweep == 0.0));
}

#[test]
fn test_model_gate_is_strict() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);

    let mut state = warmed(&evaluator, &config);
    let pessimistic = constant_model(-3.0);
    let eval = evaluator
        .evaluate(&mut state, &[sweep_bar()], Some(&pessimistic), day2(15))
        .unwrap();
    assert!(matches!(eval.verdict, CycleVerdict::Gated { confidence } if confidence < 0.6));
    assert!(state.signals.pending.is_none());

    // 概率恰好等于 0.5，门槛调到 0.5 也不放行
    let config = EngineConfig {
        ml_confidence_gate: 0.5,
        ..EngineConfig::default()
    };
    let evaluator = Evaluator::new(&config);
    let mut state = warmed(&evaluator, &config);
    let eval = evaluator
        .evaluate(&mut state, &[sweep_bar()], Some(&constant_model(0.0)), day2(15))
        .unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Gated { confidence: 0.5 });

    let mut state = warmed(&evaluator, &config);
    let eval = evaluator
        .evaluate(&mut state, &[sweep_bar()], Some(&constant_model(3.0)), day2(15))
        .unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Emitted);
    let confidence = eval.signal.unwrap().ml_confidence.unwrap();
    assert!(confidence > 0.9 && confidence <= 1.0);
}

#[test]
fn test_idle_not_ready_and_filtered() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);
    let mut state = SymbolState::new("XAUUSD", &config).unwrap();

    let eval = evaluator
        .evaluate(&mut state, &bullish_h4(), None, day2(0))
        .unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Idle);

    // ATR 未预热
    let few: Vec<_> = prior_day().into_iter().take(5).collect();
    let eval = evaluator.evaluate(&mut state, &few, None, day2(0)).unwrap();
    assert_eq!(eval.verdict, CycleVerdict::NotReady);

    // 预热完成但只有趋势分，低于 50
    let rest: Vec<_> = prior_day().into_iter().skip(5).collect();
    let eval = evaluator.evaluate(&mut state, &rest, None, day2(0)).unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Filtered);
    assert!(eval.setup.unwrap().raw_score < 50.0);
}

#[test]
fn test_bad_input_skips_and_regression_fails() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);
    let mut state = warmed(&evaluator, &config);

    let malformed = ohlc(Timeframe::M15, day2(15), 2655.0, 2640.0, 2648.0, 2651.0);
    let eval = evaluator
        .evaluate(&mut state, &[malformed], None, day2(15))
        .unwrap();
    assert!(matches!(eval.verdict, CycleVerdict::Skipped { .. }));

    let stale = ohlc(Timeframe::M15, day2(-15), 2655.0, 2662.0, 2648.0, 2651.0);
    let err = evaluator
        .evaluate(&mut state, &[stale], None, day2(15))
        .unwrap_err();
    assert!(err.is_contract_violation());

    // 两次失败都没有改动状态，扫荡仍可正常识别
    let eval = evaluator
        .evaluate(&mut state, &[sweep_bar()], None, day2(15))
        .unwrap();
    assert_eq!(eval.verdict, CycleVerdict::Emitted);
}

/// 确定性伪随机游走。
struct Walk(u64);

impl Walk {
    fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bits = u32::try_from(self.0 >> 40).unwrap_or(0);
        f64::from(bits) / f64::from(1u32 << 24)
    }
}

#[test]
fn test_emitted_signals_respect_minimum_ratio() {
    let config = EngineConfig::default();
    let evaluator = Evaluator::new(&config);
    let mut state = SymbolState::new("XAUUSD", &config).unwrap();
    let mut walk = Walk(7);
    let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();

    let mut close = 2650.0;
    let mut group: Vec<PriceBar> = Vec::new();
    for i in 0i64..1500 {
        let at = start + Duration::minutes(15 * i);
        let shock = if i % 41 == 40 { 6.0 } else { 1.0 };
        let open = close;
        close = open + (walk.next_unit() - 0.5) * 8.0 * shock;
        let high = open.max(close) + walk.next_unit() * 3.0;
        let low = open.min(close) - walk.next_unit() * 3.0;
        let bar = ohlc(Timeframe::M15, at, open, high, low, close);
        group.push(bar.clone());

        let mut batch = vec![bar];
        if group.len() == 16 {
            let first = &group[0];
            let agg = ohlc(
                Timeframe::H4,
                first.timestamp,
                first.open,
                group.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                group.iter().map(|b| b.low).fold(f64::MAX, f64::min),
                close,
            );
            batch.push(agg);
            group.clear();
        }

        let eval = evaluator.evaluate(&mut state, &batch, None, at).unwrap();
        if let Some(setup) = &eval.setup {
            assert!(setup.raw_score <= config.weights.total() + 1e-9);
        }
        if let Some(signal) = eval.signal {
            assert!(signal.risk_reward_ratio >= config.min_risk_reward);
            assert!(signal.strength >= StrengthCategory::Medium);
            // 立即结算，释放槽位
            state.signals.pending = None;
        } else {
            assert_ne!(eval.verdict, CycleVerdict::Emitted);
        }
    }
}
