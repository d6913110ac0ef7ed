use crate::builder::{BuildRejection, MarketSnapshot, SignalBuilder};
use crate::scorer::ConfluenceScorer;
use chrono::{DateTime, Duration, Utc};
use shikake_analysis::state::{IngestReport, SymbolState};
use shikake_core::analysis::entity::SwingKind;
use shikake_core::analysis::error::AnalysisError;
use shikake_core::common::{Direction, Timeframe};
use shikake_core::config::{EngineConfig, KillZone};
use shikake_core::market::entity::PriceBar;
use shikake_core::model::entity::{FeatureVector, ModelState};
use shikake_core::signal::entity::{Setup, Signal, StrengthCategory};
use shikake_model::features::{MarketContext, extract};
use shikake_model::logistic::predict;
use tracing::{debug, info, warn};

// 成交量比的均值窗口（入场周期 K 线数）
const VOLUME_WINDOW: usize = 20;

/// # Summary
/// 一轮评估的结论。
#[derive(Debug, Clone, PartialEq)]
pub enum CycleVerdict {
    // 本批没有入场周期 K 线，不触发评估
    Idle,
    // 入场周期指标尚未预热
    NotReady,
    // 输入数据不合法，整批丢弃
    Skipped { reason: String },
    // 已有待结算信号或仍在冷却期
    Suppressed,
    // 最佳形态低于最低强度等级
    Filtered,
    // 模型概率未超过门槛
    Gated { confidence: f64 },
    // 风险收益不达标
    RiskRejected(BuildRejection),
    Emitted,
}

/// # Summary
/// 一轮评估的完整产出。
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: CycleVerdict,
    pub report: IngestReport,
    // 本轮最佳形态
    pub setup: Option<Setup>,
    pub features: Option<FeatureVector>,
    pub signal: Option<Signal>,
}

impl Evaluation {
    fn verdict(verdict: CycleVerdict, report: IngestReport) -> Self {
        Self {
            verdict,
            report,
            setup: None,
            features: None,
            signal: None,
        }
    }
}

/// # Summary
/// 纯评估周期：吸收新 K 线，评分，模型把关，构建信号。
///
/// # Invariants
/// - 不持有任何定时器或线程，所有时间由调用方传入。
/// - 只修改传入的 `SymbolState`；被丢弃的形态不留下任何痕迹。
#[derive(Debug, Clone)]
pub struct Evaluator {
    scorer: ConfluenceScorer,
    builder: SignalBuilder,
    gate: f64,
    entry_timeframe: Timeframe,
    cooldown: Duration,
    kill_zones: Vec<KillZone>,
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scorer: ConfluenceScorer::from_config(config),
            builder: SignalBuilder::from_config(config),
            gate: config.ml_confidence_gate,
            entry_timeframe: config.entry_timeframe,
            cooldown: Duration::seconds(config.signal_cooldown_seconds),
            kill_zones: config.kill_zones.clone(),
        }
    }

    pub fn scorer(&self) -> &ConfluenceScorer {
        &self.scorer
    }

    /// # Summary
    /// 执行一轮评估。
    ///
    /// # Logic
    /// 1. 吸收 K 线；普通输入错误视为跳过，时间戳倒退作为违约向上返回。
    /// 2. 本批不含入场周期 K 线则空转；ATR 未就绪则返回 `NotReady`。
    /// 3. 已有待结算信号或处于冷却期则抑制。
    /// 4. 取最高分候选，强度为 `Filtered` 时结束。
    /// 5. 提取特征；存在模型时概率必须严格大于门槛。
    /// 6. 构建信号，成功后占用该品种的待结算槽位。
    ///
    /// # Arguments
    /// * `state`: 该品种的独占状态。
    /// * `bars`: 本批新 K 线。
    /// * `model`: 当前活跃模型快照，未训练时为 `None`。
    /// * `now`: 评估时刻。
    ///
    /// # Returns
    /// 评估结果；仅数据源违约时返回 `Err`，此时状态不变。
    pub fn evaluate(
        &self,
        state: &mut SymbolState,
        bars: &[PriceBar],
        model: Option<&ModelState>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, AnalysisError> {
        let report = match state.ingest(bars) {
            Ok(report) => report,
            Err(e) if e.is_contract_violation() => return Err(e),
            Err(e) => {
                warn!("Skipping cycle for {}: {}", state.symbol(), e);
                return Ok(Evaluation::verdict(
                    CycleVerdict::Skipped {
                        reason: e.to_string(),
                    },
                    IngestReport::default(),
                ));
            }
        };

        if !bars.iter().any(|b| b.timeframe == self.entry_timeframe) {
            return Ok(Evaluation::verdict(CycleVerdict::Idle, report));
        }
        let Some(entry) = state.timeframe(self.entry_timeframe) else {
            return Ok(Evaluation::verdict(CycleVerdict::NotReady, report));
        };
        let (Some(bar), Some(atr)) = (entry.last_bar(), entry.atr()) else {
            return Ok(Evaluation::verdict(CycleVerdict::NotReady, report));
        };
        let price = bar.close;
        let rsi = entry.rsi();
        let volume_ratio = entry.volume_ratio(VOLUME_WINDOW);

        if state.signals.pending.is_some()
            || state
                .signals
                .last_emitted_at
                .is_some_and(|t| now < t + self.cooldown)
        {
            return Ok(Evaluation::verdict(CycleVerdict::Suppressed, report));
        }

        let Some(setup) = self.scorer.best(state, now) else {
            return Ok(Evaluation::verdict(CycleVerdict::Filtered, report));
        };
        let ctx = MarketContext {
            price,
            atr: Some(atr),
            rsi,
            timestamp: now,
            in_kill_zone: self.kill_zones.iter().any(|z| z.contains(now.time())),
            category: state.category(),
            volume_ratio,
            displacement: setup.displacement.as_ref().map(|m| m.magnitude),
            zone: setup.zone(),
        };
        let features = extract(&setup.breakdown, &ctx);
        let mut evaluation = Evaluation {
            verdict: CycleVerdict::Filtered,
            report,
            setup: Some(setup.clone()),
            features: Some(features),
            signal: None,
        };
        if setup.strength == StrengthCategory::Filtered {
            debug!(
                "{} best setup {} scored {:.1}, filtered",
                state.symbol(),
                setup.direction,
                setup.raw_score
            );
            return Ok(evaluation);
        }

        let confidence = model.and_then(|m| predict(m, &features));
        if let Some(c) = confidence.filter(|c| *c <= self.gate) {
            debug!(
                "{} setup gated: confidence {:.3} <= {:.2}",
                state.symbol(),
                c,
                self.gate
            );
            evaluation.verdict = CycleVerdict::Gated { confidence: c };
            return Ok(evaluation);
        }

        let snapshot = snapshot(state, self.entry_timeframe, setup.direction, price, atr);
        match self.builder.build(&setup, &snapshot, confidence, now) {
            Ok(signal) => {
                info!(
                    "{} {} signal {} ({}, score {:.1}): entry {:.5} stop {:.5} target {:.5} rr {:.2}",
                    signal.symbol,
                    signal.direction,
                    signal.id,
                    signal.strength,
                    signal.raw_score,
                    signal.entry_price,
                    signal.stop_price,
                    signal.target_price,
                    signal.risk_reward_ratio
                );
                state.signals.pending = Some(signal.id.clone());
                state.signals.last_emitted_at = Some(now);
                evaluation.verdict = CycleVerdict::Emitted;
                evaluation.signal = Some(signal);
            }
            Err(rejection) => {
                debug!("{} setup discarded: {}", state.symbol(), rejection);
                evaluation.verdict = CycleVerdict::RiskRejected(rejection);
            }
        }
        Ok(evaluation)
    }
}

/// # Summary
/// 从品种状态提取构建信号所需的行情快照。
fn snapshot(
    state: &SymbolState,
    entry_timeframe: Timeframe,
    direction: Direction,
    price: f64,
    atr: f64,
) -> MarketSnapshot {
    let opposing_kind = match direction {
        Direction::Bullish => SwingKind::Low,
        Direction::Bearish => SwingKind::High,
    };
    let opposing_swing = state
        .timeframe(entry_timeframe)
        .and_then(|tf| tf.structure().latest_swing(opposing_kind))
        .map(|s| s.price);
    let liquidity_targets = state
        .liquidity()
        .active_zones()
        .filter(|z| z.origin.is_high_side() == (direction == Direction::Bullish))
        .map(|z| z.level)
        .collect();
    MarketSnapshot {
        price,
        atr: Some(atr),
        opposing_swing,
        liquidity_targets,
    }
}
