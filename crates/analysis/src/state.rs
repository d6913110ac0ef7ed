use crate::buffer::RollingBuffer;
use crate::displacement::{DisplacementDetector, DisplacementState, DisplacementUpdate};
use crate::imbalance::{ImbalanceDetector, ImbalanceState};
use crate::indicators::Indicators;
use crate::liquidity::{LiquidityMapper, LiquidityState};
use crate::structure::{StructureAnalyzer, StructureState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use shikake_core::analysis::entity::{
    DisplacementMove, FairValueGap, LiquiditySweep, OrderBlock, StructureEvent, SwingPoint,
};
use shikake_core::analysis::error::AnalysisError;
use shikake_core::common::{Direction, SymbolCategory, Timeframe, count_to_f64};
use shikake_core::config::EngineConfig;
use shikake_core::market::entity::PriceBar;
use shikake_core::signal::entity::SignalId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// # Summary
/// 由配置构造的全部检测器，随品种状态一起保存。
#[derive(Debug, Clone)]
pub struct Detectors {
    pub structure: StructureAnalyzer,
    pub liquidity: LiquidityMapper,
    pub imbalance: ImbalanceDetector,
    pub displacement: DisplacementDetector,
    window_capacity: usize,
    atr_period: usize,
    rsi_period: usize,
    entry_timeframe: Timeframe,
}

impl Detectors {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            structure: StructureAnalyzer::new(config.swing_strength),
            liquidity: LiquidityMapper::new(
                config.equal_level_tolerance,
                config.equal_level_lookback,
            ),
            imbalance: ImbalanceDetector::new(config.fvg_min_size, config.order_block_lookback),
            displacement: DisplacementDetector::new(
                config.displacement_min_size,
                config.displacement_max_bars,
            ),
            window_capacity: config.window_capacity,
            atr_period: config.atr_period,
            rsi_period: config.rsi_period,
            entry_timeframe: config.entry_timeframe,
        }
    }
}

/// # Summary
/// 单根 K 线在某个周期上引起的全部变化。
#[derive(Debug, Clone, Default)]
pub struct BarUpdate {
    pub events: Vec<StructureEvent>,
    pub displacement: Option<DisplacementUpdate>,
    pub gap: Option<FairValueGap>,
    pub block: Option<OrderBlock>,
    pub sweeps: Vec<LiquiditySweep>,
}

/// # Summary
/// 单个 (symbol, timeframe) 的分析状态。
///
/// # Invariants
/// - `bars` 与 `atr_before` 按位置一一对应。
/// - `bars` 中时间戳严格递增。
#[derive(Debug, Clone)]
pub struct TimeframeState {
    timeframe: Timeframe,
    bars: RollingBuffer<PriceBar>,
    // 每根 K 线到达前的 ATR
    atr_before: RollingBuffer<Option<f64>>,
    indicators: Indicators,
    structure: StructureState,
    imbalance: ImbalanceState,
    displacement: DisplacementState,
}

impl TimeframeState {
    pub fn new(timeframe: Timeframe, detectors: &Detectors) -> Result<Self, AnalysisError> {
        Ok(Self {
            timeframe,
            bars: RollingBuffer::new(detectors.window_capacity),
            atr_before: RollingBuffer::new(detectors.window_capacity),
            indicators: Indicators::new(detectors.atr_period, detectors.rsi_period)?,
            structure: StructureState::default(),
            imbalance: ImbalanceState::default(),
            displacement: DisplacementState::default(),
        })
    }

    /// # Summary
    /// 接收一根已校验的 K 线并推进全部检测器。
    ///
    /// # Logic
    /// 1. 推进指标，记录推进前的 ATR。
    /// 2. 更新既有缺口与订单块的填补进度（只受后续 K 线影响）。
    /// 3. 写入窗口后依次运行结构、位移、缺口检测；新位移触发订单块检测。
    fn push(&mut self, bar: PriceBar, detectors: &Detectors) -> (BarUpdate, Vec<SwingPoint>) {
        let atr = self.indicators.update(&bar);
        detectors.imbalance.mitigate(&mut self.imbalance, &bar);
        self.bars.push(bar);
        self.atr_before.push(atr);

        let structure = detectors.structure.update(&mut self.structure, &self.bars);
        let displacement =
            detectors
                .displacement
                .update(&mut self.displacement, &self.bars, &self.atr_before);
        let block = match &displacement {
            Some(DisplacementUpdate::New(movement)) => {
                detectors
                    .imbalance
                    .detect_order_block(&mut self.imbalance, &self.bars, movement)
            }
            _ => None,
        };
        let gap = detectors.imbalance.detect_gap(&mut self.imbalance, &self.bars);

        let update = BarUpdate {
            events: structure.events,
            displacement,
            gap,
            block,
            sweeps: Vec::new(),
        };
        (update, structure.new_swings)
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &RollingBuffer<PriceBar> {
        &self.bars
    }

    pub fn last_bar(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    pub fn atr(&self) -> Option<f64> {
        self.indicators.atr()
    }

    pub fn rsi(&self) -> Option<f64> {
        self.indicators.rsi()
    }

    pub fn structure(&self) -> &StructureState {
        &self.structure
    }

    pub fn imbalance(&self) -> &ImbalanceState {
        &self.imbalance
    }

    pub fn displacement(&self) -> &DisplacementState {
        &self.displacement
    }

    /// 窗口中晚于 `timestamp` 的 K 线数量，用于按 K 线计的新近度。
    pub fn bars_since(&self, timestamp: DateTime<Utc>) -> usize {
        self.bars
            .iter()
            .rev()
            .take_while(|b| b.timestamp > timestamp)
            .count()
    }

    /// 最新 K 线成交量与最近 `period` 根平均成交量之比，平均为 0 时为 `None`。
    pub fn volume_ratio(&self, period: usize) -> Option<f64> {
        let last = self.bars.last()?;
        let recent: Vec<f64> = self
            .bars
            .iter()
            .rev()
            .take(period.max(1))
            .map(|b| b.volume)
            .collect();
        let mean = recent.iter().sum::<f64>() / count_to_f64(recent.len());
        (mean > 0.0).then(|| last.volume / mean)
    }

    /// 最近一段同向位移，`bars_since` 意义下不超过 `within` 根。
    pub fn recent_displacement(
        &self,
        direction: Direction,
        within: usize,
    ) -> Option<&DisplacementMove> {
        self.displacement
            .latest(direction)
            .filter(|m| self.bars_since(m.end_time) <= within)
    }
}

/// # Summary
/// 品种的信号占位：至多一个待结算信号与最近一次发出的时间。
#[derive(Debug, Clone, Default)]
pub struct SignalSlot {
    pub pending: Option<SignalId>,
    pub last_emitted_at: Option<DateTime<Utc>>,
}

/// # Summary
/// 一批 K 线的处理汇总。
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub accepted: usize,
    pub events: Vec<StructureEvent>,
    pub sweeps: Vec<LiquiditySweep>,
    pub gaps: Vec<FairValueGap>,
    pub blocks: Vec<OrderBlock>,
    pub displacements: Vec<DisplacementMove>,
}

impl IngestReport {
    fn absorb(&mut self, update: BarUpdate) {
        self.accepted += 1;
        self.events.extend(update.events);
        self.sweeps.extend(update.sweeps);
        self.gaps.extend(update.gap);
        self.blocks.extend(update.block);
        if let Some(DisplacementUpdate::New(m)) = update.displacement {
            self.displacements.push(m);
        }
    }
}

/// # Summary
/// 单个品种的全部分析状态，由 `StateStore` 以独占锁的形式交给评估周期。
///
/// # Invariants
/// - 只接收属于本品种的 K 线。
/// - 任一批次校验失败时状态保持不变。
#[derive(Debug, Clone)]
pub struct SymbolState {
    symbol: String,
    category: SymbolCategory,
    detectors: Detectors,
    timeframes: BTreeMap<Timeframe, TimeframeState>,
    liquidity: LiquidityState,
    pub signals: SignalSlot,
}

impl SymbolState {
    pub fn new(symbol: &str, config: &EngineConfig) -> Result<Self, AnalysisError> {
        let detectors = Detectors::from_config(config);
        let mut timeframes = BTreeMap::new();
        for tf in [config.entry_timeframe, config.higher_timeframe] {
            timeframes.insert(tf, TimeframeState::new(tf, &detectors)?);
        }
        Ok(Self {
            symbol: symbol.to_string(),
            category: SymbolCategory::classify(symbol),
            detectors,
            timeframes,
            liquidity: LiquidityState::default(),
            signals: SignalSlot::default(),
        })
    }

    /// # Summary
    /// 校验并接收一批 K 线。
    ///
    /// # Logic
    /// 1. 先整体校验：品种一致、数值自洽、同一周期内时间戳严格递增。
    ///    相等的时间戳为重复数据，倒退的时间戳为数据源违约。
    /// 2. 全部通过后按输入顺序逐根推进对应周期的检测器。
    /// 3. 入场周期的 K 线额外推进流动性映射。
    ///
    /// # Arguments
    /// * `bars`: 本批 K 线。
    ///
    /// # Returns
    /// 处理汇总；校验失败返回 `AnalysisError` 且状态不变。
    pub fn ingest(&mut self, bars: &[PriceBar]) -> Result<IngestReport, AnalysisError> {
        self.validate(bars)?;

        let mut report = IngestReport::default();
        for bar in bars {
            if !self.timeframes.contains_key(&bar.timeframe) {
                let state = TimeframeState::new(bar.timeframe, &self.detectors)?;
                self.timeframes.insert(bar.timeframe, state);
            }
            let Some(tf_state) = self.timeframes.get_mut(&bar.timeframe) else {
                continue;
            };
            let (mut update, new_swings) = tf_state.push(bar.clone(), &self.detectors);
            if bar.timeframe == self.detectors.entry_timeframe {
                update.sweeps = self.detectors.liquidity.update(
                    &mut self.liquidity,
                    bar,
                    &new_swings,
                    tf_state.structure().swings(),
                );
            }
            report.absorb(update);
        }
        debug!(
            "{} ingested {} bars: {} events, {} sweeps, {} gaps, {} blocks",
            self.symbol,
            report.accepted,
            report.events.len(),
            report.sweeps.len(),
            report.gaps.len(),
            report.blocks.len()
        );
        Ok(report)
    }

    fn validate(&self, bars: &[PriceBar]) -> Result<(), AnalysisError> {
        let mut last: HashMap<Timeframe, DateTime<Utc>> = self
            .timeframes
            .iter()
            .filter_map(|(tf, s)| s.last_timestamp().map(|t| (*tf, t)))
            .collect();

        for bar in bars {
            if bar.symbol != self.symbol {
                return Err(AnalysisError::SymbolMismatch {
                    expected: self.symbol.clone(),
                    found: bar.symbol.clone(),
                });
            }
            if !bar.is_well_formed() {
                return Err(AnalysisError::MalformedBar {
                    symbol: bar.symbol.clone(),
                    timeframe: bar.timeframe,
                    timestamp: bar.timestamp,
                });
            }
            if let Some(prev) = last.get(&bar.timeframe).copied() {
                if bar.timestamp == prev {
                    return Err(AnalysisError::DuplicateTimestamp {
                        symbol: bar.symbol.clone(),
                        timeframe: bar.timeframe,
                        timestamp: bar.timestamp,
                    });
                }
                if bar.timestamp < prev {
                    return Err(AnalysisError::TimestampRegression {
                        symbol: bar.symbol.clone(),
                        timeframe: bar.timeframe,
                        timestamp: bar.timestamp,
                        last: prev,
                    });
                }
            }
            last.insert(bar.timeframe, bar.timestamp);
        }
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn category(&self) -> SymbolCategory {
        self.category
    }

    pub fn timeframe(&self, timeframe: Timeframe) -> Option<&TimeframeState> {
        self.timeframes.get(&timeframe)
    }

    pub fn liquidity(&self) -> &LiquidityState {
        &self.liquidity
    }
}

/// # Summary
/// 按品种分片的状态仓库。
///
/// # Invariants
/// - 每个品种一个 `Arc<Mutex<SymbolState>>` 句柄；评估周期只锁自己的品种。
/// - 同一品种的句柄一经创建不会被替换。
pub struct StateStore {
    config: Arc<EngineConfig>,
    states: DashMap<String, Arc<Mutex<SymbolState>>>,
}

impl StateStore {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// # Summary
    /// 获取或创建某品种的状态句柄。
    ///
    /// # Logic
    /// 1. 已存在则直接克隆句柄返回。
    /// 2. 否则在锁外构造新状态，再通过 entry 插入；并发创建时以先插入者为准。
    pub fn handle(&self, symbol: &str) -> Result<Arc<Mutex<SymbolState>>, AnalysisError> {
        if let Some(handle) = self.states.get(symbol) {
            return Ok(handle.clone());
        }
        let state = SymbolState::new(symbol, &self.config)?;
        let handle = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .clone();
        Ok(handle)
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<Mutex<SymbolState>>> {
        self.states.get(symbol).map(|h| h.clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.states.iter().map(|e| e.key().clone()).collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
