use crate::common::Timeframe;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub replay: ReplayConfig,
}

/// # Summary
/// 配置校验错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// # Summary
/// 一个 UTC 交易时段窗口（Kill Zone）。
///
/// # Invariants
/// - 两端均包含。
/// - `start > end` 表示跨越午夜。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillZone {
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl KillZone {
    pub fn new(name: &str, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
        }
    }

    /// 判断某个时刻是否落在窗口内。
    pub fn contains(&self, time: NaiveTime) -> bool {
        // 只比较到秒，忽略纳秒
        let t = time.with_nanosecond(0).unwrap_or(time);
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

/// # Summary
/// 评分强度分级阈值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthThresholds {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for StrengthThresholds {
    fn default() -> Self {
        Self {
            very_high: 80.0,
            high: 65.0,
            medium: 50.0,
        }
    }
}

/// # Summary
/// 汇合评分各项权重，默认合计 100。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub trend: f64,
    pub sweep: f64,
    pub displacement: f64,
    pub zone: f64,
    pub session: f64,
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.trend + self.sweep + self.displacement + self.zone + self.session
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 30.0,
            sweep: 25.0,
            displacement: 20.0,
            zone: 15.0,
            session: 10.0,
        }
    }
}

/// # Summary
/// 信号引擎参数。所有检测器、评分器、构建器与训练调度器共享同一份只读配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // 最低盈亏比，严格比较，不做取整
    pub min_risk_reward: f64,
    // FVG 最小尺寸（价格单位），缺口必须严格大于此值
    pub fvg_min_size: f64,
    // 位移最小幅度（ATR 倍数）
    pub displacement_min_size: f64,
    // 位移最多由几根 K 线构成
    pub displacement_max_bars: usize,
    // 模型概率门槛，必须严格大于
    pub ml_confidence_gate: f64,
    pub strength: StrengthThresholds,
    pub weights: ScoreWeights,
    // 每累计多少个新标签触发一次重训
    pub training_trigger_count: usize,
    pub min_training_examples: usize,
    // 少数类占比下限
    pub min_minority_ratio: f64,
    pub kill_zones: Vec<KillZone>,
    // 分形摆动点两侧各需几根 K 线
    pub swing_strength: usize,
    // 每个周期保留的 K 线数量
    pub window_capacity: usize,
    // 等高/等低点相对容差
    pub equal_level_tolerance: f64,
    // 等高/等低点回看的摆动点数量
    pub equal_level_lookback: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    // 订单块回看 K 线数量
    pub order_block_lookback: usize,
    // 扫荡得分线性衰减到 0 所需的 K 线数
    pub sweep_recency_bars: usize,
    // 止损缓冲（ATR 倍数）
    pub stop_buffer_atr: f64,
    // 默认目标 = 入场 ± 倍数 × 风险
    pub target_risk_multiple: f64,
    pub signal_ttl_minutes: i64,
    pub signal_cooldown_seconds: i64,
    pub higher_timeframe: Timeframe,
    pub entry_timeframe: Timeframe,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let at = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            min_risk_reward: 3.0,
            fvg_min_size: 5.0,
            displacement_min_size: 2.0,
            displacement_max_bars: 3,
            ml_confidence_gate: 0.60,
            strength: StrengthThresholds::default(),
            weights: ScoreWeights::default(),
            training_trigger_count: 20,
            min_training_examples: 20,
            min_minority_ratio: 0.1,
            kill_zones: vec![
                KillZone::new("London", at(8), at(12)),
                KillZone::new("NewYork", at(13), at(17)),
            ],
            swing_strength: 2,
            window_capacity: 500,
            equal_level_tolerance: 0.0002,
            equal_level_lookback: 10,
            atr_period: 14,
            rsi_period: 14,
            order_block_lookback: 5,
            sweep_recency_bars: 10,
            stop_buffer_atr: 0.25,
            target_risk_multiple: 3.0,
            signal_ttl_minutes: 1440,
            signal_cooldown_seconds: 300,
            higher_timeframe: Timeframe::H4,
            entry_timeframe: Timeframe::M15,
        }
    }
}

impl EngineConfig {
    /// # Summary
    /// 校验参数组合是否可用。
    ///
    /// # Logic
    /// 1. 比率与尺寸必须为有限正数。
    /// 2. 门槛位于 `[0, 1)`，分级阈值严格递减。
    /// 3. 窗口容量必须能容纳指标预热与摆动点确认。
    /// 4. 高周期不得小于入场周期。
    ///
    /// # Returns
    /// 第一个不合法的字段。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(invalid(field, format!("{v} must be a finite positive number")))
            }
        };
        positive("min_risk_reward", self.min_risk_reward)?;
        positive("fvg_min_size", self.fvg_min_size)?;
        positive("displacement_min_size", self.displacement_min_size)?;
        positive("equal_level_tolerance", self.equal_level_tolerance)?;
        positive("target_risk_multiple", self.target_risk_multiple)?;
        if !self.stop_buffer_atr.is_finite() || self.stop_buffer_atr < 0.0 {
            return Err(invalid("stop_buffer_atr", "must be finite and non-negative"));
        }

        if !(0.0..1.0).contains(&self.ml_confidence_gate) {
            return Err(invalid("ml_confidence_gate", "must lie in [0, 1)"));
        }
        if !(0.0..0.5).contains(&self.min_minority_ratio) {
            return Err(invalid("min_minority_ratio", "must lie in [0, 0.5)"));
        }

        let s = &self.strength;
        if !(s.very_high > s.high && s.high > s.medium && s.medium > 0.0) {
            return Err(invalid(
                "strength",
                "thresholds must be strictly decreasing and positive",
            ));
        }
        let w = &self.weights;
        let all = [w.trend, w.sweep, w.displacement, w.zone, w.session];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) || w.total() <= 0.0 {
            return Err(invalid("weights", "must be non-negative with a positive sum"));
        }

        if self.displacement_max_bars == 0 {
            return Err(invalid("displacement_max_bars", "must be at least 1"));
        }
        if self.swing_strength == 0 {
            return Err(invalid("swing_strength", "must be at least 1"));
        }
        if self.atr_period == 0 || self.rsi_period == 0 {
            return Err(invalid("atr_period", "indicator periods must be at least 1"));
        }
        let warmup = self.atr_period.max(self.rsi_period) + 2 * self.swing_strength + 3;
        if self.window_capacity < warmup {
            return Err(invalid(
                "window_capacity",
                format!("{} is smaller than the warm-up length {warmup}", self.window_capacity),
            ));
        }
        if self.training_trigger_count == 0 || self.min_training_examples == 0 {
            return Err(invalid("training_trigger_count", "must be at least 1"));
        }
        if self.signal_ttl_minutes <= 0 {
            return Err(invalid("signal_ttl_minutes", "must be positive"));
        }
        if self.signal_cooldown_seconds < 0 {
            return Err(invalid("signal_cooldown_seconds", "must be non-negative"));
        }
        if self.higher_timeframe < self.entry_timeframe {
            return Err(invalid(
                "higher_timeframe",
                "must not be smaller than entry_timeframe",
            ));
        }
        Ok(())
    }

    /// 给定 UTC 时刻是否处于任一交易时段。
    pub fn in_kill_zone(&self, time: NaiveTime) -> bool {
        self.kill_zones.iter().any(|z| z.contains(time))
    }
}

/// # Summary
/// 日志配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    // 未设置 RUST_LOG 时使用的过滤表达式
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "shikake.log".to_string(),
        }
    }
}

/// # Summary
/// 模型文件存放目录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub model_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_dir: "data/models".to_string(),
        }
    }
}

/// # Summary
/// 历史回放配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    // JSON Lines 格式的 K 线文件
    pub bars_path: String,
    // 为空时回放文件中出现的全部品种
    pub symbols: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            bars_path: "data/bars.jsonl".to_string(),
            symbols: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.min_risk_reward, 3.0);
        assert_eq!(config.engine.weights.total(), 100.0);
        assert_eq!(config.engine.entry_timeframe, Timeframe::M15);
        assert_eq!(config.engine.higher_timeframe, Timeframe::H4);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.storage.model_dir, "data/models");
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn test_kill_zone_bounds_inclusive() {
        let config = EngineConfig::default();
        assert!(config.in_kill_zone(t(8, 0)));
        assert!(config.in_kill_zone(t(12, 0)));
        assert!(!config.in_kill_zone(t(12, 30)));
        assert!(config.in_kill_zone(t(17, 0)));
        assert!(!config.in_kill_zone(t(3, 0)));
    }

    #[test]
    fn test_kill_zone_wraps_midnight() {
        let asia = KillZone::new("Asia", t(23, 0), t(2, 0));
        assert!(asia.contains(t(23, 30)));
        assert!(asia.contains(t(1, 0)));
        assert!(!asia.contains(t(3, 0)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.ml_confidence_gate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "ml_confidence_gate",
                ..
            })
        ));

        let mut config = EngineConfig::default();
        config.strength.high = 90.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.window_capacity = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"engine": {"min_risk_reward": 2.5}}"#).unwrap();
        assert_eq!(config.engine.min_risk_reward, 2.5);
        assert_eq!(config.engine.fvg_min_size, 5.0);
        assert_eq!(config.engine.kill_zones.len(), 2);
        assert_eq!(config.engine.kill_zones[0].start, t(8, 0));
    }
}
