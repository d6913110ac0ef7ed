use crate::signal::entity::SignalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 特征向量维度。
pub const FEATURE_COUNT: usize = 14;

/// 特征名，顺序与 [`FeatureVector::to_array`] 一致。
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "trend_score",
    "sweep_score",
    "displacement_score",
    "zone_score",
    "session_score",
    "volatility",
    "rsi",
    "in_kill_zone",
    "symbol_category",
    "hour_of_day",
    "day_of_week",
    "volume_ratio",
    "displacement_size",
    "fvg_size",
];

/// # Summary
/// 送入置信度模型的定长数值特征。
///
/// # Invariants
/// - 字段顺序固定，序列化后与模型参数一一对应。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // 评分子项
    pub trend_score: f64,
    pub sweep_score: f64,
    pub displacement_score: f64,
    pub zone_score: f64,
    pub session_score: f64,
    // ATR / 当前价
    pub volatility: f64,
    // 动量 (RSI, 0..100)
    pub rsi: f64,
    // 是否处于交易时段，0 或 1
    pub in_kill_zone: f64,
    // 品种类别编码
    pub symbol_category: f64,
    // UTC 小时
    pub hour_of_day: f64,
    // 周一为 0
    pub day_of_week: f64,
    // 当前成交量 / 近期平均成交量
    pub volume_ratio: f64,
    // 位移幅度（ATR 倍数）
    pub displacement_size: f64,
    // 入场区域宽度（ATR 倍数）
    pub fvg_size: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.trend_score,
            self.sweep_score,
            self.displacement_score,
            self.zone_score,
            self.session_score,
            self.volatility,
            self.rsi,
            self.in_kill_zone,
            self.symbol_category,
            self.hour_of_day,
            self.day_of_week,
            self.volume_ratio,
            self.displacement_size,
            self.fvg_size,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// # Summary
/// 训练标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Won,
    Lost,
}

impl Label {
    /// 回归目标值：盈利为 1，亏损为 0。
    pub fn target(&self) -> f64 {
        match self {
            Label::Won => 1.0,
            Label::Lost => 0.0,
        }
    }
}

/// # Summary
/// 由已结算信号导出的训练样本，保留供后续重训。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub signal_id: SignalId,
    pub features: FeatureVector,
    pub label: Label,
}

/// # Summary
/// 逻辑回归参数，含标准化所需的均值与尺度。
///
/// # Invariants
/// - 四个向量长度均为 `FEATURE_COUNT`。
/// - `scales` 中不含 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl ModelParameters {
    pub fn is_valid(&self) -> bool {
        self.weights.len() == FEATURE_COUNT
            && self.means.len() == FEATURE_COUNT
            && self.scales.len() == FEATURE_COUNT
            && self.bias.is_finite()
            && self
                .weights
                .iter()
                .chain(self.means.iter())
                .chain(self.scales.iter())
                .all(|v| v.is_finite())
            && self.scales.iter().all(|s| *s != 0.0)
    }

    /// 绝对权重最大的特征及其权重。
    pub fn dominant_feature(&self) -> Option<(&'static str, f64)> {
        FEATURE_NAMES
            .into_iter()
            .zip(self.weights.iter().copied())
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }
}

/// # Summary
/// 一个已训练完成的模型版本。
///
/// # Invariants
/// - 任一时刻恰有一个活跃版本；版本号单调递增，只追加。
/// - 发布后不可变，读者持有的快照永远不会混合两个版本的参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub version: u64,
    pub parameters: ModelParameters,
    pub trained_at: DateTime<Utc>,
    pub training_example_count: usize,
}
