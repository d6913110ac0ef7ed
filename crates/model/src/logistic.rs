use chrono::{DateTime, Utc};
use shikake_core::common::count_to_f64;
use shikake_core::config::EngineConfig;
use shikake_core::model::entity::{
    FEATURE_COUNT, FeatureVector, Label, ModelParameters, ModelState, TrainingExample,
};
use shikake_core::model::error::TrainingError;
use tracing::debug;

// 尺度小于此值的特征视为常量，不做缩放
const MIN_SCALE: f64 = 1e-9;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// # Summary
/// 用给定模型估计成功概率。
///
/// # Logic
/// 1. 按模型保存的均值与尺度标准化特征。
/// 2. 线性组合后经 sigmoid 映射到 `[0, 1]`。
///
/// # Returns
/// 概率；结果非有限时返回 `None`，调用方按“无模型”处理。
pub fn predict(state: &ModelState, features: &FeatureVector) -> Option<f64> {
    let p = &state.parameters;
    let z = features
        .to_array()
        .iter()
        .zip(p.means.iter().zip(p.scales.iter()))
        .zip(p.weights.iter())
        .map(|((x, (mean, scale)), w)| w * (x - mean) / scale)
        .sum::<f64>()
        + p.bias;
    let prob = sigmoid(z);
    prob.is_finite().then_some(prob.clamp(0.0, 1.0))
}

/// # Summary
/// 逻辑回归训练器：批量梯度下降 + L2 正则。
#[derive(Debug, Clone)]
pub struct LogisticTrainer {
    min_examples: usize,
    min_minority_ratio: f64,
    epochs: usize,
    learning_rate: f64,
    l2: f64,
}

impl LogisticTrainer {
    pub fn new(min_examples: usize, min_minority_ratio: f64) -> Self {
        Self {
            min_examples,
            min_minority_ratio,
            epochs: 400,
            learning_rate: 0.1,
            l2: 0.01,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.min_training_examples, config.min_minority_ratio)
    }

    /// # Summary
    /// 在样本池上训练一个新模型版本。
    ///
    /// # Logic
    /// 1. 样本不足 `min_examples` 返回 `InsufficientData`。
    /// 2. 少数类占比低于 `min_minority_ratio` 返回 `SkewedLabels`。
    /// 3. 任一特征非有限返回 `NonFinite`。
    /// 4. 计算每维均值与总体标准差，标准化后做固定轮次的梯度下降。
    /// 5. 训练结果含 NaN / Inf 时同样返回 `NonFinite`。
    ///
    /// # Arguments
    /// * `examples`: 训练样本池快照。
    /// * `version`: 新模型的版本号。
    /// * `now`: 训练完成时间。
    ///
    /// # Returns
    /// 完整构建好的 `ModelState`。
    pub fn train(
        &self,
        examples: &[TrainingExample],
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<ModelState, TrainingError> {
        let n = examples.len();
        if n < self.min_examples || n == 0 {
            return Err(TrainingError::InsufficientData {
                found: n,
                required: self.min_examples,
            });
        }
        let wins = examples.iter().filter(|e| e.label == Label::Won).count();
        let ratio = count_to_f64(wins.min(n - wins)) / count_to_f64(n);
        if ratio < self.min_minority_ratio {
            return Err(TrainingError::SkewedLabels {
                ratio,
                required: self.min_minority_ratio,
            });
        }
        if let Some(bad) = examples.iter().find(|e| !e.features.is_finite()) {
            return Err(TrainingError::NonFinite(format!(
                "features of signal {}",
                bad.signal_id
            )));
        }

        let rows: Vec<[f64; FEATURE_COUNT]> =
            examples.iter().map(|e| e.features.to_array()).collect();
        let targets: Vec<f64> = examples.iter().map(|e| e.label.target()).collect();
        let count = count_to_f64(n);

        let mut means = vec![0.0; FEATURE_COUNT];
        for row in &rows {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / count;
            }
        }
        let mut scales = vec![0.0; FEATURE_COUNT];
        for row in &rows {
            for ((s, x), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2) / count;
            }
        }
        for s in scales.iter_mut() {
            *s = s.sqrt();
            if *s < MIN_SCALE {
                *s = 1.0;
            }
        }

        let standardized: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(means.iter().zip(&scales))
                    .map(|(x, (m, s))| (x - m) / s)
                    .collect()
            })
            .collect();

        let mut weights = vec![0.0; FEATURE_COUNT];
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let mut grad_w = vec![0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (x, y) in standardized.iter().zip(&targets) {
                let z = x.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>() + bias;
                let err = sigmoid(z) - y;
                for (g, a) in grad_w.iter_mut().zip(x) {
                    *g += err * a;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / count + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b / count;
        }

        let parameters = ModelParameters {
            weights,
            bias,
            means,
            scales,
        };
        if !parameters.is_valid() {
            return Err(TrainingError::NonFinite("trained parameters".to_string()));
        }
        debug!(
            "Trained model v{} on {} examples (minority ratio {:.3}, dominant {:?})",
            version,
            n,
            ratio,
            parameters.dominant_feature()
        );
        Ok(ModelState {
            version,
            parameters,
            trained_at: now,
            training_example_count: n,
        })
    }
}
