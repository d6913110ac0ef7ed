use thiserror::Error;

/// # Summary
/// 训练失败原因。任何一种失败都保留旧模型与计数器。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    // 样本不足，视为“尚未就绪”
    #[error("Insufficient data: {found} examples, {required} required")]
    InsufficientData { found: usize, required: usize },
    // 标签严重失衡
    #[error("Skewed labels: minority ratio {ratio:.3} below {required:.3}")]
    SkewedLabels { ratio: f64, required: f64 },
    // 特征或训练结果出现 NaN / Inf
    #[error("Non-finite values: {0}")]
    NonFinite(String),
    // 版本号不大于当前活跃版本
    #[error("Stale model version {offered}, active is {active}")]
    StaleVersion { offered: u64, active: u64 },
    // 后台训练任务异常退出
    #[error("Worker error: {0}")]
    Worker(String),
}

/// # Summary
/// 模型存储错误枚举。
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Io error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    // 目标版本文件已存在，拒绝覆盖
    #[error("Version {0} already persisted")]
    AlreadyExists(u64),
}
