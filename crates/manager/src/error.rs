use shikake_core::analysis::error::AnalysisError;
use shikake_core::config::ConfigError;
use shikake_core::market::error::FeedError;
use shikake_core::model::error::StoreError;
use shikake_core::signal::error::SignalError;
use thiserror::Error;

/// # Summary
/// Manager 层的统一错误类型。
#[derive(Error, Debug)]
pub enum ManagerError {
    // 数据源违约（时间戳倒退），调用方必须处理
    #[error("Feed contract violated: {0}")]
    FeedContract(AnalysisError),
    #[error("Analysis error: {0}")]
    Analysis(AnalysisError),
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("Model store error: {0}")]
    Store(#[from] StoreError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    // 后台任务异常退出
    #[error("Task error: {0}")]
    Task(String),
}

impl From<AnalysisError> for ManagerError {
    fn from(e: AnalysisError) -> Self {
        if e.is_contract_violation() {
            ManagerError::FeedContract(e)
        } else {
            ManagerError::Analysis(e)
        }
    }
}
