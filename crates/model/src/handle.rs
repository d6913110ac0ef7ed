use shikake_core::model::entity::ModelState;
use shikake_core::model::error::TrainingError;
use std::sync::{Arc, RwLock};
use tracing::info;

/// # Summary
/// 活跃模型的共享句柄。
///
/// # Invariants
/// - 读者通过 `snapshot` 克隆 `Arc`，持有期间参数不会变化。
/// - 发布只在写锁内替换一个指针；新版本号必须严格大于当前版本。
/// - 锁中毒时沿用中毒前的数据。
#[derive(Debug, Default)]
pub struct ModelHandle {
    active: RwLock<Option<Arc<ModelState>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前活跃模型的快照，未训练时为 `None`。
    pub fn snapshot(&self) -> Option<Arc<ModelState>> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 当前版本号，未训练时为 0。
    pub fn version(&self) -> u64 {
        self.snapshot().map(|s| s.version).unwrap_or(0)
    }

    /// # Summary
    /// 发布一个完整构建好的模型版本。
    ///
    /// # Logic
    /// 1. 在写锁内比较版本号，不大于当前版本则拒绝。
    /// 2. 替换指针，旧快照由仍持有它的读者自然释放。
    ///
    /// # Returns
    /// 发布后的快照；版本过旧返回 `TrainingError::StaleVersion`。
    pub fn install(&self, state: ModelState) -> Result<Arc<ModelState>, TrainingError> {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let current = active.as_ref().map(|s| s.version).unwrap_or(0);
        if state.version <= current {
            return Err(TrainingError::StaleVersion {
                offered: state.version,
                active: current,
            });
        }
        let state = Arc::new(state);
        *active = Some(state.clone());
        info!(
            "Model v{} installed ({} examples)",
            state.version, state.training_example_count
        );
        Ok(state)
    }
}
