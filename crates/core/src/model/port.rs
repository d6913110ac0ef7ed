use crate::model::entity::ModelState;
use crate::model::error::StoreError;
use async_trait::async_trait;

/// # Summary
/// 模型持久化接口，只追加。
///
/// # Invariants
/// - 同一版本只写入一次，已有版本永不覆盖。
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// # Summary
    /// 保存一个新安装的模型版本。
    ///
    /// # Returns
    /// 版本已存在时返回 `StoreError::AlreadyExists`。
    async fn save(&self, state: &ModelState) -> Result<(), StoreError>;

    /// # Summary
    /// 加载版本号最大的模型，没有任何版本时返回 `None`。
    async fn load_latest(&self) -> Result<Option<ModelState>, StoreError>;
}
