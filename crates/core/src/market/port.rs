use crate::common::Timeframe;
use crate::market::entity::PriceBar;
use crate::market::error::FeedError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 行情数据源接口（外部协作者），向核心供给 K 线。
///
/// # Invariants
/// - 同一 (symbol, timeframe) 返回的 K 线按时间戳非递减排列。
/// - 核心会拒绝时间戳不严格大于上一根已接收 K 线的数据，
///   实现者无需自行去重。
#[async_trait]
pub trait BarFeed: Send + Sync {
    /// # Summary
    /// 获取特定品种在指定时间范围内的 K 线数据。
    ///
    /// # Logic
    /// 1. 验证时间范围合法性。
    /// 2. 从底层数据源读取并解析 K 线。
    /// 3. 过滤出 `[start, end]` 范围内的数据。
    ///
    /// # Arguments
    /// * `symbol`: 交易代码。
    /// * `timeframe`: K 线周期。
    /// * `start`: 开始时间（包含）。
    /// * `end`: 结束时间（包含）。
    ///
    /// # Returns
    /// 成功返回 K 线列表。
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, FeedError>;

    /// # Summary
    /// 列出数据源当前可供给的交易代码。
    fn symbols(&self) -> Vec<String>;
}
