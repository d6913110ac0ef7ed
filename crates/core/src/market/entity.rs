use crate::common::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的价格波动。
///
/// # Invariants
/// - 一经接收即不可变。
/// - 同一 (symbol, timeframe) 下时间戳严格递增。
/// - `high` 必须大于或等于 `low`, `open`, `close`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    // 交易代码
    pub symbol: String,
    // K 线周期
    pub timeframe: Timeframe,
    // K 线开始时间
    pub timestamp: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
}

impl PriceBar {
    /// # Summary
    /// 检查 K 线数值是否自洽。
    ///
    /// # Logic
    /// 1. 所有价格与成交量必须是有限数。
    /// 2. 价格必须为正，成交量不得为负。
    /// 3. `high` 不低于其余三个价格，`low` 不高于其余三个价格。
    ///
    /// # Returns
    /// 自洽返回 `true`。
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return false;
        }
        prices.iter().all(|p| *p <= self.high && *p >= self.low)
    }

    /// K 线实体方向；十字星返回 `None`。
    pub fn body_direction(&self) -> Option<crate::common::Direction> {
        if self.close > self.open {
            Some(crate::common::Direction::Bullish)
        } else if self.close < self.open {
            Some(crate::common::Direction::Bearish)
        } else {
            None
        }
    }

    /// 最高价与最低价之差。
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}
