pub mod time;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// K 线时间周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 枚举顺序即周期由小到大的顺序，`Ord` 依赖此顺序。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    // 1分钟
    M1,
    // 5分钟
    M5,
    // 15分钟
    M15,
    // 1小时
    H1,
    // 4小时
    H4,
    // 1日
    D1,
}

impl Timeframe {
    /// # Summary
    /// 返回该周期对应的时间跨度。
    ///
    /// # Returns
    /// `chrono::Duration`。
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "m1" => Ok(Timeframe::M1),
            "5m" | "m5" => Ok(Timeframe::M5),
            "15m" | "m15" => Ok(Timeframe::M15),
            "1h" | "h1" | "60" => Ok(Timeframe::H1),
            "4h" | "h4" | "240" => Ok(Timeframe::H4),
            "1d" | "d1" => Ok(Timeframe::D1),
            _ => Err(format!("Unknown Timeframe: {}", s)),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "1m"),
            Timeframe::M5 => write!(f, "5m"),
            Timeframe::M15 => write!(f, "15m"),
            Timeframe::H1 => write!(f, "1h"),
            Timeframe::H4 => write!(f, "4h"),
            Timeframe::D1 => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 价格运动方向。所有结构、缺口、信号均以此表达多空。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    // 看多 / 向上
    Bullish,
    // 看空 / 向下
    Bearish,
}

impl Direction {
    /// 反方向。
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    /// 方向符号：多为 `1.0`，空为 `-1.0`。
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

/// # Summary
/// 品种类别，作为置信度模型的一个离散特征。
///
/// # Invariants
/// - `code()` 的取值一经发布不得改变，否则已训练模型的特征语义会漂移。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SymbolCategory {
    Forex,
    Metal,
    Index,
    Crypto,
}

impl SymbolCategory {
    /// # Summary
    /// 根据交易代码推断品种类别。
    ///
    /// # Logic
    /// 1. 去掉券商后缀（如 `XAUUSDm` 的小写 `m`）并转为大写。
    /// 2. 依次匹配贵金属、加密货币、指数前缀。
    /// 3. 其余一律视为外汇。
    ///
    /// # Arguments
    /// * `symbol`: 交易代码。
    ///
    /// # Returns
    /// 推断出的类别。
    pub fn classify(symbol: &str) -> Self {
        let trimmed = if symbol.chars().any(|c| c.is_ascii_uppercase()) {
            symbol.trim_end_matches(|c: char| c.is_ascii_lowercase())
        } else {
            symbol
        };
        let upper = trimmed.to_uppercase();

        const METALS: [&str; 4] = ["XAU", "XAG", "XPT", "XPD"];
        const CRYPTO: [&str; 5] = ["BTC", "ETH", "SOL", "XRP", "LTC"];
        const INDICES: [&str; 7] = ["US30", "USTEC", "US500", "UK100", "DE30", "DE40", "JP225"];

        if METALS.iter().any(|p| upper.starts_with(p)) {
            SymbolCategory::Metal
        } else if CRYPTO.iter().any(|p| upper.starts_with(p)) {
            SymbolCategory::Crypto
        } else if INDICES.iter().any(|p| upper.starts_with(p)) {
            SymbolCategory::Index
        } else {
            SymbolCategory::Forex
        }
    }

    /// 模型特征编码。
    pub fn code(&self) -> f64 {
        match self {
            SymbolCategory::Forex => 0.0,
            SymbolCategory::Metal => 1.0,
            SymbolCategory::Index => 2.0,
            SymbolCategory::Crypto => 3.0,
        }
    }
}

/// # Summary
/// 将计数转换为 `f64`，超出 `u32` 范围时饱和。
///
/// # Invariants
/// - 不使用 `as` 强转，避免精度丢失告警。
pub fn count_to_f64(n: usize) -> f64 {
    u32::try_from(n).map(f64::from).unwrap_or(f64::from(u32::MAX))
}
