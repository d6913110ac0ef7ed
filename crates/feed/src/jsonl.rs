use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shikake_core::common::Timeframe;
use shikake_core::market::entity::PriceBar;
use shikake_core::market::error::FeedError;
use shikake_core::market::port::BarFeed;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// # Summary
/// JSON Lines 历史 K 线数据源，每行一个 `PriceBar`。
///
/// # Invariants
/// - 文件在创建时一次性读入内存，之后只读。
/// - 每个 (symbol, timeframe) 序列按时间戳稳定排序，重复时间戳原样保留，交由核心拒绝。
#[derive(Debug, Clone, Default)]
pub struct JsonlFeed {
    series: BTreeMap<(String, Timeframe), Vec<PriceBar>>,
}

impl JsonlFeed {
    /// # Summary
    /// 从文件加载。
    ///
    /// # Logic
    /// 1. 异步读取整个文件。
    /// 2. 逐行解析，空行跳过。
    ///
    /// # Arguments
    /// * `path`: JSON Lines 文件路径。
    ///
    /// # Returns
    /// 文件不存在返回 `FeedError::NotFound`，格式错误返回带行号的 `FeedError::Parse`。
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FeedError::NotFound
            } else {
                FeedError::Io(format!("{}: {}", path.display(), e))
            }
        })?;
        let feed = Self::parse(&text)?;
        info!(
            "Loaded {} bar series from {}",
            feed.series.len(),
            path.display()
        );
        Ok(feed)
    }

    /// # Summary
    /// 解析 JSON Lines 文本。
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        let mut series: BTreeMap<(String, Timeframe), Vec<PriceBar>> = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bar: PriceBar = serde_json::from_str(line)
                .map_err(|e| FeedError::Parse(format!("line {}: {}", index + 1, e)))?;
            series
                .entry((bar.symbol.clone(), bar.timeframe))
                .or_default()
                .push(bar);
        }
        for bars in series.values_mut() {
            bars.sort_by_key(|b| b.timestamp);
        }
        Ok(Self { series })
    }

    /// 某个序列的 K 线数量。
    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl BarFeed for JsonlFeed {
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, FeedError> {
        if start > end {
            return Err(FeedError::Parse(format!(
                "start {start} is after end {end}"
            )));
        }
        let Some(bars) = self.series.get(&(symbol.to_string(), timeframe)) else {
            debug!("No {:?} bars for {}", timeframe, symbol);
            return Ok(Vec::new());
        };
        Ok(bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect())
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().map(|(s, _)| s.clone()).collect();
        symbols.dedup();
        symbols
    }
}
