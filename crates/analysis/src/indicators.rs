use shikake_core::analysis::error::AnalysisError;
use shikake_core::market::entity::PriceBar;
use ta::indicators::{AverageTrueRange, RelativeStrengthIndex};
use ta::{Close, High, Low, Next, Open};

/// # Summary
/// `PriceBar` 到 `ta` 数据项 trait 的只读视图。
pub struct BarView<'a>(pub &'a PriceBar);

impl Open for BarView<'_> {
    fn open(&self) -> f64 {
        self.0.open
    }
}

impl High for BarView<'_> {
    fn high(&self) -> f64 {
        self.0.high
    }
}

impl Low for BarView<'_> {
    fn low(&self) -> f64 {
        self.0.low
    }
}

impl Close for BarView<'_> {
    fn close(&self) -> f64 {
        self.0.close
    }
}

/// # Summary
/// 单个周期的流式指标（ATR、RSI）。
///
/// # Invariants
/// - 预热完成前对应值为 `None`：ATR 需要 `atr_period` 根，RSI 需要 `rsi_period + 1` 根。
#[derive(Debug, Clone)]
pub struct Indicators {
    atr: AverageTrueRange,
    rsi: RelativeStrengthIndex,
    atr_period: usize,
    rsi_period: usize,
    // 已处理的 K 线数
    samples: usize,
    atr_value: f64,
    rsi_value: f64,
}

impl Indicators {
    /// # Summary
    /// 创建指标组。
    ///
    /// # Returns
    /// 周期非法时返回 `AnalysisError::InvalidParameter`。
    pub fn new(atr_period: usize, rsi_period: usize) -> Result<Self, AnalysisError> {
        let atr = AverageTrueRange::new(atr_period)
            .map_err(|e| AnalysisError::InvalidParameter(format!("atr_period: {e:?}")))?;
        let rsi = RelativeStrengthIndex::new(rsi_period)
            .map_err(|e| AnalysisError::InvalidParameter(format!("rsi_period: {e:?}")))?;
        Ok(Self {
            atr,
            rsi,
            atr_period,
            rsi_period,
            samples: 0,
            atr_value: 0.0,
            rsi_value: 50.0,
        })
    }

    /// # Summary
    /// 用一根新 K 线推进指标。
    ///
    /// # Returns
    /// 推进前的 ATR（位移判断所需的“上一根的 ATR”）。
    pub fn update(&mut self, bar: &PriceBar) -> Option<f64> {
        let before = self.atr();
        self.atr_value = self.atr.next(&BarView(bar));
        self.rsi_value = self.rsi.next(bar.close);
        self.samples += 1;
        before
    }

    pub fn atr(&self) -> Option<f64> {
        (self.samples >= self.atr_period).then_some(self.atr_value)
    }

    pub fn rsi(&self) -> Option<f64> {
        (self.samples > self.rsi_period).then_some(self.rsi_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shikake_core::common::Timeframe;

    fn bar(i: i64, close: f64) -> PriceBar {
        PriceBar {
            symbol: "XAUUSD".to_string(),
            timeframe: Timeframe::M15,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(15 * i),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_warm_up() {
        let mut ind = Indicators::new(3, 3).unwrap();
        assert_eq!(ind.update(&bar(0, 100.0)), None);
        assert_eq!(ind.update(&bar(1, 100.5)), None);
        assert_eq!(ind.update(&bar(2, 101.0)), None);
        // 第 3 根之后 ATR 就绪，第 4 根拿到的是推进前的值
        let before = ind.update(&bar(3, 101.5));
        assert!(before.is_some());
        assert!(ind.atr().unwrap() > 0.0);
        assert!(ind.rsi().is_some());
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            Indicators::new(0, 14),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }
}
