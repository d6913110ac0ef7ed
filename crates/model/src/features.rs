use chrono::{DateTime, Datelike, Timelike, Utc};
use shikake_core::analysis::entity::PriceZone;
use shikake_core::common::SymbolCategory;
use shikake_core::model::entity::FeatureVector;
use shikake_core::signal::entity::ScoreBreakdown;

/// # Summary
/// 特征提取所需的行情上下文（评估时刻的入场周期快照）。
#[derive(Debug, Clone, Copy)]
pub struct MarketContext {
    pub price: f64,
    pub atr: Option<f64>,
    pub rsi: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub in_kill_zone: bool,
    pub category: SymbolCategory,
    // 最新成交量 / 近期平均成交量
    pub volume_ratio: Option<f64>,
    // 形态携带的位移幅度（ATR 倍数）
    pub displacement: Option<f64>,
    // 形态的入场区域
    pub zone: Option<PriceZone>,
}

/// # Summary
/// 由评分明细与行情上下文构造定长特征向量。
///
/// # Logic
/// 1. 前五维直接取评分子项。
/// 2. 波动率为 ATR / 价格，ATR 未就绪或价格非正时记 0。
/// 3. RSI 未就绪时取中性值 50。
/// 4. 时段、品种类别、UTC 小时与星期编码为数值。
/// 5. 成交量比未就绪时取中性值 1；无位移或无区域时对应特征记 0。
/// 6. 区域宽度按 ATR 归一，ATR 未就绪时记 0。
pub fn extract(breakdown: &ScoreBreakdown, ctx: &MarketContext) -> FeatureVector {
    let volatility = match ctx.atr {
        Some(atr) if ctx.price > 0.0 => atr / ctx.price,
        _ => 0.0,
    };
    let fvg_size = match (ctx.zone, ctx.atr) {
        (Some(zone), Some(atr)) if atr > 0.0 => (zone.high - zone.low) / atr,
        _ => 0.0,
    };
    FeatureVector {
        trend_score: breakdown.trend,
        sweep_score: breakdown.sweep,
        displacement_score: breakdown.displacement,
        zone_score: breakdown.zone,
        session_score: breakdown.session,
        volatility,
        rsi: ctx.rsi.unwrap_or(50.0),
        in_kill_zone: if ctx.in_kill_zone { 1.0 } else { 0.0 },
        symbol_category: ctx.category.code(),
        hour_of_day: f64::from(ctx.timestamp.hour()),
        day_of_week: f64::from(ctx.timestamp.weekday().num_days_from_monday()),
        volume_ratio: ctx.volume_ratio.unwrap_or(1.0),
        displacement_size: ctx.displacement.unwrap_or(0.0),
        fvg_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_extract_defaults() {
        let breakdown = ScoreBreakdown {
            trend: 30.0,
            sweep: 20.0,
            displacement: 20.0,
            zone: 7.5,
            session: 0.0,
        };
        let ctx = MarketContext {
            price: 2650.0,
            atr: None,
            rsi: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 14, 45, 0).unwrap(),
            in_kill_zone: false,
            category: SymbolCategory::Metal,
            volume_ratio: None,
            displacement: None,
            zone: None,
        };
        let f = extract(&breakdown, &ctx);
        assert_eq!(f.volatility, 0.0);
        assert_eq!(f.rsi, 50.0);
        assert_eq!(f.hour_of_day, 14.0);
        // 2025-03-03 是周一
        assert_eq!(f.day_of_week, 0.0);
        assert_eq!(f.symbol_category, 1.0);
        assert_eq!(f.zone_score, 7.5);
        assert_eq!(f.volume_ratio, 1.0);
        assert_eq!(f.displacement_size, 0.0);
        assert_eq!(f.fvg_size, 0.0);
        assert!(f.is_finite());
    }

    #[test]
    fn test_extract_volume_displacement_and_zone() {
        let ctx = MarketContext {
            price: 2650.0,
            atr: Some(4.0),
            rsi: Some(38.0),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 7, 9, 15, 0).unwrap(),
            in_kill_zone: true,
            category: SymbolCategory::Metal,
            volume_ratio: Some(2.5),
            displacement: Some(2.2),
            zone: Some(PriceZone {
                low: 2644.0,
                high: 2650.0,
            }),
        };
        let f = extract(&ScoreBreakdown::default(), &ctx);
        assert_eq!(f.volatility, 4.0 / 2650.0);
        assert_eq!(f.rsi, 38.0);
        assert_eq!(f.in_kill_zone, 1.0);
        // 周五
        assert_eq!(f.day_of_week, 4.0);
        assert_eq!(f.volume_ratio, 2.5);
        assert_eq!(f.displacement_size, 2.2);
        assert_eq!(f.fvg_size, 1.5);
    }
}
