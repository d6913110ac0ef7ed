use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use shikake_core::common::count_to_f64;
use shikake_core::model::entity::FeatureVector;
use shikake_core::signal::entity::{LedgerStats, Outcome, Signal, SignalId, SignalStatus};
use shikake_core::signal::error::SignalError;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};

// 默认保留的已结算记录数
const DEFAULT_RETAINED: usize = 1000;

/// # Summary
/// 台账中的一条记录：信号本身与其生成时的特征向量。
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub signal: Signal,
    // 作为训练样本的输入
    pub features: FeatureVector,
}

/// 已结算信号的累计计数与按结算顺序排列的 ID。
#[derive(Debug, Default)]
struct Archive {
    order: VecDeque<SignalId>,
    wins: usize,
    losses: usize,
    expired: usize,
}

/// # Summary
/// 信号台账，保存待结算信号与最近的已结算信号。
///
/// # Invariants
/// - 每个信号恰好一次终态转换，重复结算被拒绝。
/// - 已结算记录至多保留 `retained` 条，最早结算的先被淘汰；统计按累计计数，不受淘汰影响。
/// - 并发安全：内部使用 `DashMap`，按信号 ID 分片加锁。
#[derive(Debug)]
pub struct SignalLedger {
    entries: DashMap<SignalId, LedgerEntry>,
    archive: Mutex<Archive>,
    retained: usize,
}

impl Default for SignalLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED)
    }
}

impl SignalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定已结算记录保留条数的台账。
    pub fn with_retention(retained: usize) -> Self {
        Self {
            entries: DashMap::new(),
            archive: Mutex::new(Archive::default()),
            retained,
        }
    }

    pub fn insert(&self, signal: Signal, features: FeatureVector) {
        self.entries
            .insert(signal.id.clone(), LedgerEntry { signal, features });
    }

    pub fn get(&self, id: &SignalId) -> Option<LedgerEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Summary
    /// 将信号迁移到终态。
    ///
    /// # Logic
    /// 1. 在该信号的分片写锁内完成状态迁移。
    /// 2. 释放分片锁后计入累计统计，并淘汰超出保留数的最早记录。
    ///
    /// # Returns
    /// 迁移后的记录；未知或已被淘汰的信号返回 `NotFound`，已结算返回 `AlreadyResolved`。
    pub fn resolve(
        &self,
        id: &SignalId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, SignalError> {
        let resolved = {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| SignalError::NotFound(id.clone()))?;
            entry.signal.resolve(outcome, now)?;
            entry.value().clone()
        };
        self.retire(id, outcome);
        Ok(resolved)
    }

    fn retire(&self, id: &SignalId, outcome: Outcome) {
        let mut archive = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        match outcome {
            Outcome::Won => archive.wins += 1,
            Outcome::Lost => archive.losses += 1,
            Outcome::Expired => archive.expired += 1,
        }
        archive.order.push_back(id.clone());
        while archive.order.len() > self.retained {
            if let Some(old) = archive.order.pop_front() {
                self.entries.remove(&old);
                debug!("Evicted resolved signal {}", old);
            }
        }
    }

    /// 全部待结算信号。
    pub fn pending(&self) -> Vec<Signal> {
        self.entries
            .iter()
            .filter(|e| e.signal.status == SignalStatus::Pending)
            .map(|e| e.signal.clone())
            .collect()
    }

    pub fn pending_for(&self, symbol: &str) -> Option<Signal> {
        self.entries
            .iter()
            .find(|e| e.signal.status == SignalStatus::Pending && e.signal.symbol == symbol)
            .map(|e| e.signal.clone())
    }

    /// # Summary
    /// 将存活超过 `ttl` 的待结算信号标记为过期。
    ///
    /// # Logic
    /// 1. 先收集到期 ID，再逐个迁移，避免在遍历时持有分片写锁。
    /// 2. 并发结算抢先的信号会被跳过。
    ///
    /// # Returns
    /// 本次过期的信号。
    pub fn expire_stale(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<Signal> {
        let stale: Vec<SignalId> = self
            .entries
            .iter()
            .filter(|e| e.signal.status == SignalStatus::Pending && e.signal.created_at + ttl <= now)
            .map(|e| e.key().clone())
            .collect();

        let expired: Vec<Signal> = stale
            .iter()
            .filter_map(|id| self.resolve(id, Outcome::Expired, now).ok())
            .map(|e| e.signal)
            .collect();
        if !expired.is_empty() {
            info!("Expired {} stale signals", expired.len());
        }
        expired
    }

    /// 胜负与过期统计，包含已被淘汰的记录。
    pub fn stats(&self) -> LedgerStats {
        let pending = self
            .entries
            .iter()
            .filter(|e| e.signal.status == SignalStatus::Pending)
            .count();
        let mut stats = {
            let archive = self.archive.lock().unwrap_or_else(|e| e.into_inner());
            LedgerStats {
                wins: archive.wins,
                losses: archive.losses,
                expired: archive.expired,
                pending,
                win_rate: 0.0,
            }
        };
        let decided = stats.wins + stats.losses;
        if decided > 0 {
            stats.win_rate = count_to_f64(stats.wins) / count_to_f64(decided);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shikake_core::common::Direction;
    use shikake_core::signal::entity::{EntryType, StrengthCategory};

    fn signal(id: &str, symbol: &str, created_at: DateTime<Utc>) -> Signal {
        Signal {
            id: SignalId(id.to_string()),
            symbol: symbol.to_string(),
            direction: Direction::Bullish,
            entry_type: EntryType::Market,
            entry_price: 2650.0,
            stop_price: 2645.0,
            target_price: 2665.0,
            risk_reward_ratio: 3.0,
            strength: StrengthCategory::High,
            raw_score: 70.0,
            ml_confidence: None,
            created_at,
            status: SignalStatus::Pending,
            resolved_at: None,
        }
    }

    #[test]
    fn test_resolve_once() {
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ledger = SignalLedger::new();
        ledger.insert(signal("a", "XAUUSD", t), FeatureVector::default());

        let id = SignalId("a".to_string());
        let entry = ledger.resolve(&id, Outcome::Won, t).unwrap();
        assert_eq!(entry.signal.status, SignalStatus::Won);
        assert!(matches!(
            ledger.resolve(&id, Outcome::Lost, t),
            Err(SignalError::AlreadyResolved { .. })
        ));
        assert!(matches!(
            ledger.resolve(&SignalId("missing".to_string()), Outcome::Won, t),
            Err(SignalError::NotFound(_))
        ));
    }

    #[test]
    fn test_expire_and_stats() {
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ledger = SignalLedger::new();
        ledger.insert(signal("old", "XAUUSD", t), FeatureVector::default());
        ledger.insert(
            signal("new", "EURUSD", t + Duration::hours(20)),
            FeatureVector::default(),
        );
        ledger.insert(signal("won", "BTCUSD", t), FeatureVector::default());
        ledger
            .resolve(&SignalId("won".to_string()), Outcome::Won, t)
            .unwrap();

        let expired = ledger.expire_stale(t + Duration::hours(24), Duration::minutes(1440));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, SignalId("old".to_string()));
        assert!(ledger.pending_for("XAUUSD").is_none());
        assert!(ledger.pending_for("EURUSD").is_some());

        let stats = ledger.stats();
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.win_rate, 1.0);
    }

    #[test]
    fn test_resolved_entries_are_bounded() {
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ledger = SignalLedger::with_retention(3);
        for i in 0..10 {
            ledger.insert(signal(&format!("s-{i}"), "XAUUSD", t), FeatureVector::default());
        }
        ledger.insert(signal("open", "EURUSD", t), FeatureVector::default());
        for i in 0..10 {
            let outcome = if i % 3 == 0 { Outcome::Lost } else { Outcome::Won };
            ledger
                .resolve(&SignalId(format!("s-{i}")), outcome, t)
                .unwrap();
        }

        // 3 条最近结算 + 1 条待结算
        assert_eq!(ledger.len(), 4);
        assert!(ledger.get(&SignalId("s-0".to_string())).is_none());
        assert!(ledger.get(&SignalId("s-9".to_string())).is_some());
        assert!(ledger.pending_for("EURUSD").is_some());

        // 统计不受淘汰影响
        let stats = ledger.stats();
        assert_eq!(stats.wins, 6);
        assert_eq!(stats.losses, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.win_rate, 0.6);

        // 过期同样计入并参与淘汰
        let expired = ledger.expire_stale(t + Duration::days(2), Duration::minutes(1440));
        assert_eq!(expired.len(), 1);
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.stats().expired, 1);
        assert_eq!(ledger.stats().pending, 0);
    }
}
