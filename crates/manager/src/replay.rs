use crate::error::ManagerError;
use crate::manager::SignalManager;
use chrono::{DateTime, Utc};
use shikake_core::common::Timeframe;
use shikake_core::common::time::FakeClockProvider;
use shikake_core::market::entity::PriceBar;
use shikake_core::market::port::BarFeed;
use shikake_core::signal::entity::{Outcome, SignalId};
use shikake_engine::evaluator::CycleVerdict;
use shikake_engine::judge::{Judgement, OutcomeJudge};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// # Summary
/// 一次回放的汇总。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    // 喂入的 K 线总数
    pub bars: usize,
    // 执行的评估周期数
    pub cycles: usize,
    pub emitted: usize,
    pub won: usize,
    pub lost: usize,
    pub expired: usize,
    // 被跳过或失败的周期
    pub skipped: usize,
    // 成功发布的新模型数量
    pub retrains: usize,
    pub model_version: u64,
}

/// # Summary
/// ReplayDriver：历史回放驱动器，接管时间流向，用历史 K 线主动驱动信号管理器。
///
/// # Invariants
/// - K 线按收盘时间推进；同一收盘时刻的所有 K 线作为一组处理。
/// - 每组处理前先把虚拟时钟拨到该组收盘时间，再结算旧信号，最后评估新 K 线。
/// - 重训任务在进入下一组前完成，回放结果可复现。
pub struct ReplayDriver {
    manager: Arc<SignalManager>,
    feed: Arc<dyn BarFeed>,
    clock: Arc<FakeClockProvider>,
    judge: OutcomeJudge,
}

impl ReplayDriver {
    /// # Summary
    /// 创建回放驱动器。
    ///
    /// # Arguments
    /// * `manager`: 以同一虚拟时钟构造的信号管理器。
    /// * `feed`: 历史 K 线数据源。
    /// * `clock`: 完全受本驱动器支配的虚拟时钟。
    pub fn new(
        manager: Arc<SignalManager>,
        feed: Arc<dyn BarFeed>,
        clock: Arc<FakeClockProvider>,
    ) -> Self {
        Self {
            manager,
            feed,
            clock,
            judge: OutcomeJudge,
        }
    }

    /// # Summary
    /// 回放 `[start, end]` 区间内指定品种的历史数据。
    ///
    /// # Logic
    /// 1. 拉取每个品种在高周期与入场周期上的 K 线，按收盘时间合并排序。
    /// 2. 逐组推进时钟，用入场周期 K 线判定待结算信号并上报结果。
    /// 3. 按品种并行执行评估周期。
    /// 4. 清理超时信号。
    ///
    /// # Arguments
    /// * `symbols`: 品种列表，为空时使用数据源提供的全部品种。
    /// * `start`: 开始时间（包含）。
    /// * `end`: 结束时间（包含）。
    ///
    /// # Returns
    /// * `Result<ReplaySummary, ManagerError>` - 数据源违约时中止并返回错误。
    pub async fn run(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReplaySummary, ManagerError> {
        let symbols = if symbols.is_empty() {
            self.feed.symbols()
        } else {
            symbols.to_vec()
        };
        info!(
            "ReplayDriver starting for {:?} from {} to {}",
            symbols, start, end
        );

        let config = self.manager.config();
        let entry_tf = config.entry_timeframe;
        let mut timeframes = vec![config.higher_timeframe, entry_tf];
        timeframes.dedup();

        let mut history = Vec::new();
        for symbol in &symbols {
            for tf in &timeframes {
                let bars = self.feed.fetch_bars(symbol, *tf, start, end).await?;
                history.extend(bars);
            }
        }
        if history.is_empty() {
            warn!("Replay driver got no historical bars. Nothing to do.");
            return Ok(ReplaySummary::default());
        }
        history.sort_by(|a, b| {
            close_time(a)
                .cmp(&close_time(b))
                .then(b.timeframe.cmp(&a.timeframe))
                .then(a.symbol.cmp(&b.symbol))
        });

        let mut summary = ReplaySummary {
            bars: history.len(),
            ..ReplaySummary::default()
        };
        // 已成交的限价信号
        let mut filled: HashSet<SignalId> = HashSet::new();
        for group in history.chunk_by(|a, b| close_time(a) == close_time(b)) {
            let Some(first) = group.first() else {
                continue;
            };
            // 步骤 1: 将时间拨动到本组收盘时间
            self.clock.set_time(close_time(first));

            // 步骤 2: 结算旧信号
            self.settle(group, entry_tf, &mut filled, &mut summary).await;

            // 步骤 3: 评估新 K 线
            let mut batches: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();
            for bar in group {
                batches.entry(bar.symbol.clone()).or_default().push(bar.clone());
            }
            for (symbol, result) in self.manager.run_batch(batches.into_iter().collect()).await {
                summary.cycles += 1;
                match result {
                    Ok(eval) if eval.verdict == CycleVerdict::Emitted => summary.emitted += 1,
                    Ok(eval) => {
                        if matches!(eval.verdict, CycleVerdict::Skipped { .. }) {
                            summary.skipped += 1;
                        }
                    }
                    Err(e @ ManagerError::FeedContract(_)) => return Err(e),
                    Err(e) => {
                        warn!("Replay cycle for {} failed: {}", symbol, e);
                        summary.skipped += 1;
                    }
                }
            }

            // 步骤 4: 清理超时信号
            for signal in self.manager.expire_stale().await {
                filled.remove(&signal.id);
                summary.expired += 1;
            }
        }

        summary.model_version = self.manager.model_handle().version();
        info!("ReplayDriver finished: {:?}", summary);
        Ok(summary)
    }

    async fn settle(
        &self,
        group: &[PriceBar],
        entry_tf: Timeframe,
        filled: &mut HashSet<SignalId>,
        summary: &mut ReplaySummary,
    ) {
        for signal in self.manager.pending_signals() {
            let mut outcome = None;
            for bar in group.iter().filter(|bar| bar.timeframe == entry_tf) {
                match self.judge.judge(&signal, bar, filled.contains(&signal.id)) {
                    Judgement::Untouched => {}
                    Judgement::Filled => {
                        filled.insert(signal.id.clone());
                    }
                    Judgement::Resolved(resolved) => {
                        outcome = Some(resolved);
                        break;
                    }
                }
            }
            let Some(outcome) = outcome else {
                continue;
            };
            filled.remove(&signal.id);

            let receipt = match self.manager.record_outcome(&signal.id, outcome).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    warn!("Replay failed to resolve {}: {}", signal.id, e);
                    continue;
                }
            };
            match outcome {
                Outcome::Won => summary.won += 1,
                Outcome::Lost => summary.lost += 1,
                Outcome::Expired => summary.expired += 1,
            }

            if let Some(task) = receipt.training {
                match task.await {
                    Ok(Ok(model)) => {
                        summary.retrains += 1;
                        info!("Replay installed model v{}", model.version);
                    }
                    Ok(Err(e)) => warn!("Replay retraining skipped: {}", e),
                    Err(e) => warn!("Replay retraining task aborted: {}", e),
                }
            }
        }
    }
}

fn close_time(bar: &PriceBar) -> DateTime<Utc> {
    bar.timestamp + bar.timeframe.duration()
}
