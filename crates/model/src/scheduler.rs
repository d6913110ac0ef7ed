use crate::handle::ModelHandle;
use crate::logistic::LogisticTrainer;
use shikake_core::common::time::TimeProvider;
use shikake_core::model::entity::{ModelState, TrainingExample};
use shikake_core::model::error::TrainingError;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// 样本池上限，超出后淘汰最旧样本
const MAX_EXAMPLES: usize = 5000;

/// # Summary
/// 一次重训任务：任务开始时的样本池快照与目标版本。
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub examples: Vec<TrainingExample>,
    pub version: u64,
    // 任务开始时计数器的值，成功后从计数器中扣除
    pub captured: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    examples: Vec<TrainingExample>,
    // 上次成功训练以来新增的标签数
    counter: usize,
    in_flight: bool,
}

/// # Summary
/// 调度器的只读快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub examples: usize,
    pub counter: usize,
    pub in_flight: bool,
    pub model_version: u64,
}

/// # Summary
/// 重训调度器：累计已标注的结算结果，达到阈值时派发训练任务。
///
/// # Invariants
/// - 任一时刻至多一个训练任务在途。
/// - 成功时计数器只扣除任务开始时捕获的数量，训练期间新到的结果保留。
/// - 失败时模型与计数器均不变，下一次结算会再次触发。
/// - 成功后计数器仍达到阈值时，由 `next_job` 立即派发后续任务。
pub struct TrainingScheduler {
    trigger: usize,
    trainer: LogisticTrainer,
    handle: Arc<ModelHandle>,
    clock: Arc<dyn TimeProvider>,
    ledger: Mutex<Ledger>,
}

impl TrainingScheduler {
    pub fn new(
        trigger: usize,
        trainer: LogisticTrainer,
        handle: Arc<ModelHandle>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            trigger: trigger.max(1),
            trainer,
            handle,
            clock,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    /// # Summary
    /// 记录一条已标注的结算结果。
    ///
    /// # Logic
    /// 1. 样本入池，计数器加一。
    /// 2. 计数器达到阈值且无任务在途时，标记在途并返回任务。
    ///
    /// # Returns
    /// 需要执行的训练任务，否则 `None`。
    pub fn record(&self, example: TrainingExample) -> Option<TrainingJob> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        ledger.examples.push(example);
        if ledger.examples.len() > MAX_EXAMPLES {
            let excess = ledger.examples.len() - MAX_EXAMPLES;
            ledger.examples.drain(..excess);
        }
        ledger.counter += 1;
        self.dispatch(&mut ledger)
    }

    /// # Summary
    /// 上一个任务成功收尾后，检查训练期间累计的结果是否已再次达到阈值。
    ///
    /// # Returns
    /// 需要立即执行的后续任务；计数不足或已有任务在途时为 `None`。
    pub fn next_job(&self) -> Option<TrainingJob> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        self.dispatch(&mut ledger)
    }

    fn dispatch(&self, ledger: &mut Ledger) -> Option<TrainingJob> {
        if ledger.counter < self.trigger || ledger.in_flight {
            return None;
        }
        ledger.in_flight = true;
        let job = TrainingJob {
            examples: ledger.examples.clone(),
            version: self.handle.version() + 1,
            captured: ledger.counter,
        };
        info!(
            "Retraining triggered: {} new labels, {} examples, target v{}",
            job.captured,
            job.examples.len(),
            job.version
        );
        Some(job)
    }

    /// # Summary
    /// 在阻塞线程池上执行训练任务并收尾。
    ///
    /// # Logic
    /// 1. 通过 `spawn_blocking` 运行训练，不占用评估路径。
    /// 2. 成功则发布新模型并扣减计数器。
    /// 3. 任何失败都只记录日志并清除在途标记。
    ///
    /// # Returns
    /// 新发布的模型或失败原因。
    pub async fn execute(&self, job: TrainingJob) -> Result<Arc<ModelState>, TrainingError> {
        let trainer = self.trainer.clone();
        let examples = job.examples.clone();
        let version = job.version;
        let now = self.clock.now();
        let result = tokio::task::spawn_blocking(move || trainer.train(&examples, version, now))
            .await
            .map_err(|e| TrainingError::Worker(e.to_string()))
            .and_then(|r| r);
        self.finish(&job, result)
    }

    /// # Summary
    /// 同步执行训练任务（测试与回放使用）。
    pub fn execute_blocking(&self, job: TrainingJob) -> Result<Arc<ModelState>, TrainingError> {
        let result = self
            .trainer
            .train(&job.examples, job.version, self.clock.now());
        self.finish(&job, result)
    }

    fn finish(
        &self,
        job: &TrainingJob,
        result: Result<ModelState, TrainingError>,
    ) -> Result<Arc<ModelState>, TrainingError> {
        let installed = result.and_then(|state| self.handle.install(state));
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        ledger.in_flight = false;
        match installed {
            Ok(state) => {
                ledger.counter = ledger.counter.saturating_sub(job.captured);
                Ok(state)
            }
            Err(e) => {
                warn!(
                    "Retraining to v{} failed, keeping v{}: {}",
                    job.version,
                    self.handle.version(),
                    e
                );
                Err(e)
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        SchedulerStatus {
            examples: ledger.examples.len(),
            counter: ledger.counter,
            in_flight: ledger.in_flight,
            model_version: self.handle.version(),
        }
    }
}
