use crate::error::ManagerError;
use async_trait::async_trait;
use chrono::Duration;
use shikake_analysis::state::StateStore;
use shikake_core::common::time::TimeProvider;
use shikake_core::config::EngineConfig;
use shikake_core::market::entity::PriceBar;
use shikake_core::model::entity::{ModelState, TrainingExample};
use shikake_core::model::error::TrainingError;
use shikake_core::model::port::ModelStore;
use shikake_core::signal::entity::{LedgerStats, Outcome, Signal, SignalId};
use shikake_core::signal::error::SignalError;
use shikake_core::signal::port::{OutcomeRecorder, SignalSink};
use shikake_engine::evaluator::{Evaluation, Evaluator};
use shikake_engine::ledger::SignalLedger;
use shikake_model::handle::ModelHandle;
use shikake_model::logistic::LogisticTrainer;
use shikake_model::scheduler::{SchedulerStatus, TrainingJob, TrainingScheduler};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// 后台重训任务句柄，完成时给出新发布的模型或失败原因。
pub type TrainingTask = JoinHandle<Result<Arc<ModelState>, TrainingError>>;

/// # Summary
/// 结果上报的回执。
#[derive(Debug)]
pub struct OutcomeReceipt {
    // 迁移到终态后的信号
    pub signal: Signal,
    // 本次结算触发的重训任务
    pub training: Option<TrainingTask>,
}

/// # Summary
/// 信号管理器，系统的应用服务层门面 (Facade)。
/// 编译期仅依赖 `shikake-core` 中的 Trait 定义，下游与模型存储通过构造函数注入。
///
/// # Invariants
/// - 每个品种的评估周期持有该品种状态的独占锁，同一品种的周期串行执行。
/// - 不同品种的周期互不阻塞，任一品种失败不影响其他品种。
/// - 重训在后台执行，评估路径只读取模型快照。
pub struct SignalManager {
    config: Arc<EngineConfig>,
    // 各品种分析状态
    states: StateStore,
    evaluator: Evaluator,
    ledger: SignalLedger,
    scheduler: Arc<TrainingScheduler>,
    sinks: Vec<Arc<dyn SignalSink>>,
    model_store: Option<Arc<dyn ModelStore>>,
    clock: Arc<dyn TimeProvider>,
}

impl SignalManager {
    /// # Summary
    /// 创建 SignalManager 实例。
    ///
    /// # Arguments
    /// * `config` - 已加载的引擎配置，创建前会再次校验。
    /// * `clock` - 时间供给器，实时运行用真实时钟，回放用虚拟时钟。
    /// * `sinks` - 信号下游列表。
    /// * `model_store` - 模型持久化实现，为空时模型只存在于内存中。
    ///
    /// # Returns
    /// * `Result<Arc<Self>, ManagerError>` - 配置非法时返回错误。
    pub fn new(
        config: Arc<EngineConfig>,
        clock: Arc<dyn TimeProvider>,
        sinks: Vec<Arc<dyn SignalSink>>,
        model_store: Option<Arc<dyn ModelStore>>,
    ) -> Result<Arc<Self>, ManagerError> {
        config.validate()?;
        let handle = Arc::new(ModelHandle::new());
        let scheduler = TrainingScheduler::new(
            config.training_trigger_count,
            LogisticTrainer::from_config(&config),
            handle,
            clock.clone(),
        );
        Ok(Arc::new(Self {
            evaluator: Evaluator::new(&config),
            states: StateStore::new(config.clone()),
            ledger: SignalLedger::new(),
            scheduler: Arc::new(scheduler),
            config,
            sinks,
            model_store,
            clock,
        }))
    }

    /// # Summary
    /// 启动时从模型存储恢复最新版本。
    ///
    /// # Returns
    /// 恢复出的版本号；没有存储或没有任何版本时返回 `None`。
    pub async fn restore_model(&self) -> Result<Option<u64>, ManagerError> {
        let Some(store) = &self.model_store else {
            return Ok(None);
        };
        let Some(state) = store.load_latest().await? else {
            info!("No persisted model found, running on confluence only");
            return Ok(None);
        };
        let version = state.version;
        match self.scheduler.handle().install(state) {
            Ok(_) => Ok(Some(version)),
            Err(e) => {
                warn!("Persisted model v{} not installed: {}", version, e);
                Ok(None)
            }
        }
    }

    /// # Summary
    /// 对单个品种执行一轮评估。
    ///
    /// # Logic
    /// 1. 获取该品种状态句柄并加锁。
    /// 2. 取当前模型快照，调用纯评估函数。
    /// 3. 产生信号时写入台账，释放锁后扇出到各下游；下游失败只记录日志。
    ///
    /// # Arguments
    /// * `symbol` - 交易代码。
    /// * `bars` - 本批新 K 线。
    ///
    /// # Returns
    /// * `Result<Evaluation, ManagerError>` - 数据源违约时返回 `FeedContract`。
    pub async fn run_cycle(
        &self,
        symbol: &str,
        bars: &[PriceBar],
    ) -> Result<Evaluation, ManagerError> {
        let handle = self.states.handle(symbol)?;
        let evaluation = {
            let mut state = handle.lock().await;
            let model = self.scheduler.handle().snapshot();
            let now = self.clock.now();
            let evaluation = self
                .evaluator
                .evaluate(&mut state, bars, model.as_deref(), now)
                .map_err(|e| {
                    error!("Cycle for {} rejected: {}", symbol, e);
                    ManagerError::from(e)
                })?;
            if let (Some(signal), Some(features)) = (&evaluation.signal, evaluation.features) {
                self.ledger.insert(signal.clone(), features);
            }
            evaluation
        };

        if let Some(signal) = &evaluation.signal {
            for sink in &self.sinks {
                if let Err(e) = sink.emit(signal).await {
                    warn!("Sink failed for signal {}: {}", signal.id, e);
                }
            }
        }
        Ok(evaluation)
    }

    /// # Summary
    /// 并行评估多个品种。
    ///
    /// # Logic
    /// 1. 每个品种一个 `JoinSet` 任务，记录任务标识到品种的映射。
    /// 2. 收集全部结果，任务崩溃转换为带品种的 `ManagerError::Task`。
    ///
    /// # Returns
    /// 每个品种的评估结果，顺序与完成顺序一致。
    pub async fn run_batch(
        self: &Arc<Self>,
        batches: Vec<(String, Vec<PriceBar>)>,
    ) -> Vec<(String, Result<Evaluation, ManagerError>)> {
        let mut set = JoinSet::new();
        let mut owners = HashMap::new();
        for (symbol, bars) in batches {
            let manager = self.clone();
            let task_symbol = symbol.clone();
            let handle = set.spawn(async move {
                let result = manager.run_cycle(&task_symbol, &bars).await;
                (task_symbol, result)
            });
            owners.insert(handle.id(), symbol);
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => {
                    let symbol = owners.remove(&e.id()).unwrap_or_default();
                    error!("Cycle task for {} aborted: {}", symbol, e);
                    results.push((symbol, Err(ManagerError::Task(e.to_string()))));
                }
            }
        }
        results
    }

    /// # Summary
    /// 记录信号结果。
    ///
    /// # Logic
    /// 1. 台账迁移到终态，未知或重复结算直接返回错误。
    /// 2. 释放该品种的待结算槽位。
    /// 3. 盈亏结果作为训练样本计入调度器；达到阈值时在后台启动重训。
    /// 4. 重训成功后持久化新模型，持久化失败只记录日志。
    /// 5. 训练期间又累计满一批时，同一后台任务接着训练下一版本。
    ///
    /// # Arguments
    /// * `signal_id` - 信号标识。
    /// * `outcome` - 结果。
    ///
    /// # Returns
    /// * `Result<OutcomeReceipt, SignalError>` - 未知信号或重复结算时返回错误，计数不变。
    pub async fn record_outcome(
        &self,
        signal_id: &SignalId,
        outcome: Outcome,
    ) -> Result<OutcomeReceipt, SignalError> {
        let entry = self.ledger.resolve(signal_id, outcome, self.clock.now())?;
        self.release_slot(&entry.signal).await;
        info!(
            "Signal {} on {} resolved as {:?}",
            signal_id, entry.signal.symbol, outcome
        );

        let training = outcome
            .label()
            .and_then(|label| {
                self.scheduler.record(TrainingExample {
                    signal_id: signal_id.clone(),
                    features: entry.features,
                    label,
                })
            })
            .map(|job| {
                tokio::spawn(retrain(
                    self.scheduler.clone(),
                    self.model_store.clone(),
                    job,
                ))
            });

        Ok(OutcomeReceipt {
            signal: entry.signal,
            training,
        })
    }

    /// # Summary
    /// 将超过存活时间的待结算信号标记为过期，并释放对应槽位。
    pub async fn expire_stale(&self) -> Vec<Signal> {
        let ttl = Duration::minutes(self.config.signal_ttl_minutes);
        let expired = self.ledger.expire_stale(self.clock.now(), ttl);
        for signal in &expired {
            self.release_slot(signal).await;
        }
        expired
    }

    async fn release_slot(&self, signal: &Signal) {
        if let Some(handle) = self.states.get(&signal.symbol) {
            let mut state = handle.lock().await;
            if state.signals.pending.as_ref() == Some(&signal.id) {
                state.signals.pending = None;
            }
        }
    }

    pub fn stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    pub fn pending_signal(&self, symbol: &str) -> Option<Signal> {
        self.ledger.pending_for(symbol)
    }

    pub fn pending_signals(&self) -> Vec<Signal> {
        self.ledger.pending()
    }

    pub fn training_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn model_handle(&self) -> &Arc<ModelHandle> {
        self.scheduler.handle()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.states.symbols()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// # Summary
/// 后台重训循环：执行任务，持久化新模型，直到没有后续任务。
///
/// # Returns
/// 最后发布的模型；任一任务失败时返回失败原因，计数器保留等待下一次结算。
async fn retrain(
    scheduler: Arc<TrainingScheduler>,
    store: Option<Arc<dyn ModelStore>>,
    mut job: TrainingJob,
) -> Result<Arc<ModelState>, TrainingError> {
    loop {
        let state = scheduler.execute(job).await?;
        if let Some(store) = &store {
            if let Err(e) = store.save(&state).await {
                warn!("Failed to persist model v{}: {}", state.version, e);
            }
        }
        match scheduler.next_job() {
            Some(next) => job = next,
            None => return Ok(state),
        }
    }
}

#[async_trait]
impl OutcomeRecorder for SignalManager {
    async fn record_outcome(
        &self,
        signal_id: &SignalId,
        outcome: Outcome,
    ) -> Result<(), SignalError> {
        // 重训任务在后台继续运行，回执直接丢弃
        SignalManager::record_outcome(self, signal_id, outcome)
            .await
            .map(drop)
    }
}
