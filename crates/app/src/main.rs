use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::{Config, Environment, File};
use shikake_core::common::time::FakeClockProvider;
use shikake_core::config::{AppConfig, LoggingConfig};
use shikake_core::model::port::ModelStore;
use shikake_core::signal::port::SignalSink;
use shikake_feed::jsonl::JsonlFeed;
use shikake_manager::manager::SignalManager;
use shikake_manager::replay::ReplayDriver;
use shikake_manager::sink::{ChannelSink, LogSink};
use shikake_model::store::JsonModelStore;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_CONFIG: &str = "config/shikake";

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 读取配置文件（可缺省，缺省时全部使用默认值）。
/// 2. 叠加 `SHIKAKE__` 前缀的环境变量，层级以 `__` 分隔，
///    例如 `SHIKAKE__ENGINE__MIN_RISK_REWARD=2.5`。
fn load_config(path: &str) -> Result<AppConfig, config::ConfigError> {
    Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("SHIKAKE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

/// # Summary
/// 初始化全局日志：控制台 + 按天滚动的文件。
///
/// # Returns
/// 文件写入线程的守卫，必须存活到进程退出。
fn init_logging(logging: &LoggingConfig) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    guard
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 SignalManager。
///
/// # Logic
/// 1. 加载配置并初始化全局日志。
/// 2. 实例化基础设施层（Feed、ModelStore、Sink）。
/// 3. 构造应用服务层（SignalManager），恢复已持久化的模型。
/// 4. 用虚拟时钟回放历史 K 线，输出汇总。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = load_config(&path)?;
    let _guard = init_logging(&config.logging);
    config.engine.validate()?;
    info!("Shikake signal engine starting with config {}", path);

    // 2. 基础设施层
    let feed = Arc::new(JsonlFeed::open(&config.replay.bars_path).await?);
    let model_store = JsonModelStore::new(&config.storage.model_dir);
    info!("Model store at {}", model_store.dir().display());
    let store: Arc<dyn ModelStore> = Arc::new(model_store);
    let channel = Arc::new(ChannelSink::new(256));
    let mut rx = channel.subscribe();
    let sinks: Vec<Arc<dyn SignalSink>> = vec![channel, Arc::new(LogSink)];

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => info!(
                    "{} {:?} {:?} entry {:.5} stop {:.5} target {:.5} rr {:.2} ({:?})",
                    signal.symbol,
                    signal.direction,
                    signal.entry_type,
                    signal.entry_price,
                    signal.stop_price,
                    signal.target_price,
                    signal.risk_reward_ratio,
                    signal.strength
                ),
                Err(RecvError::Lagged(n)) => warn!("Signal printer lagged by {} signals", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 3. 应用服务层
    let clock = Arc::new(FakeClockProvider::new(DateTime::<Utc>::UNIX_EPOCH));
    let manager = SignalManager::new(
        Arc::new(config.engine.clone()),
        clock.clone(),
        sinks,
        Some(store),
    )?;
    if let Some(version) = manager.restore_model().await? {
        info!("Restored model v{}", version);
    }

    // 4. 回放
    let driver = ReplayDriver::new(manager.clone(), feed, clock);
    let summary = driver
        .run(&config.replay.symbols, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
        .await?;
    let stats = manager.stats();
    info!(
        "Replay done: {} bars, {} signals, {} won, {} lost, {} expired, win rate {:.2}, model v{}",
        summary.bars,
        summary.emitted,
        stats.wins,
        stats.losses,
        stats.expired,
        stats.win_rate,
        summary.model_version
    );

    printer.abort();
    Ok(())
}
