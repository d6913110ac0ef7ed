use async_trait::async_trait;
use shikake_core::signal::entity::Signal;
use shikake_core::signal::error::SinkError;
use shikake_core::signal::port::SignalSink;
use tokio::sync::broadcast;
use tracing::info;

/// # Summary
/// 广播通道下游：每个订阅者都会收到全部新信号。
///
/// # Invariants
/// - 没有订阅者时发送失败，返回 `SinkError::Closed`。
/// - 慢订阅者会丢失最旧的消息，不阻塞发送方。
pub struct ChannelSink {
    tx: broadcast::Sender<Signal>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl SignalSink for ChannelSink {
    async fn emit(&self, signal: &Signal) -> Result<(), SinkError> {
        self.tx
            .send(signal.clone())
            .map(|_| ())
            .map_err(|_| SinkError::Closed(format!("no subscriber for signal {}", signal.id)))
    }
}

/// # Summary
/// 日志下游：把信号以单行 JSON 写入 `tracing`。
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl SignalSink for LogSink {
    async fn emit(&self, signal: &Signal) -> Result<(), SinkError> {
        let line = serde_json::to_string(signal).map_err(|e| SinkError::Delivery(e.to_string()))?;
        info!(target: "shikake::signal", "{}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shikake_core::common::Direction;
    use shikake_core::signal::entity::{EntryType, SignalId, SignalStatus, StrengthCategory};

    fn signal() -> Signal {
        Signal {
            id: SignalId("s-1".to_string()),
            symbol: "EURUSD".to_string(),
            direction: Direction::Bearish,
            entry_type: EntryType::Limit,
            entry_price: 1.1,
            stop_price: 1.105,
            target_price: 1.085,
            risk_reward_ratio: 3.0,
            strength: StrengthCategory::VeryHigh,
            raw_score: 85.0,
            ml_confidence: Some(0.72),
            created_at: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
            status: SignalStatus::Pending,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_channel_fans_out() {
        let sink = ChannelSink::new(8);
        assert!(matches!(
            sink.emit(&signal()).await,
            Err(SinkError::Closed(_))
        ));

        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        sink.emit(&signal()).await.unwrap();
        assert_eq!(a.recv().await.unwrap().id, SignalId("s-1".to_string()));
        assert_eq!(b.recv().await.unwrap().raw_score, 85.0);
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        assert!(LogSink.emit(&signal()).await.is_ok());
    }
}
