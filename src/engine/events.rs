//! Typed scan events and the listener registry that fans them out.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::types::{CexPrices, DexPnl, ScanStats};

/// Pipeline stage a progress event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Realtime,
    Batch,
    Cex,
    Dex,
    Signal,
    Token,
}

/// Everything gathered for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub token_id: String,
    pub label: String,
    pub cex: CexPrices,
    pub dex: Vec<DexPnl>,
    /// Set when the token ended in error.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Start {
        total_tokens: usize,
        batch_size: usize,
    },
    Progress {
        stage: Stage,
        message: String,
        data: Option<Value>,
    },
    CexResult {
        token_id: String,
        prices: CexPrices,
    },
    PnlResult {
        token_id: String,
        result: DexPnl,
    },
    TokenComplete {
        snapshot: TokenSnapshot,
        progress_pct: f64,
    },
    BatchComplete {
        batch_index: usize,
        batch_count: usize,
    },
    Complete {
        stats: ScanStats,
        duration_ms: i64,
        aborted: bool,
    },
    Error {
        message: String,
    },
}

impl ScanEvent {
    pub fn progress(stage: Stage, message: impl Into<String>) -> Self {
        ScanEvent::Progress {
            stage,
            message: message.into(),
            data: None,
        }
    }

    pub fn progress_with(stage: Stage, message: impl Into<String>, data: Value) -> Self {
        ScanEvent::Progress {
            stage,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Registered listeners. Closed receivers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Mutex<Vec<UnboundedSender<ScanEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ScanEvent> {
        let (tx, rx) = unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: ScanEvent) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_listener() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(ScanEvent::Error { message: "boom".into() });

        for rx in [&mut a, &mut b] {
            match rx.try_recv().unwrap() {
                ScanEvent::Error { message } => assert_eq!(message, "boom"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);
        bus.emit(ScanEvent::progress(Stage::Batch, "x"));
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(ScanEvent::BatchComplete { batch_index: 0, batch_count: 3 }).unwrap();
        assert_eq!(json["type"], "batch_complete");
        assert_eq!(json["batch_count"], 3);
    }
}
