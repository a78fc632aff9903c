//! Progress event types and broadcast channel for batch telemetry.
//!
//! The orchestrator and prober emit `ProgressEvent`s which flow through a
//! `tokio::sync::broadcast` channel to any subscriber (CLI spinner, log
//! sink). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

use crate::types::ProbeStatus;

/// A progress event emitted while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The batch this event belongs to.
    pub batch_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    BatchStarted { total: usize },
    ItemStarted { index: usize, total: usize, label: String },
    /// The target was seen at `demand` during item `index`.
    DemandConfirmed { index: usize, demand: u32 },
    ItemCompleted {
        index: usize,
        total: usize,
        status: ProbeStatus,
        confirmed_max: i32,
    },
    BatchCompleted { total: usize, succeeded: usize, elapsed_ms: u64 },
    /// A non-fatal problem (e.g. a snapshot that could not be stored).
    Warning { message: String },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress broadcast channel. 256 events covers a batch of a few
/// dozen items at typical ceilings.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Stamps events with the batch id and sequence number before sending.
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<ProgressSender>,
    batch_id: String,
    seq: u64,
}

impl ProgressEmitter {
    pub fn new(tx: Option<ProgressSender>, batch_id: impl Into<String>) -> Self {
        Self {
            tx,
            batch_id: batch_id.into(),
            seq: 0,
        }
    }

    /// Emitter that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Send an event, ignoring the error raised when nobody is listening.
    pub fn emit(&mut self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                batch_id: self.batch_id.clone(),
                seq: self.seq,
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent {
            batch_id: "batch-1".to_string(),
            seq: 3,
            event: ProgressEventKind::ItemCompleted {
                index: 0,
                total: 2,
                status: ProbeStatus::LimitReached,
                confirmed_max: 3,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ItemCompleted"));
        assert!(json.contains("limit_reached"));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.batch_id, "batch-1");
        assert_eq!(parsed.seq, 3);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut emitter = ProgressEmitter::new(Some(tx), "b");
        emitter.emit(ProgressEventKind::Warning {
            message: "nobody listening".to_string(),
        });
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let (tx, mut rx) = channel();
        let mut emitter = ProgressEmitter::new(Some(tx), "b");
        emitter.emit(ProgressEventKind::BatchStarted { total: 1 });
        emitter.emit(ProgressEventKind::DemandConfirmed { index: 0, demand: 1 });
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert_eq!(rx.try_recv().unwrap().seq, 2);
    }

    #[test]
    fn test_disabled_emitter_is_noop() {
        let mut emitter = ProgressEmitter::disabled();
        emitter.emit(ProgressEventKind::BatchStarted { total: 0 });
        assert_eq!(emitter.seq, 0);
    }
}
