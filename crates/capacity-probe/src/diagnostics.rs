//! Diagnostics recorder: keep a snapshot of the source when a probe ends
//! without a positive count, so a human can see what the page looked like.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::source::ContentSource;
use crate::types::{DiagnosticsError, DiagnosticsResult, ProbeStatus, SnapshotRef, SourceError};

/// What a snapshot is about; used for naming.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotContext<'a> {
    /// Canonical request key of the probe.
    pub key: &'a str,
    pub status: ProbeStatus,
}

/// Persists snapshot bytes without interpreting them.
pub trait SnapshotStore: Send + Sync {
    fn store(&self, bytes: &[u8], context: &SnapshotContext<'_>) -> DiagnosticsResult<SnapshotRef>;
}

/// Keeps snapshots in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<Vec<(SnapshotRef, Vec<u8>)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of a stored snapshot.
    pub fn get(&self, id: Uuid) -> Option<Vec<u8>> {
        self.lock()
            .iter()
            .find(|(r, _)| r.id == id)
            .map(|(_, bytes)| bytes.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SnapshotRef, Vec<u8>)>> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn store(&self, bytes: &[u8], _context: &SnapshotContext<'_>) -> DiagnosticsResult<SnapshotRef> {
        let snapshot = SnapshotRef {
            id: Uuid::new_v4(),
            location: None,
            bytes: bytes.len(),
            captured_at: Utc::now(),
        };
        self.lock().push((snapshot.clone(), bytes.to_vec()));
        Ok(snapshot)
    }
}

/// Writes each snapshot to `<dir>/<timestamp>-<key>-<id>.png`.
#[derive(Debug, Clone)]
pub struct DirectorySnapshotStore {
    dir: PathBuf,
}

impl DirectorySnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotStore for DirectorySnapshotStore {
    fn store(&self, bytes: &[u8], context: &SnapshotContext<'_>) -> DiagnosticsResult<SnapshotRef> {
        std::fs::create_dir_all(&self.dir)?;

        let id = Uuid::new_v4();
        let captured_at = Utc::now();
        let name = format!(
            "{}-{}-{}.png",
            captured_at.format("%Y%m%dT%H%M%S"),
            sanitize(context.key),
            id.simple()
        );
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;

        Ok(SnapshotRef {
            id,
            location: Some(path),
            bytes: bytes.len(),
            captured_at,
        })
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Captures and stores snapshots for negative or failed probes.
#[derive(Clone)]
pub struct DiagnosticsRecorder {
    store: Arc<dyn SnapshotStore>,
}

impl DiagnosticsRecorder {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()))
    }

    /// Snapshots are taken for NotFound, TechnicalError, or a zero count.
    pub fn should_record(status: ProbeStatus, confirmed_max: i32) -> bool {
        matches!(status, ProbeStatus::NotFound | ProbeStatus::TechnicalError) || confirmed_max == 0
    }

    /// Capture one snapshot from `source`, waiting at most `timeout` for it.
    /// Never fails: problems are logged and produce `None`.
    pub async fn record(
        &self,
        source: &mut dyn ContentSource,
        context: SnapshotContext<'_>,
        timeout: Duration,
    ) -> Option<SnapshotRef> {
        match self.try_record(source, &context, timeout).await {
            Ok(snapshot) => {
                tracing::info!(
                    key = context.key,
                    status = %context.status,
                    bytes = snapshot.bytes,
                    "diagnostic snapshot stored"
                );
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(key = context.key, "diagnostic snapshot skipped: {e}");
                None
            }
        }
    }

    async fn try_record(
        &self,
        source: &mut dyn ContentSource,
        context: &SnapshotContext<'_>,
        timeout: Duration,
    ) -> DiagnosticsResult<SnapshotRef> {
        let bytes = tokio::time::timeout(timeout, source.capture_snapshot())
            .await
            .map_err(|_| {
                DiagnosticsError::Capture(SourceError::InteractionTimeout {
                    operation: "capture_snapshot",
                    timeout_ms: timeout.as_millis() as u64,
                })
            })??;
        if bytes.is_empty() {
            return Err(DiagnosticsError::Empty);
        }
        self.store.store(&bytes, context)
    }
}
