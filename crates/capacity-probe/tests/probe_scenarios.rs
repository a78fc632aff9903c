//! Prober scenarios driven through the scripted content source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use capacity_probe::fakes::{ProbeScript, ScriptedProvider};
use capacity_probe::progress::{self, ProgressEmitter, ProgressEventKind};
use capacity_probe::*;

// ─────────────────────── helpers ───────────────────────

const AA954: &str = "22:15 - 06:40+1  AA 954  Nonstop  9h 25m  R$ 4.312";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

fn query() -> OfferQuery {
    OfferQuery::one_way("GRU", "MIA", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap())
}

fn prober(ceiling: u32, store: Arc<MemorySnapshotStore>) -> CapacityProber {
    CapacityProber::new(
        ProberConfig {
            ceiling,
            interaction_timeout: Duration::from_millis(200),
        },
        DiagnosticsRecorder::new(store),
    )
}

/// Open a session from `provider`, run one probe, close the session.
async fn probe_once(
    provider: &ScriptedProvider,
    prober: &CapacityProber,
    target: TargetIdentity,
) -> ProbeResult {
    let mut source = provider.open().await.unwrap();
    let result = prober
        .run(
            source.as_mut(),
            0,
            &query(),
            &target,
            today(),
            &mut ProgressEmitter::disabled(),
        )
        .await;
    source.close().await.unwrap();
    result
}

// ─────────────────────── scenarios ───────────────────────

#[tokio::test]
async fn test_limit_reached_after_three() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::present_through(AA954, 3)]);

    let result = probe_once(&provider, &prober(5, store.clone()), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::LimitReached);
    assert_eq!(result.confirmed_max, 3);
    assert_eq!(result.observed_levels, vec![1, 2, 3]);
    assert_eq!(result.matched_by.as_deref(), Some("flight_code"));
    assert!(result.diagnostic.is_none());
    assert!(result.failure.is_none());

    let log = provider.log();
    assert_eq!(log.demand_increases, vec![2, 3, 4]);
    assert_eq!(log.snapshots, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_absent_at_one_is_not_found_with_snapshot() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::absent()]);

    let result = probe_once(&provider, &prober(9, store.clone()), TargetIdentity::flight("AA", "930")).await;

    assert_eq!(result.status, ProbeStatus::NotFound);
    assert_eq!(result.confirmed_max, 0);
    assert!(result.observed_levels.is_empty());

    let snapshot = result.diagnostic.expect("snapshot attached");
    assert_eq!(store.get(snapshot.id).unwrap(), b"snapshot-1");

    let log = provider.log();
    assert!(log.demand_increases.is_empty(), "probing loop must not run");
    assert_eq!(log.snapshots, 1);
}

#[tokio::test]
async fn test_ceiling_saturation_never_exceeds_ceiling() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::present_through(AA954, 20)]);

    let result = probe_once(&provider, &prober(4, store), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::MaxCapacityVerified);
    assert_eq!(result.confirmed_max, 4);
    assert_eq!(result.observed_levels, vec![1, 2, 3, 4]);
    assert_eq!(provider.log().demand_increases, vec![2, 3, 4]);
}

#[tokio::test]
async fn test_ceiling_of_one() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::present_through(AA954, 5)]);

    let result = probe_once(&provider, &prober(1, store), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::MaxCapacityVerified);
    assert_eq!(result.confirmed_max, 1);
    assert!(provider.log().demand_increases.is_empty());
}

#[tokio::test]
async fn test_reordered_listing_is_rematched_each_time() {
    let store = Arc::new(MemorySnapshotStore::new());
    let script = ProbeScript::new()
        .listing([AA954, "08:00 AA 9540 $999"])
        .listing(["08:00 AA 9540 $999", "Sponsored", AA954])
        .listing(["08:00 AA 9540 $999"]);
    let provider = ScriptedProvider::new(vec![script]);

    let result = probe_once(&provider, &prober(6, store), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::LimitReached);
    assert_eq!(result.confirmed_max, 2);
}

#[tokio::test]
async fn test_anchor_target() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::present_through(AA954, 2)]);

    let result = probe_once(&provider, &prober(5, store), TargetIdentity::anchor("22:15")).await;

    assert_eq!(result.status, ProbeStatus::LimitReached);
    assert_eq!(result.confirmed_max, 2);
    assert_eq!(result.matched_by.as_deref(), Some("anchor"));
}

#[tokio::test]
async fn test_failure_mid_probe_is_technical_error() {
    let store = Arc::new(MemorySnapshotStore::new());
    let script = ProbeScript::new()
        .listing([AA954])
        .listing([AA954])
        .fail(SourceError::NavigationFailed("net::ERR_CONNECTION_RESET".into()));
    let provider = ScriptedProvider::new(vec![script]);

    let result = probe_once(&provider, &prober(5, store.clone()), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::TechnicalError);
    assert_eq!(result.confirmed_max, -1);
    assert_eq!(result.failure, Some(FailureKind::NavigationFailed));
    assert!(result.diagnostic.is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_hanging_source_times_out() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::new().listing([AA954]).hang()]);

    let result = probe_once(&provider, &prober(5, store), TargetIdentity::flight("AA", "954")).await;

    assert_eq!(result.status, ProbeStatus::TechnicalError);
    assert_eq!(result.confirmed_max, -1);
    assert_eq!(result.failure, Some(FailureKind::InteractionTimeout));
    assert!(result.message.contains("increase_demand"), "{}", result.message);
}

#[tokio::test]
async fn test_snapshot_failure_is_not_fatal() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::absent()]).with_failing_snapshots();

    let result = probe_once(&provider, &prober(9, store.clone()), TargetIdentity::flight("AA", "930")).await;

    assert_eq!(result.status, ProbeStatus::NotFound);
    assert!(result.diagnostic.is_none());
    assert_eq!(provider.log().snapshots, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_hanging_snapshot_after_hang_still_returns() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::new().hang()]).with_hanging_snapshots();
    let prober = prober(5, store.clone());

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        probe_once(&provider, &prober, TargetIdentity::flight("AA", "954")),
    )
    .await
    .expect("probe must finish within its interaction bounds");

    assert_eq!(result.status, ProbeStatus::TechnicalError);
    assert_eq!(result.confirmed_max, -1);
    assert_eq!(result.failure, Some(FailureKind::InteractionTimeout));
    assert!(result.diagnostic.is_none());
    assert_eq!(provider.log().snapshots, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_hanging_snapshot_keeps_not_found() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::absent()]).with_hanging_snapshots();
    let (tx, mut rx) = progress::channel();
    let mut emitter = ProgressEmitter::new(Some(tx), "b");

    let mut source = provider.open().await.unwrap();
    let result = prober(9, store)
        .run(
            source.as_mut(),
            0,
            &query(),
            &TargetIdentity::flight("AA", "930"),
            today(),
            &mut emitter,
        )
        .await;
    source.close().await.unwrap();

    assert_eq!(result.status, ProbeStatus::NotFound);
    assert_eq!(result.confirmed_max, 0);
    assert!(result.diagnostic.is_none());
    let warned = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|e| matches!(e.event, ProgressEventKind::Warning { .. }));
    assert!(warned, "missing snapshot should be reported as a warning");
}

#[tokio::test]
async fn test_malformed_query_touches_nothing() {
    let store = Arc::new(MemorySnapshotStore::new());
    let provider = ScriptedProvider::new(vec![ProbeScript::present_through(AA954, 3)]);
    let mut source = provider.open().await.unwrap();

    let past = OfferQuery::one_way("GRU", "MIA", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    let result = prober(5, store)
        .run(
            source.as_mut(),
            0,
            &past,
            &TargetIdentity::flight("AA", "954"),
            today(),
            &mut ProgressEmitter::disabled(),
        )
        .await;

    assert_eq!(result.status, ProbeStatus::TechnicalError);
    assert_eq!(result.confirmed_max, -1);
    assert_eq!(result.failure, Some(FailureKind::QueryMalformed));
    assert!(result.diagnostic.is_none());
    let log = provider.log();
    assert!(log.navigations.is_empty());
    assert_eq!(log.snapshots, 0);
}

// ─────────────────────── ordering guard ───────────────────────

/// Source that skips a demand level on every increase.
struct SkippingSource {
    demand: u32,
    seq: u64,
}

#[async_trait]
impl ContentSource for SkippingSource {
    async fn navigate(&mut self, request: &SearchRequest) -> SourceResult<Observation> {
        self.demand = request.demand;
        self.seq += 1;
        Ok(Observation { seq: self.seq, demand: self.demand })
    }

    async fn list_blocks(&mut self, _observation: &Observation) -> SourceResult<Vec<String>> {
        Ok(vec![AA954.to_string()])
    }

    async fn increase_demand(&mut self) -> SourceResult<Observation> {
        self.demand += 2;
        self.seq += 1;
        Ok(Observation { seq: self.seq, demand: self.demand })
    }

    async fn capture_snapshot(&mut self) -> SourceResult<Vec<u8>> {
        Ok(b"png".to_vec())
    }

    async fn close(self: Box<Self>) -> SourceResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_skipped_demand_level_is_rejected() {
    let store = Arc::new(MemorySnapshotStore::new());
    let mut source = SkippingSource { demand: 0, seq: 0 };

    let result = prober(5, store)
        .run(
            &mut source,
            0,
            &query(),
            &TargetIdentity::flight("AA", "954"),
            today(),
            &mut ProgressEmitter::disabled(),
        )
        .await;

    assert_eq!(result.status, ProbeStatus::TechnicalError);
    assert_eq!(result.confirmed_max, -1);
    assert!(result.message.contains("expected demand 2"), "{}", result.message);
}
