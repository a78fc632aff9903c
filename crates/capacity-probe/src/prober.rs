//! Capacity prober: the state machine that raises demand one unit at a time
//! and re-observes the listing until the target offer disappears or the
//! ceiling is reached.
//!
//! ```text
//! Searching ──match──▶ Found(1) ──▶ Probing(n) ──match──▶ Probing(n+1)
//!     │                                  │ no match        │ n+1 == ceiling
//!     ▼                                  ▼                 ▼
//!  NotFound                         LimitReached   MaxCapacityVerified
//!
//! any source failure or timeout ──▶ TechnicalError
//! ```
//!
//! Every observation is re-extracted and re-matched from scratch; nothing is
//! carried over from the previous listing.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::diagnostics::{DiagnosticsRecorder, SnapshotContext};
use crate::extract::extract_candidates;
use crate::matcher::{IdentityMatcher, MatchOutcome};
use crate::progress::{ProgressEmitter, ProgressEventKind};
use crate::query::build_request;
use crate::source::{ContentSource, Observation};
use crate::types::{
    OfferQuery, ProbeError, ProbeResult, ProbeState, ProbeStatus, SearchRequest, SourceError,
    SourceResult, TargetIdentity, TECHNICAL_ERROR_SENTINEL,
};

/// Default bound on a single source interaction, settle wait included.
const DEFAULT_INTERACTION_TIMEOUT: Duration = Duration::from_secs(90);

/// Default highest demand level tested.
pub const DEFAULT_CEILING: u32 = 9;

/// Tunables for one prober.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Highest demand level to test; values below 1 are treated as 1.
    pub ceiling: u32,
    /// Upper bound on each source call.
    pub interaction_timeout: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            interaction_timeout: DEFAULT_INTERACTION_TIMEOUT,
        }
    }
}

impl ProberConfig {
    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            ceiling,
            ..Self::default()
        }
    }
}

/// Everything one probe needs besides the session.
pub struct ProbeTask<'a> {
    pub index: usize,
    pub query: &'a OfferQuery,
    pub target: &'a TargetIdentity,
    pub request: &'a SearchRequest,
    pub matcher: &'a IdentityMatcher,
}

/// Runs probes against a session. Holds no per-probe state.
#[derive(Clone)]
pub struct CapacityProber {
    config: ProberConfig,
    diagnostics: DiagnosticsRecorder,
}

impl CapacityProber {
    pub fn new(config: ProberConfig, diagnostics: DiagnosticsRecorder) -> Self {
        Self {
            config,
            diagnostics,
        }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    fn ceiling(&self) -> u32 {
        self.config.ceiling.max(1)
    }

    /// Validate `query` and `target`, then probe. Malformed input yields a
    /// failed result without touching the source.
    pub async fn run(
        &self,
        source: &mut dyn ContentSource,
        index: usize,
        query: &OfferQuery,
        target: &TargetIdentity,
        today: NaiveDate,
        progress: &mut ProgressEmitter,
    ) -> ProbeResult {
        let prepared = build_request(query, today)
            .and_then(|request| IdentityMatcher::for_target(target).map(|m| (request, m)));

        let (request, matcher) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(index, query = %query.label(), target = %target, "rejected: {e}");
                return ProbeResult::failed(index, query.clone(), target.clone(), &e);
            }
        };

        let task = ProbeTask {
            index,
            query,
            target,
            request: &request,
            matcher: &matcher,
        };
        self.probe(source, task, progress).await
    }

    /// Drive one probe to a terminal result.
    pub async fn probe(
        &self,
        source: &mut dyn ContentSource,
        task: ProbeTask<'_>,
        progress: &mut ProgressEmitter,
    ) -> ProbeResult {
        let started = Instant::now();
        let mut state = ProbeState::new();
        let key = task.request.key();

        let outcome = self.drive(source, &task, &mut state, progress).await;

        let (confirmed_max, failure, matched_by, message) = match outcome {
            Ok(matched_by) => {
                let confirmed = state.confirmed_max as i32;
                let message = self.describe(&state, task.target);
                (confirmed, None, matched_by, message)
            }
            Err(e) => {
                state.status = ProbeStatus::TechnicalError;
                tracing::warn!(index = task.index, key = %key, "probe failed: {e}");
                (TECHNICAL_ERROR_SENTINEL, Some(e.kind()), None, e.to_string())
            }
        };

        tracing::info!(
            index = task.index,
            key = %key,
            target = %task.target,
            status = %state.status,
            confirmed_max,
            "probe finished"
        );

        let diagnostic = if DiagnosticsRecorder::should_record(state.status, confirmed_max) {
            let context = SnapshotContext {
                key: &key,
                status: state.status,
            };
            let snapshot = self
                .diagnostics
                .record(source, context, self.config.interaction_timeout)
                .await;
            if snapshot.is_none() {
                progress.emit(ProgressEventKind::Warning {
                    message: format!("no diagnostic snapshot for item {} ({key})", task.index),
                });
            }
            snapshot
        } else {
            None
        };

        ProbeResult {
            index: task.index,
            query: task.query.clone(),
            target: task.target.clone(),
            status: state.status,
            confirmed_max,
            observed_levels: state.observed_levels,
            failure,
            matched_by,
            diagnostic,
            message,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Walk the state machine. Returns the strategy that first found the
    /// target, if any; `state` holds the terminal status on `Ok`.
    async fn drive(
        &self,
        source: &mut dyn ContentSource,
        task: &ProbeTask<'_>,
        state: &mut ProbeState,
        progress: &mut ProgressEmitter,
    ) -> Result<Option<String>, ProbeError> {
        let ceiling = self.ceiling();

        let observation = self
            .bounded("navigate", source.navigate(task.request))
            .await?;
        expect_demand(&observation, task.request.demand)?;

        let Some(found) = self.observe(source, &observation, task.matcher).await? else {
            state.status = ProbeStatus::NotFound;
            return Ok(None);
        };
        state.confirm(1)?;
        progress.emit(ProgressEventKind::DemandConfirmed {
            index: task.index,
            demand: 1,
        });
        let matched_by = Some(found.strategy.to_string());

        while state.confirmed_max < ceiling {
            let next = state.confirmed_max + 1;
            state.current_demand = next;
            state.status = ProbeStatus::Probing;

            let observation = self
                .bounded("increase_demand", source.increase_demand())
                .await?;
            expect_demand(&observation, next)?;

            if self.observe(source, &observation, task.matcher).await?.is_none() {
                state.status = ProbeStatus::LimitReached;
                return Ok(matched_by);
            }
            state.confirm(next)?;
            progress.emit(ProgressEventKind::DemandConfirmed {
                index: task.index,
                demand: next,
            });
        }

        state.status = ProbeStatus::MaxCapacityVerified;
        Ok(matched_by)
    }

    /// Extract and match one observation.
    async fn observe(
        &self,
        source: &mut dyn ContentSource,
        observation: &Observation,
        matcher: &IdentityMatcher,
    ) -> Result<Option<MatchOutcome>, ProbeError> {
        let blocks = self
            .bounded("list_blocks", source.list_blocks(observation))
            .await?;
        let found = matcher.find(extract_candidates(&blocks));

        tracing::debug!(
            seq = observation.seq,
            demand = observation.demand,
            blocks = blocks.len(),
            matched = ?found.as_ref().map(|m| m.candidate.position),
            "observation"
        );
        Ok(found)
    }

    /// Apply the interaction timeout to one source call.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ProbeError>
    where
        F: Future<Output = SourceResult<T>>,
    {
        let timeout = self.config.interaction_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(ProbeError::from),
            Err(_) => Err(ProbeError::Source(SourceError::InteractionTimeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })),
        }
    }

    fn describe(&self, state: &ProbeState, target: &TargetIdentity) -> String {
        match state.status {
            ProbeStatus::NotFound => format!("{target} not listed at demand 1"),
            ProbeStatus::LimitReached => format!(
                "{target} listed up to demand {}, gone at {}",
                state.confirmed_max,
                state.confirmed_max + 1
            ),
            ProbeStatus::MaxCapacityVerified => format!(
                "{target} still listed at ceiling {} (at least {} available)",
                state.confirmed_max, state.confirmed_max
            ),
            other => format!("{target} stopped in state {other}"),
        }
    }
}

/// Observations must arrive at the demand level the prober asked for.
fn expect_demand(observation: &Observation, expected: u32) -> Result<(), ProbeError> {
    if observation.demand != expected {
        return Err(ProbeError::Inconsistent(format!(
            "expected demand {expected}, source rendered {}",
            observation.demand
        )));
    }
    Ok(())
}
