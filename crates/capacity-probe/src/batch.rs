//! Batch orchestrator: run a list of probes, in order, over one session.
//!
//! The orchestrator owns the content-source session for the whole batch and
//! closes it on every exit path, including a panic inside a probe. A failing
//! item never stops the batch; the result list always has one entry per
//! input item, in input order.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::FutureExt;

use crate::diagnostics::DiagnosticsRecorder;
use crate::progress::{ProgressEmitter, ProgressEventKind, ProgressSender};
use crate::prober::{CapacityProber, ProberConfig};
use crate::source::{ContentSource, SourceProvider};
use crate::types::{
    BatchConfig, BatchItem, BatchJob, OfferQuery, ProbeError, ProbeResult, ProbeStatus, TripType,
};

/// Reported to the caller after each item completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub status: ProbeStatus,
    pub confirmed_max: i32,
}

impl BatchProgress {
    /// `"(index+1)/total"`, e.g. `3/5`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.index + 1, self.total)
    }
}

/// Callback invoked once per completed item.
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(&BatchProgress) + Send);

/// Sequences probes across a batch job.
#[derive(Clone)]
pub struct BatchOrchestrator {
    diagnostics: DiagnosticsRecorder,
    interaction_timeout: Duration,
    progress_tx: Option<ProgressSender>,
    today: Option<NaiveDate>,
}

impl BatchOrchestrator {
    pub fn new(diagnostics: DiagnosticsRecorder) -> Self {
        Self {
            diagnostics,
            interaction_timeout: ProberConfig::default().interaction_timeout,
            progress_tx: None,
            today: None,
        }
    }

    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.interaction_timeout = timeout;
        self
    }

    /// Also broadcast [`crate::progress::ProgressEvent`]s on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Fix the date used to reject past searches (defaults to the local date).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Run every item of `job` and return one result per item, in order.
    pub async fn submit_batch(
        &self,
        provider: &dyn SourceProvider,
        job: BatchJob,
        mut on_progress: Option<ProgressCallback<'_>>,
    ) -> Vec<ProbeResult> {
        let started = Instant::now();
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let total = job.items.len();
        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut emitter = ProgressEmitter::new(self.progress_tx.clone(), batch_id.as_str());

        tracing::info!(batch = %batch_id, items = total, ceiling = job.config.ceiling, "batch started");
        emitter.emit(ProgressEventKind::BatchStarted { total });

        let items: Vec<BatchItem> = job
            .items
            .iter()
            .map(|item| BatchItem {
                query: effective_query(&item.query, &job.config),
                target: item.target.clone(),
            })
            .collect();

        let prober = CapacityProber::new(
            ProberConfig {
                ceiling: job.config.ceiling.max(1),
                interaction_timeout: self.interaction_timeout,
            },
            self.diagnostics.clone(),
        );

        let results = match provider.open().await {
            Ok(mut source) => {
                let run = AssertUnwindSafe(self.run_items(
                    &prober,
                    source.as_mut(),
                    &items,
                    today,
                    &mut emitter,
                    &mut on_progress,
                ))
                .catch_unwind()
                .await;

                if let Err(e) = source.close().await {
                    tracing::warn!(batch = %batch_id, "closing session failed: {e}");
                    emitter.emit(ProgressEventKind::Warning {
                        message: format!("closing session failed: {e}"),
                    });
                }

                match run {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Err(e) => {
                tracing::error!(batch = %batch_id, "could not open session: {e}");
                emitter.emit(ProgressEventKind::Warning {
                    message: format!("could not open session: {e}"),
                });
                let error = ProbeError::from(e);
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let result = ProbeResult::failed(index, item.query, item.target, &error);
                        report(index, total, &result, &mut emitter, &mut on_progress);
                        result
                    })
                    .collect()
            }
        };

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(batch = %batch_id, items = total, succeeded, elapsed_ms, "batch finished");
        emitter.emit(ProgressEventKind::BatchCompleted {
            total,
            succeeded,
            elapsed_ms,
        });

        results
    }

    async fn run_items(
        &self,
        prober: &CapacityProber,
        source: &mut dyn ContentSource,
        items: &[BatchItem],
        today: NaiveDate,
        emitter: &mut ProgressEmitter,
        on_progress: &mut Option<ProgressCallback<'_>>,
    ) -> Vec<ProbeResult> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            emitter.emit(ProgressEventKind::ItemStarted {
                index,
                total,
                label: format!("{} {}", item.query.label(), item.target),
            });

            let result = prober
                .run(source, index, &item.query, &item.target, today, emitter)
                .await;
            report(index, total, &result, emitter, on_progress);
            results.push(result);
        }

        results
    }
}

fn report(
    index: usize,
    total: usize,
    result: &ProbeResult,
    emitter: &mut ProgressEmitter,
    on_progress: &mut Option<ProgressCallback<'_>>,
) {
    let progress = BatchProgress {
        index,
        total,
        status: result.status,
        confirmed_max: result.confirmed_max,
    };
    tracing::info!(
        progress = %progress.label(),
        status = %result.status,
        confirmed_max = result.confirmed_max,
        "item done"
    );
    emitter.emit(ProgressEventKind::ItemCompleted {
        index,
        total,
        status: result.status,
        confirmed_max: result.confirmed_max,
    });
    if let Some(callback) = on_progress.as_deref_mut() {
        callback(&progress);
    }
}

/// `query` with the batch-level cabin and trip type applied.
pub fn effective_query(query: &OfferQuery, config: &BatchConfig) -> OfferQuery {
    let mut query = query.clone();
    if let Some(cabin) = config.cabin {
        query.cabin = cabin;
    }
    if let Some(trip_type) = config.trip_type {
        query.trip_type = trip_type;
        if trip_type == TripType::OneWay {
            query.return_date = None;
        }
    }
    query
}
