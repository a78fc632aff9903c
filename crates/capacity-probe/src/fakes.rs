//! Scripted in-memory content source (testing and dry runs).
//!
//! Each `navigate` consumes the next [`ProbeScript`]; step `n` of a script is
//! what the listing looks like at demand `n + 1`. Demand beyond the last step
//! renders an empty listing. Every interaction is recorded in a shared
//! [`SourceLog`] so tests can assert on what the prober actually did.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::source::{ContentSource, Observation, SourceProvider};
use crate::types::{SearchRequest, SourceError, SourceResult};

/// What happens when the listing is rendered at one demand level.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Settles with these blocks.
    Listing(Vec<String>),
    /// The interaction fails.
    Fail(SourceError),
    /// The interaction never settles.
    Hang,
    /// The adapter panics.
    Panic,
}

/// Listing behaviour for one navigated search.
#[derive(Debug, Clone, Default)]
pub struct ProbeScript {
    steps: Vec<ScriptStep>,
}

impl ProbeScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the listing for the next demand level.
    pub fn listing<I, S>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .push(ScriptStep::Listing(blocks.into_iter().map(Into::into).collect()));
        self
    }

    pub fn fail(mut self, error: SourceError) -> Self {
        self.steps.push(ScriptStep::Fail(error));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }

    pub fn panic(mut self) -> Self {
        self.steps.push(ScriptStep::Panic);
        self
    }

    /// `block` is listed (between two unrelated offers) for demand
    /// `1..=levels` and absent afterwards.
    pub fn present_through(block: &str, levels: u32) -> Self {
        (0..levels).fold(Self::new(), |script, _| {
            script.listing([
                "06:15 - 14:40  G3 7650  1 stop  R$ 2.100",
                block,
                "23:55 - 08:05  LA 8190  Nonstop  R$ 3.480",
            ])
        })
    }

    /// Target absent from the first rendering on.
    pub fn absent() -> Self {
        Self::new().listing(["06:15 - 14:40  G3 7650  1 stop  R$ 2.100"])
    }
}

/// Everything the scripted source was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLog {
    pub opens: usize,
    pub closes: usize,
    /// Request keys, one per `navigate`.
    pub navigations: Vec<String>,
    /// Demand level requested by each `increase_demand`.
    pub demand_increases: Vec<u32>,
    pub snapshots: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Hands out a single [`ScriptedSource`] built from its scripts.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<ProbeScript>>,
    log: Arc<Mutex<SourceLog>>,
    open_error: Option<SourceError>,
    snapshots: SnapshotBehaviour,
}

/// How `capture_snapshot` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotBehaviour {
    Capture,
    Fail,
    Hang,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<ProbeScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::new(Mutex::new(SourceLog::default())),
            open_error: None,
            snapshots: SnapshotBehaviour::Capture,
        }
    }

    /// `open` fails with `error`.
    pub fn with_open_error(mut self, error: SourceError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// `capture_snapshot` always fails.
    pub fn with_failing_snapshots(mut self) -> Self {
        self.snapshots = SnapshotBehaviour::Fail;
        self
    }

    /// `capture_snapshot` never resolves.
    pub fn with_hanging_snapshots(mut self) -> Self {
        self.snapshots = SnapshotBehaviour::Hang;
        self
    }

    /// Copy of the interaction log so far.
    pub fn log(&self) -> SourceLog {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    async fn open(&self) -> SourceResult<Box<dyn ContentSource>> {
        lock(&self.log).opens += 1;
        if let Some(ref error) = self.open_error {
            return Err(error.clone());
        }
        let scripts = std::mem::take(&mut *lock(&self.scripts));
        Ok(Box::new(ScriptedSource {
            scripts,
            current: None,
            demand: 0,
            seq: 0,
            listings: HashMap::new(),
            log: Arc::clone(&self.log),
            snapshots: self.snapshots,
        }))
    }
}

/// A session replaying scripted listings.
pub struct ScriptedSource {
    scripts: VecDeque<ProbeScript>,
    current: Option<ProbeScript>,
    demand: u32,
    seq: u64,
    listings: HashMap<u64, Vec<String>>,
    log: Arc<Mutex<SourceLog>>,
    snapshots: SnapshotBehaviour,
}

impl ScriptedSource {
    async fn render(&mut self) -> SourceResult<Observation> {
        let step = self
            .current
            .as_ref()
            .and_then(|script| script.steps.get(self.demand as usize - 1))
            .cloned()
            .unwrap_or(ScriptStep::Listing(Vec::new()));

        match step {
            ScriptStep::Listing(blocks) => {
                self.seq += 1;
                self.listings.insert(self.seq, blocks);
                Ok(Observation {
                    seq: self.seq,
                    demand: self.demand,
                })
            }
            ScriptStep::Fail(error) => Err(error),
            ScriptStep::Hang => std::future::pending::<SourceResult<Observation>>().await,
            ScriptStep::Panic => panic!("scripted adapter panic at demand {}", self.demand),
        }
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn navigate(&mut self, request: &SearchRequest) -> SourceResult<Observation> {
        lock(&self.log).navigations.push(request.key());
        self.current = Some(self.scripts.pop_front().unwrap_or_default());
        self.demand = request.demand.max(1);
        self.render().await
    }

    async fn list_blocks(&mut self, observation: &Observation) -> SourceResult<Vec<String>> {
        self.listings
            .get(&observation.seq)
            .cloned()
            .ok_or_else(|| SourceError::Other(format!("unknown observation {}", observation.seq)))
    }

    async fn increase_demand(&mut self) -> SourceResult<Observation> {
        if self.current.is_none() {
            return Err(SourceError::Other("no search loaded".to_string()));
        }
        self.demand += 1;
        lock(&self.log).demand_increases.push(self.demand);
        self.render().await
    }

    async fn capture_snapshot(&mut self) -> SourceResult<Vec<u8>> {
        lock(&self.log).snapshots += 1;
        match self.snapshots {
            SnapshotBehaviour::Capture => Ok(format!("snapshot-{}", self.seq).into_bytes()),
            SnapshotBehaviour::Fail => Err(SourceError::Script("screenshot failed".to_string())),
            SnapshotBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> SourceResult<()> {
        lock(&self.log).closes += 1;
        Ok(())
    }
}
