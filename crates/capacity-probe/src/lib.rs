//! Capacity probe: find how many units of an offer remain by raising demand
//! against a live listing until the offer disappears.

pub mod batch;
pub mod diagnostics;
pub mod extract;
pub mod fakes;
pub mod matcher;
pub mod progress;
pub mod prober;
pub mod query;
pub mod source;
pub mod types;

pub use batch::{BatchOrchestrator, BatchProgress};
pub use diagnostics::{DiagnosticsRecorder, DirectorySnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use extract::extract_candidates;
pub use matcher::{IdentityMatcher, MatchOutcome};
pub use prober::{CapacityProber, ProberConfig};
pub use query::build_request;
pub use source::{ContentSource, Observation, SourceProvider};
pub use types::*;
