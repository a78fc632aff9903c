//! Interactive content source abstraction.
//!
//! Defines the `SourceProvider` and `ContentSource` traits that abstract over
//! whatever renders the live offer listing (a browser tab in practice).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{SearchRequest, SourceResult};

/// Handle to one settled rendering of the offer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonically increasing per session.
    pub seq: u64,
    /// Demand level the listing was rendered for.
    pub demand: u32,
}

/// Something that can open a content-source session.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Establish a new session.
    async fn open(&self) -> SourceResult<Box<dyn ContentSource>>;
}

/// A stateful session against the live listing.
#[async_trait]
pub trait ContentSource: Send {
    /// Load the search at the request's demand and return the first settled observation.
    async fn navigate(&mut self, request: &SearchRequest) -> SourceResult<Observation>;

    /// Raw text of each rendered offer block for `observation`.
    async fn list_blocks(&mut self, observation: &Observation) -> SourceResult<Vec<String>>;

    /// Add one unit of demand and return the next settled observation.
    async fn increase_demand(&mut self) -> SourceResult<Observation>;

    /// Best-effort snapshot of the current state (e.g. a PNG screenshot).
    async fn capture_snapshot(&mut self) -> SourceResult<Vec<u8>>;

    /// Release the session.
    async fn close(self: Box<Self>) -> SourceResult<()>;
}
