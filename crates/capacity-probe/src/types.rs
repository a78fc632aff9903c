//! Core data types for offer queries, candidates, probe state and results.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Reported in place of a count when a probe failed technically.
pub const TECHNICAL_ERROR_SENTINEL: i32 = -1;

/// Cabin class requested in a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::PremiumEconomy => "premium_economy",
            Self::Business => "business",
            Self::First => "first",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-way or round-trip search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    #[default]
    OneWay,
    RoundTrip,
}

impl TripType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneWay => "one_way",
            Self::RoundTrip => "round_trip",
        }
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The search an operator wants probed. Validated by [`crate::query::build_request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferQuery {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub cabin: CabinClass,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
}

impl OfferQuery {
    pub fn one_way(origin: &str, destination: &str, date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            date,
            cabin: CabinClass::Economy,
            trip_type: TripType::OneWay,
            return_date: None,
        }
    }

    pub fn with_cabin(mut self, cabin: CabinClass) -> Self {
        self.cabin = cabin;
        self
    }

    /// Short human label, e.g. `GRU-MIA 2026-11-02`.
    pub fn label(&self) -> String {
        format!("{}-{} {}", self.origin, self.destination, self.date)
    }
}

/// Canonical, validated request description handed to a content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub cabin: CabinClass,
    pub trip_type: TripType,
    /// Demand level the first observation is taken at.
    pub demand: u32,
}

impl SearchRequest {
    /// Stable key identifying the search independent of demand.
    pub fn key(&self) -> String {
        let mut key = format!(
            "{}-{}/{}/{}/{}",
            self.origin, self.destination, self.date, self.cabin, self.trip_type
        );
        if let Some(ret) = self.return_date {
            key.push_str(&format!("/{ret}"));
        }
        key
    }

    /// Named parameters for templated source adapters.
    pub fn params(&self, demand: u32) -> Vec<(&'static str, String)> {
        vec![
            ("origin", self.origin.clone()),
            ("destination", self.destination.clone()),
            ("date", self.date.to_string()),
            (
                "return_date",
                self.return_date.map(|d| d.to_string()).unwrap_or_default(),
            ),
            ("cabin", self.cabin.to_string()),
            ("trip_type", self.trip_type.to_string()),
            ("demand", demand.to_string()),
        ]
    }
}

/// Coarse stop-count category parsed from an offer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCategory {
    Direct,
    OneStop,
    MultiStop,
}

/// A carrier + flight number guess found in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightCode {
    pub carrier: String,
    pub number: String,
}

impl fmt::Display for FlightCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.carrier, self.number)
    }
}

/// A structured view of one rendered offer block.
///
/// Only valid for the observation it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCandidate {
    /// Index of the block in the rendered listing.
    pub position: usize,
    pub raw: String,
    /// At most two time-of-day tokens (departure, arrival).
    pub times: Vec<String>,
    pub price: Option<String>,
    pub duration: Option<String>,
    pub stops: Option<StopCategory>,
    /// Every flight-code-like token in the block, in text order.
    pub flight_codes: Vec<FlightCode>,
}

impl ResultCandidate {
    pub fn carrier_guess(&self) -> Option<&str> {
        self.flight_codes.first().map(|c| c.carrier.as_str())
    }

    pub fn flight_number_guess(&self) -> Option<&str> {
        self.flight_codes.first().map(|c| c.number.as_str())
    }
}

/// Which offer a probe is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetIdentity {
    Flight { carrier: String, number: String },
    Anchor { text: String },
}

impl TargetIdentity {
    pub fn flight(carrier: &str, number: &str) -> Self {
        Self::Flight {
            carrier: carrier.to_string(),
            number: number.to_string(),
        }
    }

    pub fn anchor(text: &str) -> Self {
        Self::Anchor {
            text: text.to_string(),
        }
    }

    /// Parse operator input: `AA954` / `AA 954` become a flight, anything
    /// else is taken verbatim as an anchor.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

        if compact.is_ascii() {
            for carrier_len in [2, 3] {
                if compact.len() <= carrier_len {
                    continue;
                }
                let (carrier, number) = compact.split_at(carrier_len);
                if is_carrier_code(carrier)
                    && number.len() <= 4
                    && number.chars().all(|c| c.is_ascii_digit())
                {
                    return Self::flight(&carrier.to_ascii_uppercase(), number);
                }
            }
        }
        Self::anchor(trimmed)
    }

    /// Reject identities that can never match anything.
    pub fn validate(&self) -> Result<(), ProbeError> {
        match self {
            Self::Flight { carrier, number } => {
                if !is_carrier_code(carrier) {
                    return Err(ProbeError::QueryMalformed(format!(
                        "invalid carrier code: {carrier:?}"
                    )));
                }
                if number.is_empty() || number.len() > 4 || !number.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(ProbeError::QueryMalformed(format!(
                        "invalid flight number: {number:?}"
                    )));
                }
                Ok(())
            }
            Self::Anchor { text } => {
                if text.trim().is_empty() {
                    return Err(ProbeError::QueryMalformed("empty anchor text".to_string()));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flight { carrier, number } => write!(f, "{carrier}{number}"),
            Self::Anchor { text } => write!(f, "\"{text}\""),
        }
    }
}

/// IATA (2 chars, at least one letter) or ICAO (3 letters) designator.
pub(crate) fn is_carrier_code(code: &str) -> bool {
    match code.len() {
        2 => {
            code.chars().all(|c| c.is_ascii_alphanumeric())
                && code.chars().any(|c| c.is_ascii_alphabetic())
        }
        3 => code.chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Lifecycle of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Searching,
    Found,
    Probing,
    LimitReached,
    MaxCapacityVerified,
    NotFound,
    TechnicalError,
}

impl ProbeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::LimitReached | Self::MaxCapacityVerified | Self::NotFound | Self::TechnicalError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Found => "found",
            Self::Probing => "probing",
            Self::LimitReached => "limit_reached",
            Self::MaxCapacityVerified => "max_capacity_verified",
            Self::NotFound => "not_found",
            Self::TechnicalError => "technical_error",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state owned by the prober for the lifetime of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeState {
    pub current_demand: u32,
    pub confirmed_max: u32,
    pub status: ProbeStatus,
    /// Demand levels observed with the target present, in probe order.
    pub observed_levels: Vec<u32>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self {
            current_demand: 1,
            confirmed_max: 0,
            status: ProbeStatus::Searching,
            observed_levels: Vec::new(),
        }
    }

    /// Record the target as present at `level`. Levels must arrive as
    /// `confirmed_max + 1`, which keeps the confirmed range contiguous.
    pub fn confirm(&mut self, level: u32) -> Result<(), ProbeError> {
        if level != self.confirmed_max + 1 {
            return Err(ProbeError::Inconsistent(format!(
                "demand {level} confirmed after {}",
                self.confirmed_max
            )));
        }
        self.confirmed_max = level;
        self.current_demand = level;
        self.observed_levels.push(level);
        self.status = if level == 1 {
            ProbeStatus::Found
        } else {
            ProbeStatus::Probing
        };
        Ok(())
    }
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of why a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    QueryMalformed,
    InteractionTimeout,
    NavigationFailed,
    TechnicalError,
}

/// Where a diagnostic snapshot ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: uuid::Uuid,
    /// File path for directory stores; `None` for in-memory stores.
    pub location: Option<PathBuf>,
    pub bytes: usize,
    pub captured_at: DateTime<Utc>,
}

/// Terminal outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub index: usize,
    pub query: OfferQuery,
    pub target: TargetIdentity,
    pub status: ProbeStatus,
    /// Highest demand verified present; [`TECHNICAL_ERROR_SENTINEL`] on failure.
    pub confirmed_max: i32,
    pub observed_levels: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<SnapshotRef>,
    pub message: String,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    /// Result for an item that failed before or during probing.
    pub fn failed(index: usize, query: OfferQuery, target: TargetIdentity, error: &ProbeError) -> Self {
        Self {
            index,
            query,
            target,
            status: ProbeStatus::TechnicalError,
            confirmed_max: TECHNICAL_ERROR_SENTINEL,
            observed_levels: Vec::new(),
            failure: Some(error.kind()),
            matched_by: None,
            diagnostic: None,
            message: error.to_string(),
            elapsed_ms: 0,
        }
    }

    /// A positive count was established.
    pub fn is_success(&self) -> bool {
        self.confirmed_max > 0
    }

    /// Rows with a snapshot attached are meant for a human to look at.
    pub fn needs_review(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// One unit of work in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub query: OfferQuery,
    pub target: TargetIdentity,
}

/// Batch-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Highest demand level to test.
    pub ceiling: u32,
    /// Overrides every item's cabin when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<CabinClass>,
    /// Overrides every item's trip type when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_type: Option<TripType>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            ceiling: 9,
            cabin: None,
            trip_type: None,
        }
    }
}

/// An ordered list of probes to run against one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub items: Vec<BatchItem>,
    #[serde(flatten)]
    pub config: BatchConfig,
}

impl BatchJob {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            items: Vec::new(),
            config,
        }
    }

    pub fn push(&mut self, query: OfferQuery, target: TargetIdentity) {
        self.items.push(BatchItem { query, target });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Errors raised by a content source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    InteractionTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Session closed")]
    Closed,

    #[error("Source error: {0}")]
    Other(String),
}

/// Errors that end a probe.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Malformed query: {0}")]
    QueryMalformed(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Inconsistent observation: {0}")]
    Inconsistent(String),
}

impl ProbeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::QueryMalformed(_) => FailureKind::QueryMalformed,
            Self::Source(SourceError::InteractionTimeout { .. }) => FailureKind::InteractionTimeout,
            Self::Source(SourceError::NavigationFailed(_)) => FailureKind::NavigationFailed,
            Self::Source(_) | Self::Inconsistent(_) => FailureKind::TechnicalError,
        }
    }
}

/// Errors from snapshot capture or storage.
#[derive(thiserror::Error, Debug)]
pub enum DiagnosticsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture failed: {0}")]
    Capture(#[from] SourceError),

    #[error("Empty snapshot")]
    Empty,
}

pub type SourceResult<T> = Result<T, SourceError>;

pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flight_identity() {
        assert_eq!(TargetIdentity::parse("AA954"), TargetIdentity::flight("AA", "954"));
        assert_eq!(TargetIdentity::parse(" aa 954 "), TargetIdentity::flight("AA", "954"));
        assert_eq!(TargetIdentity::parse("G31234"), TargetIdentity::flight("G3", "1234"));
        assert_eq!(TargetIdentity::parse("TAM3050"), TargetIdentity::flight("TAM", "3050"));
    }

    #[test]
    fn test_parse_anchor_identity() {
        assert_eq!(TargetIdentity::parse("10:35"), TargetIdentity::anchor("10:35"));
        assert_eq!(TargetIdentity::parse("954"), TargetIdentity::anchor("954"));
        assert_eq!(TargetIdentity::parse("AA95412"), TargetIdentity::anchor("AA95412"));
    }

    #[test]
    fn test_validate_identity() {
        assert!(TargetIdentity::flight("AA", "954").validate().is_ok());
        assert!(TargetIdentity::flight("A", "954").validate().is_err());
        assert!(TargetIdentity::flight("AA", "95x").validate().is_err());
        assert!(TargetIdentity::anchor("  ").validate().is_err());
    }

    #[test]
    fn test_probe_state_contiguity() {
        let mut state = ProbeState::new();
        state.confirm(1).unwrap();
        assert_eq!(state.status, ProbeStatus::Found);
        state.confirm(2).unwrap();
        assert_eq!(state.status, ProbeStatus::Probing);
        assert!(state.confirm(4).is_err());
        assert_eq!(state.confirmed_max, 2);
        assert_eq!(state.observed_levels, vec![1, 2]);
    }

    #[test]
    fn test_failure_kind_mapping() {
        let timeout = ProbeError::from(SourceError::InteractionTimeout {
            operation: "navigate",
            timeout_ms: 10,
        });
        assert_eq!(timeout.kind(), FailureKind::InteractionTimeout);
        let nav = ProbeError::from(SourceError::NavigationFailed("dns".into()));
        assert_eq!(nav.kind(), FailureKind::NavigationFailed);
        assert_eq!(
            ProbeError::Inconsistent("demand 3 after 1".into()).kind(),
            FailureKind::TechnicalError
        );
        assert_eq!(
            ProbeError::from(SourceError::Script("not an array".into())).kind(),
            FailureKind::TechnicalError
        );
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ProbeStatus::Probing.is_terminal());
        assert!(ProbeStatus::NotFound.is_terminal());
        assert_eq!(ProbeStatus::MaxCapacityVerified.to_string(), "max_capacity_verified");
    }

    #[test]
    fn test_batch_job_json() {
        let json = r#"{
            "ceiling": 5,
            "cabin": "business",
            "items": [
                {"query": {"origin": "GRU", "destination": "MIA", "date": "2030-01-10"},
                 "target": {"kind": "flight", "carrier": "AA", "number": "954"}}
            ]
        }"#;
        let job: BatchJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.config.ceiling, 5);
        assert_eq!(job.config.cabin, Some(CabinClass::Business));
        assert_eq!(job.items[0].query.trip_type, TripType::OneWay);
        assert_eq!(job.items[0].target, TargetIdentity::flight("AA", "954"));
    }
}
