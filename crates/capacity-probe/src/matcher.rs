//! Identity matcher: pick the candidate that is the offer being probed.
//!
//! A target is turned into an ordered list of [`MatchStrategy`] values. The
//! listing is walked in order and each candidate is tested against the
//! strategies in priority order; the first candidate any strategy accepts
//! wins. Several matching candidates are not an error, listing order decides.

use regex::Regex;

use crate::types::{ProbeError, ResultCandidate, TargetIdentity};

/// One way of deciding that a candidate is the target.
pub trait MatchStrategy: Send + Sync {
    /// Short name reported in results (`flight_code`, `flight_text`, ...).
    fn name(&self) -> &'static str;

    fn matches(&self, candidate: &ResultCandidate) -> bool;
}

/// Compares against the flight codes the extractor already parsed.
pub struct FlightCodeStrategy {
    carrier: String,
    number: String,
}

impl FlightCodeStrategy {
    pub fn new(carrier: &str, number: &str) -> Self {
        Self {
            carrier: carrier.to_ascii_uppercase(),
            number: strip_leading_zeros(number).to_string(),
        }
    }
}

impl MatchStrategy for FlightCodeStrategy {
    fn name(&self) -> &'static str {
        "flight_code"
    }

    fn matches(&self, candidate: &ResultCandidate) -> bool {
        candidate.flight_codes.iter().any(|code| {
            code.carrier.eq_ignore_ascii_case(&self.carrier)
                && strip_leading_zeros(&code.number) == self.number
        })
    }
}

/// Carrier token followed by the number anywhere in the raw text, with any
/// amount of whitespace (and leading zeros) in between. A number followed by
/// `:` is the hour of a time, not a flight.
pub struct FlightTextStrategy {
    pattern: Regex,
}

impl FlightTextStrategy {
    pub fn new(carrier: &str, number: &str) -> Result<Self, ProbeError> {
        let pattern = format!(
            r"(?i)(?:^|[^A-Z0-9]){}\s*0*{}(?:[^0-9:]|$)",
            regex::escape(carrier),
            regex::escape(strip_leading_zeros(number)),
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| ProbeError::QueryMalformed(format!("unusable flight identity: {e}")))?;
        Ok(Self { pattern })
    }
}

impl MatchStrategy for FlightTextStrategy {
    fn name(&self) -> &'static str {
        "flight_text"
    }

    fn matches(&self, candidate: &ResultCandidate) -> bool {
        self.pattern.is_match(&candidate.raw)
    }
}

/// Exact substring of the raw text, e.g. a departure time.
pub struct AnchorStrategy {
    anchor: String,
}

impl AnchorStrategy {
    pub fn new(anchor: &str) -> Self {
        Self {
            anchor: anchor.to_string(),
        }
    }
}

impl MatchStrategy for AnchorStrategy {
    fn name(&self) -> &'static str {
        "anchor"
    }

    fn matches(&self, candidate: &ResultCandidate) -> bool {
        candidate.raw.contains(&self.anchor)
    }
}

/// The winning candidate and the strategy that accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub candidate: ResultCandidate,
    pub strategy: &'static str,
}

/// Ordered strategies for one target.
pub struct IdentityMatcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl IdentityMatcher {
    /// Build the strategy list for `target`. Fails for identities that can
    /// never match.
    pub fn for_target(target: &TargetIdentity) -> Result<Self, ProbeError> {
        target.validate()?;
        let strategies: Vec<Box<dyn MatchStrategy>> = match target {
            TargetIdentity::Flight { carrier, number } => vec![
                Box::new(FlightCodeStrategy::new(carrier, number)),
                Box::new(FlightTextStrategy::new(carrier, number)?),
            ],
            TargetIdentity::Anchor { text } => vec![Box::new(AnchorStrategy::new(text))],
        };
        Ok(Self { strategies })
    }

    /// Custom strategy list, tried in the given order.
    pub fn with_strategies(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First candidate, in listing order, accepted by any strategy.
    pub fn find<I>(&self, candidates: I) -> Option<MatchOutcome>
    where
        I: IntoIterator<Item = ResultCandidate>,
    {
        candidates.into_iter().find_map(|candidate| {
            self.strategies
                .iter()
                .find(|s| s.matches(&candidate))
                .map(|s| s.name())
                .map(|strategy| MatchOutcome {
                    candidate,
                    strategy,
                })
        })
    }
}

fn strip_leading_zeros(number: &str) -> &str {
    let stripped = number.trim_start_matches('0');
    if stripped.is_empty() {
        "0"
    } else {
        stripped
    }
}
