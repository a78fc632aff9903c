//! Result extractor: turn rendered offer blocks into candidate records.
//!
//! A block must contain a time-of-day token to count as an offer at all;
//! anything else on the page (banners, filters, ads) is dropped silently.
//! The remaining fields are independent token searches over the block text
//! and any of them may come back empty.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{FlightCode, ResultCandidate, StopCategory};

/// Maximum time-of-day tokens kept per block (departure, arrival).
const MAX_TIMES: usize = 2;

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d(?:\s?[AaPp][Mm])?\b").expect("time regex is valid")
    })
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:R\$|US\$|\$|\u{20AC}|\u{00A3}|\b(?:BRL|USD|EUR|GBP)\b)\s?\d(?:[\d.,]*\d)?")
            .expect("price regex is valid")
    })
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d{1,2}\s?h(?:\s?\d{1,2}\s?m(?:in)?)?\b").expect("duration regex is valid")
    })
}

fn multi_stop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[2-9]\+?\s?(?:stops|paradas|escalas)\b").expect("multi-stop regex is valid")
    })
}

fn one_stop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b1\s?(?:stop|parada|escala)\b").expect("one-stop regex is valid")
    })
}

fn direct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:non-?stop|direct|direto|directo|sem (?:escalas|paradas)|sin escalas)\b")
            .expect("direct regex is valid")
    })
}

fn flight_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Z0-9]|[0-9][A-Z]|[A-Z]{3})\s?(\d{1,4})\b")
            .expect("flight code regex is valid")
    })
}

/// Extract candidates from one observation's blocks, in listing order.
///
/// Lazy and side-effect free: calling it again on the same blocks yields the
/// same candidates.
pub fn extract_candidates(blocks: &[String]) -> impl Iterator<Item = ResultCandidate> + '_ {
    blocks
        .iter()
        .enumerate()
        .filter_map(|(position, block)| parse_block(position, block))
}

/// Parse a single block, or `None` when it does not look like an offer.
pub fn parse_block(position: usize, text: &str) -> Option<ResultCandidate> {
    let times: Vec<String> = time_re()
        .find_iter(text)
        .take(MAX_TIMES)
        .map(|m| m.as_str().to_string())
        .collect();
    if times.is_empty() {
        return None;
    }

    Some(ResultCandidate {
        position,
        raw: text.to_string(),
        times,
        price: price_re().find(text).map(|m| m.as_str().to_string()),
        duration: duration_re().find(text).map(|m| m.as_str().to_string()),
        stops: stop_category(text),
        flight_codes: flight_codes(text),
    })
}

fn stop_category(text: &str) -> Option<StopCategory> {
    if multi_stop_re().is_match(text) {
        Some(StopCategory::MultiStop)
    } else if one_stop_re().is_match(text) {
        Some(StopCategory::OneStop)
    } else if direct_re().is_match(text) {
        Some(StopCategory::Direct)
    } else {
        None
    }
}

/// All flight-code-like tokens. Skips a meridiem marker right after a number
/// (`10:30 PM 2 stops`) and tokens right before a colon (`GRU 10:35`), which
/// are time fragments rather than flights.
fn flight_codes(text: &str) -> Vec<FlightCode> {
    let mut codes = Vec::new();
    for caps in flight_code_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };

        let meridiem = matches!(&caps[1], "AM" | "PM")
            && text[..whole.start()]
                .trim_end()
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit());
        let followed_by_colon = text[whole.end()..].starts_with(':');
        if meridiem || followed_by_colon {
            continue;
        }

        let code = FlightCode {
            carrier: caps[1].to_string(),
            number: caps[2].to_string(),
        };
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
