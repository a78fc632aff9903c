//! Query builder: validate an offer query and turn it into a search request.

use chrono::NaiveDate;

use crate::types::{OfferQuery, ProbeError, SearchRequest, TripType};

/// Build the canonical request for `query`, rejecting malformed input.
///
/// `today` is the first date a search may target.
pub fn build_request(query: &OfferQuery, today: NaiveDate) -> Result<SearchRequest, ProbeError> {
    let origin = normalize_code("origin", &query.origin)?;
    let destination = normalize_code("destination", &query.destination)?;

    if origin == destination {
        return Err(ProbeError::QueryMalformed(format!(
            "origin and destination are both {origin}"
        )));
    }

    if query.date < today {
        return Err(ProbeError::QueryMalformed(format!(
            "date {} is in the past (today is {today})",
            query.date
        )));
    }

    if let Some(ret) = query.return_date {
        if query.trip_type == TripType::OneWay {
            return Err(ProbeError::QueryMalformed(
                "return date given for a one-way trip".to_string(),
            ));
        }
        if ret < query.date {
            return Err(ProbeError::QueryMalformed(format!(
                "return date {ret} precedes departure {}",
                query.date
            )));
        }
    }

    Ok(SearchRequest {
        origin,
        destination,
        date: query.date,
        return_date: query.return_date,
        cabin: query.cabin,
        trip_type: query.trip_type,
        demand: 1,
    })
}

fn normalize_code(field: &str, code: &str) -> Result<String, ProbeError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ProbeError::QueryMalformed(format!(
            "{field} must be a 3-letter code, got {code:?}"
        )));
    }
    Ok(code.to_ascii_uppercase())
}
