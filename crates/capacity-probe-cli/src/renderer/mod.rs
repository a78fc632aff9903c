//! Browser-backed content source.
//!
//! Demand is raised by re-loading the search URL with the next `{demand}`
//! value, so every observation is a fresh rendering of the listing.

pub mod chromium;

pub use chromium::{find_chromium, ChromiumProvider, ChromiumSource};

use capacity_probe::SearchRequest;

/// Fill the placeholders of `template` for `request` at `demand`.
/// Unknown placeholders are left untouched.
pub fn render_url(template: &str, request: &SearchRequest, demand: u32) -> String {
    request
        .params(demand)
        .into_iter()
        .fold(template.to_string(), |url, (name, value)| {
            url.replace(&format!("{{{name}}}"), &value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capacity_probe::{build_request, OfferQuery};
    use chrono::NaiveDate;

    #[test]
    fn test_render_url() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let query = OfferQuery::one_way("gru", "MIA", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap());
        let request = build_request(&query, today).unwrap();

        let url = render_url(
            "https://example.test/flights/{origin}-{destination}/{date}?adults={demand}&cabin={cabin}&x={unknown}",
            &request,
            3,
        );
        assert_eq!(
            url,
            "https://example.test/flights/GRU-MIA/2026-11-02?adults=3&cabin=economy&x={unknown}"
        );
    }
}
