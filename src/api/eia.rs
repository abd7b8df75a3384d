use itertools::Itertools;
use jiff::{ToSpan, Zoned};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScrapeError;

const BASE_URL: &str = "https://api.eia.gov/series/";

/// The JSON envelope the EIA series API returns on success: a list of
/// series, each with its id, a human-readable name, and the hourly
/// `[timestamp, value]` pairs.  Values are whole megawatt-hours by the
/// upstream contract, occasionally null.
#[derive(Debug, Deserialize)]
pub struct SeriesResponse {
    #[serde(default)]
    pub series: Vec<SeriesEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesEntry {
    // the live API reports `series_id`, the docs say `id`
    #[serde(alias = "series_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: Vec<(String, Option<i64>)>,
}

/// Client for the EIA `series` API.
pub struct EiaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EiaClient {
    pub fn new(api_key: String) -> EiaClient {
        EiaClient {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            api_key,
        }
    }

    /// One GET requesting all series at once, starting at `start` in the
    /// upstream compact format (see [start_timestamp]).
    pub async fn fetch<'a, I>(&self, series_ids: I, start: &str) -> Result<SeriesResponse, ScrapeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let series_id = series_ids.into_iter().join(";");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("series_id", series_id.as_str()),
                ("start", start),
            ])
            .send()
            .await
            .map_err(ScrapeError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Protocol(format!(
                "GET request failed with status {}",
                status
            )));
        }
        let body: Value = response.json().await.map_err(|e| {
            ScrapeError::Protocol(format!("could not convert response to JSON: {}", e))
        })?;
        parse_response(body)
    }
}

/// Validate the raw envelope: an embedded `data.error` payload wins over
/// everything else, then the body must decode into [SeriesResponse].
pub fn parse_response(body: Value) -> Result<SeriesResponse, ScrapeError> {
    if let Some(error) = body.get("data").and_then(|d| d.get("error")) {
        let message = error
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(ScrapeError::Upstream(message));
    }
    serde_json::from_value(body)
        .map_err(|e| ScrapeError::Protocol(format!("unexpected response shape: {}", e)))
}

/// Local midnight of `days_back` days before `now_local`, in the format
/// the EIA `start` parameter wants, e.g. "20240101T00Z".  Requesting
/// from yesterday's midnight is how each run picks up only fresh data.
pub fn start_timestamp(now_local: &Zoned, days_back: i64) -> String {
    let day = now_local.date() - days_back.days();
    format!("{}T00Z", day.strftime("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_valid_response() {
        let body = json!({
            "series": [
                {"series_id": "EBA.CAL-ALL.DF.H", "name": "Demand Forecast for CAL",
                 "data": [["20240101T00Z", 100], ["20240101T01Z", null]]},
                {"id": "EBA.CAL-ALL.NG.SUN.H", "name": "Solar Generation for CAL",
                 "data": []},
            ]
        });
        let response = parse_response(body).unwrap();
        assert_eq!(response.series.len(), 2);
        assert_eq!(response.series[0].id, "EBA.CAL-ALL.DF.H");
        assert_eq!(
            response.series[0].data,
            vec![
                ("20240101T00Z".to_string(), Some(100)),
                ("20240101T01Z".to_string(), None)
            ]
        );
        assert_eq!(response.series[1].id, "EBA.CAL-ALL.NG.SUN.H");
    }

    #[test]
    fn parse_embedded_error() {
        let body = json!({
            "data": {"error": "invalid or missing api_key"}
        });
        match parse_response(body) {
            Err(ScrapeError::Upstream(message)) => {
                assert_eq!(message, "invalid or missing api_key")
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn parse_wrong_shape() {
        let body = json!({"series": "not a list"});
        assert!(matches!(
            parse_response(body),
            Err(ScrapeError::Protocol(_))
        ));
    }

    #[test]
    fn start_timestamp_yesterday_midnight() {
        let now = "2024-01-02 10:30[America/Los_Angeles]"
            .parse::<Zoned>()
            .unwrap();
        assert_eq!(start_timestamp(&now, 1), "20240101T00Z");
        assert_eq!(start_timestamp(&now, 3), "20231230T00Z");
    }
}
