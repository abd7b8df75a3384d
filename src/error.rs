use thiserror::Error;

/// Everything that can sink a run.  None of these are recoverable; the
/// job logs the message and exits with a non-zero status.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("GET request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Non-success HTTP status or a body that isn't the expected JSON.
    #[error("{0}")]
    Protocol(String),

    /// Well-formed JSON with an embedded EIA error payload.
    #[error("API call error: {0}")]
    Upstream(String),

    /// The response references a series id missing from the series name
    /// map.  The map is stale and needs a manual entry.
    #[error("no `{0}` key in the series name map, please add one manually")]
    UnmappedSeries(String),

    #[error("response contains no data series")]
    EmptyResponse,

    /// File write or database failure.
    #[error("{0}")]
    Persistence(String),
}
