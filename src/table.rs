use std::collections::BTreeMap;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};
use log::debug;

use crate::api::eia::SeriesResponse;
use crate::error::ScrapeError;

/// Ordered map from an EIA series id to the column name used for it in
/// every output (CSV header, JSON field, database field).  The ids come
/// from the EIA API documents and have to be kept in sync by hand.
///
/// The time zone is the grid operator's; retention boundaries follow its
/// calendar, not UTC.
#[derive(Debug, Clone)]
pub struct SeriesMapping {
    entries: Vec<(String, String)>,
    tz: TimeZone,
}

impl SeriesMapping {
    /// Hourly demand forecast, solar and wind generation for the
    /// California balancing authority.
    pub fn california_renewables() -> SeriesMapping {
        SeriesMapping {
            entries: vec![
                ("EBA.CAL-ALL.DF.H".to_string(), "Demand Forecast".to_string()),
                ("EBA.CAL-ALL.NG.SUN.H".to_string(), "Solar Generation".to_string()),
                ("EBA.CAL-ALL.NG.WND.H".to_string(), "Wind Generation".to_string()),
            ],
            tz: TimeZone::get("America/Los_Angeles").unwrap(),
        }
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(eia_id, _)| eia_id == id)
            .map(|(_, name)| name.as_str())
    }

    /// Series ids in declared order, as sent to the EIA API.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn tz(&self) -> &TimeZone {
        &self.tz
    }
}

/// One observation interval.  `values` lines up with `Table::columns`;
/// a `None` means the series had no point at this timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: Timestamp,
    pub local: Zoned,
    pub values: Vec<Option<i64>>,
}

impl Row {
    pub fn utc_string(&self) -> String {
        format_utc(&self.timestamp)
    }

    pub fn local_string(&self) -> String {
        format_local(&self.local)
    }
}

/// The merged output of one run: one row per timestamp that appears in
/// at least one series, sorted ascending, unique by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Canonical UTC form, e.g. "2024-01-01T00:00:00.000Z".  EIA data is
/// hourly so the sub-second part is always zero.
pub fn format_utc(timestamp: &Timestamp) -> String {
    timestamp.strftime("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

/// Canonical local form carrying the UTC offset,
/// e.g. "2023-12-31T16:00:00.000-08:00".
pub fn format_local(local: &Zoned) -> String {
    local.strftime("%Y-%m-%dT%H:%M:%S.000%:z").to_string()
}

/// Parse the compact timestamp the EIA series API reports hourly data
/// with, e.g. "20240101T05Z".
pub fn parse_compact_timestamp(s: &str) -> Result<Timestamp, ScrapeError> {
    let malformed = || ScrapeError::Protocol(format!("malformed series timestamp `{}`", s));
    // byte indexing below requires ASCII; the response body is untrusted
    if s.len() != 12 || !s.is_ascii() || &s[8..9] != "T" || !s.ends_with('Z') {
        return Err(malformed());
    }
    let date = Date::strptime("%Y%m%d", &s[..8]).map_err(|_| malformed())?;
    let hour: i8 = s[9..11].parse().map_err(|_| malformed())?;
    if !(0..24).contains(&hour) {
        return Err(malformed());
    }
    let zoned = date
        .at(hour, 0, 0, 0)
        .to_zoned(TimeZone::UTC)
        .map_err(|_| malformed())?;
    Ok(zoned.timestamp())
}

/// Fold the per-series point lists into one table with a full outer join
/// on timestamp.  Every timestamp present in any series survives; values
/// a series doesn't report stay `None`.
///
/// Column order follows the mapping's declared order no matter how the
/// response orders its series.  An id absent from the mapping is fatal.
pub fn merge(response: &SeriesResponse, mapping: &SeriesMapping) -> Result<Table, ScrapeError> {
    if response.series.is_empty() {
        return Err(ScrapeError::EmptyResponse);
    }

    // resolve every id before touching any data
    for series in &response.series {
        if mapping.display_name(&series.id).is_none() {
            return Err(ScrapeError::UnmappedSeries(series.id.clone()));
        }
    }

    let columns: Vec<String> = mapping
        .entries
        .iter()
        .filter(|(id, _)| response.series.iter().any(|s| &s.id == id))
        .map(|(_, name)| name.clone())
        .collect();

    let mut cells: BTreeMap<Timestamp, Vec<Option<i64>>> = BTreeMap::new();
    for series in &response.series {
        let name = mapping.display_name(&series.id).unwrap();
        let j = columns.iter().position(|c| c == name).unwrap();
        debug!("merging series {} ({}), {} points", name, series.id, series.data.len());
        for (stamp, value) in &series.data {
            let timestamp = parse_compact_timestamp(stamp)?;
            cells.entry(timestamp).or_insert_with(|| vec![None; columns.len()])[j] = *value;
        }
    }

    let rows: Vec<Row> = cells
        .into_iter()
        .map(|(timestamp, values)| Row {
            timestamp,
            local: timestamp.to_zoned(mapping.tz.clone()),
            values,
        })
        .collect();

    Ok(Table { columns, rows })
}
