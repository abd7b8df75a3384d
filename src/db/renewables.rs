use std::fs;
use std::path::Path;

use futures::TryStreamExt;
use jiff::{ToSpan, Zoned};
use log::{error, info};
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::table::{format_utc, Row, Table};

pub const DATABASE: &str = "energy";
pub const COLLECTION: &str = "California Renewable Energy";
const LOCAL_TIME_FIELD: &str = "Local Time";

/// Connection credentials for the document database, loaded from a JSON
/// file kept next to the config, e.g. `{"uri": "mongodb://..."}`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub uri: String,
}

impl Credentials {
    pub fn from_file(path: &Path) -> Result<Credentials, ScrapeError> {
        let text = fs::read_to_string(path).map_err(|e| {
            ScrapeError::Persistence(format!(
                "problem reading credential file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ScrapeError::Persistence(format!(
                "problem parsing credential file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// One document per UTC timestamp in the `California Renewable Energy`
/// collection.  Documents accumulate fields across runs as the upstream
/// series trickle in at different cadences.
pub struct RenewablesArchive {
    client: Client,
    collection: Collection<Document>,
}

fn persistence<E: std::fmt::Display>(e: E) -> ScrapeError {
    ScrapeError::Persistence(e.to_string())
}

impl RenewablesArchive {
    pub async fn connect(credentials: &Credentials) -> Result<RenewablesArchive, ScrapeError> {
        let options = ClientOptions::parse(&credentials.uri)
            .await
            .map_err(persistence)?;
        let client = Client::with_options(options).map_err(persistence)?;
        let collection = client.database(DATABASE).collection::<Document>(COLLECTION);
        Ok(RenewablesArchive { client, collection })
    }

    /// Upsert every row in one transaction; readers never observe a
    /// partially applied run.  A failed commit is fatal.
    ///
    /// Fields absent from a row are not written, so a document keeps
    /// whatever an earlier run stored for them.
    pub async fn upsert(&self, table: &Table) -> Result<(), ScrapeError> {
        let mut session = self.client.start_session().await.map_err(persistence)?;
        session.start_transaction().await.map_err(persistence)?;

        for row in &table.rows {
            let result = self
                .collection
                .update_one(
                    doc! {"_id": row.utc_string()},
                    doc! {"$set": row_document(&table.columns, row)},
                )
                .upsert(true)
                .session(&mut session)
                .await;
            if let Err(e) = result {
                let _ = session.abort_transaction().await;
                return Err(persistence(e));
            }
        }
        session.commit_transaction().await.map_err(persistence)?;
        info!("upserted {} documents into `{}`", table.len(), COLLECTION);
        Ok(())
    }

    /// Delete documents older than the retention window, measured in the
    /// grid operator's local days.  Windows under 2 days are ignored.
    ///
    /// Deletes are best-effort: one failure is logged and skipped, the
    /// rest are still attempted.  Returns the number deleted.
    pub async fn prune(&self, now_local: &Zoned, retention_days: i64) -> Result<usize, ScrapeError> {
        if retention_days < 2 {
            return Ok(0);
        }
        let cutoff = retention_cutoff(now_local, retention_days);
        let mut cursor = self
            .collection
            .find(doc! {"_id": {"$lt": cutoff.as_str()}})
            .await
            .map_err(persistence)?;

        let mut deleted = 0;
        while let Some(document) = cursor.try_next().await.map_err(persistence)? {
            let id = match document.get_str("_id") {
                Ok(id) => id.to_string(),
                Err(e) => {
                    error!("skipping document without a string _id: {}", e);
                    continue;
                }
            };
            match self.collection.delete_one(doc! {"_id": id.as_str()}).await {
                Ok(_) => deleted += 1,
                Err(e) => error!("failed to delete expired document {}: {}", id, e),
            }
        }
        info!(
            "deleted {} documents older than {} from `{}`",
            deleted, cutoff, COLLECTION
        );
        Ok(deleted)
    }
}

/// The `$set` payload for one row.  Only present values are included so
/// the upsert merges into, rather than replaces, an existing document.
fn row_document(columns: &[String], row: &Row) -> Document {
    let mut document = doc! { LOCAL_TIME_FIELD: row.local_string() };
    for (column, value) in columns.iter().zip(&row.values) {
        if let Some(v) = value {
            document.insert(column.as_str(), *v);
        }
    }
    document
}

/// The `_id` of the oldest document allowed to stay: local midnight of
/// `retention_days` days ago, as a canonical UTC string.  Canonical UTC
/// strings are fixed-width, so `_id < cutoff` compares instants exactly
/// even across DST changes of the local offset.
fn retention_cutoff(now_local: &Zoned, retention_days: i64) -> String {
    let day = now_local.date() - retention_days.days();
    let midnight = day
        .to_zoned(now_local.time_zone().clone())
        .expect("local midnight");
    format_utc(&midnight.timestamp())
}

#[cfg(test)]
mod tests {
    use jiff::tz::TimeZone;
    use jiff::Timestamp;

    use super::*;

    fn local_midnight(date: &str) -> Zoned {
        format!("{} 00:00[America/Los_Angeles]", date)
            .parse::<Zoned>()
            .unwrap()
    }

    #[test]
    fn cutoff_is_local_midnight() {
        let now = "2024-03-15 13:45[America/Los_Angeles]"
            .parse::<Zoned>()
            .unwrap();
        let cutoff = retention_cutoff(&now, 3);
        // 2024-03-12 midnight Pacific is 07:00 UTC (daylight saving)
        assert_eq!(cutoff, "2024-03-12T07:00:00.000Z");

        // rows at D-5, D-3, D-1, D with a 3 day window: only D-5 goes
        let d = |s: &str| format_utc(&local_midnight(s).timestamp());
        assert!(d("2024-03-10") < cutoff);
        assert!(d("2024-03-12") >= cutoff);
        assert!(d("2024-03-14") >= cutoff);
        assert!(d("2024-03-15") >= cutoff);
    }

    #[test]
    fn cutoff_comparison_spans_dst() {
        // window crosses the spring-forward transition; the string
        // comparison still orders by instant
        let now = "2024-03-12 09:00[America/Los_Angeles]"
            .parse::<Zoned>()
            .unwrap();
        let cutoff = retention_cutoff(&now, 2);
        assert_eq!(cutoff, "2024-03-10T08:00:00.000Z");
        let before = format_utc(&local_midnight("2024-03-09").timestamp());
        assert!(before < cutoff);
    }

    #[test]
    fn row_document_omits_missing_values() {
        let timestamp = "2024-01-01T08:00:00Z".parse::<Timestamp>().unwrap();
        let row = Row {
            timestamp,
            local: timestamp.to_zoned(TimeZone::get("America/Los_Angeles").unwrap()),
            values: vec![Some(100), None, Some(25)],
        };
        let columns = vec![
            "Demand Forecast".to_string(),
            "Solar Generation".to_string(),
            "Wind Generation".to_string(),
        ];
        let document = row_document(&columns, &row);
        assert_eq!(document.get_i64("Demand Forecast").unwrap(), 100);
        assert_eq!(document.get_i64("Wind Generation").unwrap(), 25);
        // absent so an upsert leaves a previously written value alone
        assert!(!document.contains_key("Solar Generation"));
        assert_eq!(
            document.get_str(LOCAL_TIME_FIELD).unwrap(),
            "2024-01-01T00:00:00.000-08:00"
        );
    }
}
