use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::error::ScrapeError;
use crate::table::Table;

fn persistence<E: std::fmt::Display>(e: E) -> ScrapeError {
    ScrapeError::Persistence(e.to_string())
}

/// Write the table as CSV, replacing any previous file.  Header is
/// `Date, Local Time` followed by the series columns; missing values
/// become empty cells.
pub fn write_csv(table: &Table, path: &Path) -> Result<(), ScrapeError> {
    let mut wtr = csv::Writer::from_path(path).map_err(persistence)?;

    let mut header = vec!["Date".to_string(), "Local Time".to_string()];
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header).map_err(persistence)?;

    for row in &table.rows {
        let mut record = vec![row.utc_string(), row.local_string()];
        for value in &row.values {
            record.push(value.map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record).map_err(persistence)?;
    }
    wtr.flush().map_err(persistence)?;
    Ok(())
}

/// JSON form mirroring the CSV: one object per UTC timestamp key,
/// mapping to the row's local time and series values.
pub fn to_json(table: &Table) -> Value {
    let mut out = Map::new();
    for row in &table.rows {
        let mut fields = Map::new();
        fields.insert("Local Time".to_string(), Value::String(row.local_string()));
        for (column, value) in table.columns.iter().zip(&row.values) {
            let value = match value {
                Some(v) => Value::Number(Number::from(*v)),
                None => Value::Null,
            };
            fields.insert(column.clone(), value);
        }
        out.insert(row.utc_string(), Value::Object(fields));
    }
    Value::Object(out)
}

/// Write the JSON form, replacing any previous file.
pub fn write_json(table: &Table, path: &Path) -> Result<(), ScrapeError> {
    let json = serde_json::to_string_pretty(&to_json(table)).map_err(persistence)?;
    fs::write(path, json).map_err(persistence)?;
    Ok(())
}

pub fn read_json(path: &Path) -> Result<Value, ScrapeError> {
    let text = fs::read_to_string(path).map_err(persistence)?;
    serde_json::from_str(&text).map_err(persistence)
}
