use std::{env, error::Error, path::PathBuf};

use clap::Parser;
use gridscrape::{
    api::eia::{start_timestamp, EiaClient},
    config::Config,
    db::renewables::{Credentials, RenewablesArchive, COLLECTION},
    sink,
    table::{merge, SeriesMapping, Table},
};
use jiff::Timestamp;
use log::{error, info};
use tabled::{builder::Builder, settings::Style};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the config file, default ~/.datascrapers/config.json5
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request data starting this many days back, at local midnight
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=3650))]
    days_back: i64,
}

/// Make an ASCII table from the data
fn ascii_table(table: &Table) -> tabled::Table {
    let mut builder = Builder::new();
    let mut header = vec!["Date".to_string(), "Local Time".to_string()];
    header.extend(table.columns.iter().cloned());
    builder.push_record(header);
    for row in &table.rows {
        let mut record = vec![row.utc_string(), row.local_string()];
        for value in &row.values {
            record.push(value.map(|v| v.to_string()).unwrap_or_default());
        }
        builder.push_record(record);
    }
    let mut out = builder.build();
    out.with(Style::empty());
    out
}

/// Run this job every day shortly after local midnight
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    dotenvy::dotenv().ok();

    let config = Config::load(&args.config.unwrap_or_else(Config::default_path));
    let mapping = SeriesMapping::california_renewables();

    let api_key = config
        .api_key
        .clone()
        .or_else(|| env::var("EIA_API_KEY").ok())
        .ok_or("no EIA API key.  Set `apiKey` in the config file or the EIA_API_KEY env variable")?;

    let now_local = Timestamp::now().to_zoned(mapping.tz().clone());
    let start = start_timestamp(&now_local, args.days_back);
    info!("requesting EIA series starting at {}", start);
    let client = EiaClient::new(api_key);
    let response = client.fetch(mapping.ids(), &start).await?;
    let table = merge(&response, &mapping)?;
    info!("merged {} series into {} rows", table.columns.len(), table.len());

    if config.print_data {
        println!("{}", ascii_table(&table));
    }

    // file sinks are independent of each other; a failure is remembered
    // and surfaced at exit instead of stopping the run
    let mut failed = false;
    if config.save_csv_file {
        match sink::write_csv(&table, &config.csv_path) {
            Ok(_) => info!("saved CSV file to {}", config.csv_path.display()),
            Err(e) => {
                error!("{}", e);
                failed = true;
            }
        }
    }
    if config.save_json_file {
        match sink::write_json(&table, &config.json_path) {
            Ok(_) => info!("saved JSON file to {}", config.json_path.display()),
            Err(e) => {
                error!("{}", e);
                failed = true;
            }
        }
    }

    if config.save_to_database {
        let credentials = Credentials::from_file(&config.credential_path)?;
        let archive = RenewablesArchive::connect(&credentials).await?;
        if let Some(days) = config.retention_days {
            archive.prune(&now_local, days).await?;
        }
        archive.upsert(&table).await?;
        info!("uploaded {} rows to `{}`", table.len(), COLLECTION);
    }

    if failed {
        return Err("one or more file sinks failed".into());
    }
    Ok(())
}
