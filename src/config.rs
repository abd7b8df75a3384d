use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

/// Run settings, read from a json5 file.  Any key can be left out; an
/// unknown key gets a warning, never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Overrides the EIA_API_KEY environment variable when set.
    pub api_key: Option<String>,
    pub print_data: bool,
    pub save_csv_file: bool,
    pub csv_path: PathBuf,
    pub save_json_file: bool,
    pub json_path: PathBuf,
    pub save_to_database: bool,
    /// Documents older than this many local days are pruned from the
    /// database before each upload.  Unset means keep everything.
    pub retention_days: Option<i64>,
    /// JSON file holding the database connection credentials.
    pub credential_path: PathBuf,
}

/// Ten years; larger windows would overflow the date arithmetic in the
/// retention pass and make no sense for an hourly feed.
const MAX_RETENTION_DAYS: i64 = 3650;

/// All default paths live under `~/.datascrapers`.
fn config_dir() -> PathBuf {
    match env::var("HOME") {
        Ok(home) => Path::new(&home).join(".datascrapers"),
        Err(_) => PathBuf::from(".datascrapers"),
    }
}

impl Default for Config {
    fn default() -> Config {
        let dir = config_dir();
        Config {
            api_key: None,
            print_data: true,
            save_csv_file: true,
            csv_path: dir.join("EnergyData.csv"),
            save_json_file: false,
            json_path: dir.join("EnergyData.json"),
            save_to_database: true,
            retention_days: None,
            credential_path: dir.join("dbCreds.json"),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        config_dir().join("config.json5")
    }

    /// Read the config file.  A missing or unparsable file is not fatal,
    /// the defaults are used instead.
    pub fn load(path: &Path) -> Config {
        let mut config = Config::default();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "problem reading config file {}: {}.  Using default config settings.",
                    path.display(),
                    e
                );
                return config;
            }
        };
        let parsed: Value = match json5::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "problem loading config file {}: {}.  Using default config settings.",
                    path.display(),
                    e
                );
                return config;
            }
        };
        let Value::Object(options) = parsed else {
            warn!(
                "config file {} is not an object.  Using default config settings.",
                path.display()
            );
            return config;
        };

        for (option, value) in options {
            match option.as_str() {
                "apiKey" => set_string(&option, &value, |v| config.api_key = Some(v)),
                "printData" => set_bool(&option, &value, |v| config.print_data = v),
                "saveCSVFile" => set_bool(&option, &value, |v| config.save_csv_file = v),
                "csvPath" => set_string(&option, &value, |v| config.csv_path = PathBuf::from(v)),
                "saveJSONFile" => set_bool(&option, &value, |v| config.save_json_file = v),
                "jsonPath" => set_string(&option, &value, |v| config.json_path = PathBuf::from(v)),
                "saveToDatabase" => set_bool(&option, &value, |v| config.save_to_database = v),
                "retentionDays" => match value.as_i64() {
                    Some(days) if (0..=MAX_RETENTION_DAYS).contains(&days) => {
                        config.retention_days = Some(days)
                    }
                    Some(days) => warn!(
                        "option `retentionDays` = {} is outside 0..={}, ignoring it.",
                        days, MAX_RETENTION_DAYS
                    ),
                    None => warn_type(&option, "an integer"),
                },
                "credentialPath" => {
                    set_string(&option, &value, |v| config.credential_path = PathBuf::from(v))
                }
                _ => warn!("ignoring invalid option `{}` in config file.", option),
            }
        }
        config
    }
}

fn warn_type(option: &str, expected: &str) {
    warn!("option `{}` is not {}, ignoring it.", option, expected);
}

fn set_bool(option: &str, value: &Value, set: impl FnOnce(bool)) {
    match value.as_bool() {
        Some(v) => set(v),
        None => warn_type(option, "a boolean"),
    }
}

fn set_string(option: &str, value: &Value, set: impl FnOnce(String)) {
    match value.as_str() {
        Some(v) => set(v.to_string()),
        None => warn_type(option, "a string"),
    }
}
