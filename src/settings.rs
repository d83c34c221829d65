use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://overcast.fm";
const DEFAULT_LOG_FILE: &str = "results.csv";

/// Runtime settings, read from the process environment (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub overcast_email: Option<String>,
    pub overcast_pass: Option<String>,
    pub overcast_base_url: String,
    pub output_csv_filename: String,
    pub request_timeout_secs: u64,

    pub influx_host: Option<String>,
    pub influx_port: u16,
    pub influx_user: Option<String>,
    pub influx_pass: Option<String>,
    pub influx_db: String,
    pub influx_ssl: bool,

    pub server_address: String,
    pub server_port: u16,
}

impl Settings {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        // A missing .env is fine
        dotenv::dotenv().ok();
        Self::from_env(Environment::default())
    }

    fn from_env(env: Environment) -> std::result::Result<Self, ConfigError> {
        Config::builder()
            .set_default("overcast_base_url", DEFAULT_BASE_URL)?
            .set_default("output_csv_filename", DEFAULT_LOG_FILE)?
            .set_default("request_timeout_secs", 30)?
            .set_default("influx_port", 8086)?
            .set_default("influx_db", "podcasts")?
            .set_default("influx_ssl", false)?
            .set_default("server_address", "127.0.0.1")?
            .set_default("server_port", 8000)?
            .add_source(env.ignore_empty(true))
            .build()?
            .try_deserialize()
    }

    pub fn credentials(&self) -> Result<(&str, &str)> {
        let email = self
            .overcast_email
            .as_deref()
            .ok_or(Error::MissingSetting("OVERCAST_EMAIL"))?;
        let password = self
            .overcast_pass
            .as_deref()
            .ok_or(Error::MissingSetting("OVERCAST_PASS"))?;
        Ok((email, password))
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_env(Environment::default().source(Some(map))).unwrap()
    }
}
