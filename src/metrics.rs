use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::parser::Totals;
use crate::settings::Settings;

const MEASUREMENT: &str = "podcast_count";

/// Pushes totals to an InfluxDB 1.x `/write` endpoint.
pub struct InfluxPublisher {
    client: Client,
    write_url: String,
    database: String,
    auth: Option<(String, Option<String>)>,
}

impl InfluxPublisher {
    /// `None` when no Influx host is configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(host) = settings.influx_host.as_deref() else {
            return Ok(None);
        };
        let scheme = if settings.influx_ssl { "https" } else { "http" };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(Error::Metrics)?;

        Ok(Some(InfluxPublisher {
            client,
            write_url: format!("{}://{}:{}/write", scheme, host, settings.influx_port),
            database: settings.influx_db.clone(),
            auth: settings
                .influx_user
                .clone()
                .map(|user| (user, settings.influx_pass.clone())),
        }))
    }

    pub async fn publish(&self, totals: &Totals, at: DateTime<Utc>) -> Result<()> {
        let body = line_protocol(totals, at);
        debug!("Influx point: {}", body.trim_end());

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, pass.as_ref());
        }

        let response = request.send().await.map_err(Error::Metrics)?;
        if !response.status().is_success() {
            return Err(Error::MetricsStatus(response.status()));
        }

        info!("Published totals to {}", self.database);
        Ok(())
    }
}

/// Fields are written as floats, matching the existing series.
pub fn line_protocol(totals: &Totals, at: DateTime<Utc>) -> String {
    format!(
        "{} episodes={},minutes={} {}\n",
        MEASUREMENT,
        totals.episodes as f64,
        totals.minutes as f64,
        at.timestamp()
    )
}
