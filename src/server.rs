use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::{get, routes, Build, Rocket, State};
use tracing::{error, info};

use crate::chart::{self, ChartWindow};
use crate::settings::Settings;
use crate::stats_log;

/// Rocket managed state.
pub struct ChartState {
    pub log_path: PathBuf,
}

#[get("/health")]
fn health() -> &'static str {
    "OK"
}

/// Chart page for `?start=..&end=..`; start defaults to 24 hours ago.
#[get("/?<start>&<end>")]
async fn chart_page(
    start: Option<&str>,
    end: Option<&str>,
    state: &State<ChartState>,
) -> Result<RawHtml<String>, Status> {
    let start = parse_param("start", start)?;
    let end = parse_param("end", end)?;
    let log_path = state.log_path.clone();

    let page = tokio::task::spawn_blocking(move || -> Result<String> {
        let entries = stats_log::read(&log_path)?;
        let now = Utc::now();
        chart::render_page(&entries, &ChartWindow::resolve(start, end, now), now)
    })
    .await
    .map_err(|e| anyhow!("render task failed: {}", e))
    .and_then(|page| page)
    .map_err(|e| {
        error!("Chart page failed: {:#}", e);
        Status::InternalServerError
    })?;

    Ok(RawHtml(page))
}

fn parse_param(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, Status> {
    let Some(raw) = value else {
        return Ok(None);
    };
    // An unencoded `+00:00` offset arrives as ` 00:00`
    stats_log::parse_timestamp(raw)
        .or_else(|| stats_log::parse_timestamp(&raw.replace(' ', "+")))
        .map(Some)
        .ok_or_else(|| {
            info!("Rejecting {}={:?}", name, raw);
            Status::BadRequest
        })
}

pub fn build(figment: Figment, log_path: PathBuf) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(ChartState { log_path })
        .mount("/", routes![chart_page, health])
}

/// Serve the chart until shutdown (SIGINT/SIGTERM).
pub async fn launch(settings: &Settings, log_path: PathBuf) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", settings.server_address.clone()))
        .merge(("port", settings.server_port));

    info!(
        "Serving chart of {} on {}:{}",
        log_path.display(),
        settings.server_address,
        settings.server_port
    );
    build(figment, log_path)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Chart server has shut down");
    Ok(())
}
