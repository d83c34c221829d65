mod chart;
mod error;
mod metrics;
mod parser;
mod server;
mod session;
mod settings;
mod stats_log;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use metrics::InfluxPublisher;
use parser::Totals;
use session::Session;
use settings::Settings;

#[derive(Parser)]
#[command(name = "overcast_stats", about = "Track the unplayed podcast backlog on overcast.fm")]
struct Cli {
    /// Stats log file (default: $OUTPUT_CSV_FILENAME or results.csv)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, scrape the episode list and record the totals
    Run {
        /// Print totals without writing the log or pushing metrics
        #[arg(long)]
        dry_run: bool,
        /// Repeat every N seconds until interrupted
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Extract episodes from a saved listing page
    Parse {
        file: PathBuf,
        /// Print episodes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the backlog chart over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { dry_run, interval } => {
            let settings = Settings::load().context("Invalid configuration")?;
            let log_path = log_path(cli.log_file, &settings);
            // Fail before the first request rather than on every tick
            settings.credentials()?;

            match interval {
                None => run_once(&settings, &log_path, dry_run).await.map(|_| ()),
                Some(secs) => run_every(&settings, &log_path, dry_run, secs).await,
            }
        }
        Commands::Parse { file, json } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            let episodes = parser::extract(&html);

            if json {
                println!("{}", serde_json::to_string_pretty(&episodes)?);
            } else {
                for ep in &episodes {
                    println!("{}: {} ({} min)", ep.podcast, ep.title, ep.duration);
                }
            }
            print_totals(&parser::aggregate(&episodes));
            Ok(())
        }
        Commands::Serve => {
            let settings = Settings::load().context("Invalid configuration")?;
            let log_path = log_path(cli.log_file, &settings);
            server::launch(&settings, log_path).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }

    result
}

fn log_path(flag: Option<PathBuf>, settings: &Settings) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&settings.output_csv_filename))
}

/// Login, fetch, extract, aggregate, then persist. Auth and fetch failures
/// end the run before extraction; persistence failures are only logged.
async fn run_once(settings: &Settings, log_path: &Path, dry_run: bool) -> anyhow::Result<Totals> {
    let session = Session::login(settings).await.context("Login failed")?;
    let html = session
        .fetch_listing()
        .await
        .context("Could not load the episode listing")?;

    let episodes = parser::extract(&html);
    let totals = parser::aggregate(&episodes);
    print_totals(&totals);

    if dry_run {
        info!("Dry run, totals not recorded");
    } else {
        record(settings, log_path, &totals, Utc::now()).await;
    }
    Ok(totals)
}

async fn run_every(
    settings: &Settings,
    log_path: &Path,
    dry_run: bool,
    secs: u64,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Recording every {}s, Ctrl-C to stop", secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_once(settings, log_path, dry_run).await {
                    error!("Run failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

/// Log line and metrics point are independent; one failing never skips the other.
async fn record(settings: &Settings, log_path: &Path, totals: &Totals, at: DateTime<Utc>) {
    match stats_log::append(log_path, at, totals) {
        Ok(()) => info!("Appended totals to {}", log_path.display()),
        Err(e) => warn!("{}", e),
    }

    match InfluxPublisher::from_settings(settings) {
        Ok(Some(publisher)) => {
            if let Err(e) = publisher.publish(totals, at).await {
                warn!("{}", e);
            }
        }
        Ok(None) => info!("INFLUX_HOST not set, skipping metrics"),
        Err(e) => warn!("{}", e),
    }
}

fn print_totals(totals: &Totals) {
    println!("=== Backlog ===");
    println!("Episodes:\t{}", totals.episodes);
    println!("Duration:\t{} minutes", totals.minutes);
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
