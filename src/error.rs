use reqwest::StatusCode;

/// Failures of the I/O around extraction. Parsing itself never fails.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Login rejected with status {0}")]
    AuthRejected(StatusCode),

    #[error("Login request failed: {0}")]
    AuthRequest(#[source] reqwest::Error),

    #[error("Listing fetch returned status {0}")]
    FetchStatus(StatusCode),

    #[error("Listing fetch failed: {0}")]
    Fetch(#[source] reqwest::Error),

    #[error("Could not append to stats log {path}: {source}")]
    LogAppend {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read stats log {path}: {source}")]
    LogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics store returned status {0}")]
    MetricsStatus(StatusCode),

    #[error("Metrics push failed: {0}")]
    Metrics(#[source] reqwest::Error),

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
