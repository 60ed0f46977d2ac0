//! Error types for the proxy-link-harvester crate.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single page retrieval attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The attempt did not finish within the configured timeout.
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    /// The server answered with a non-success status.
    #[error("fetching {url} returned status {status}")]
    Status { url: String, status: u16 },
    /// The request failed below the HTTP layer.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure reading or writing persisted output.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure obtaining or opening the country database.
#[derive(Debug, Error)]
pub enum GeoIpError {
    #[error("failed to download country database: {0}")]
    Download(#[from] reqwest::Error),
    #[error("country database I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid country database: {0}")]
    Database(#[from] maxminddb::MaxMindDBError),
}

/// Failure loading the source list.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read source list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed source list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fatal error aborting a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    GeoIp(#[from] GeoIpError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
