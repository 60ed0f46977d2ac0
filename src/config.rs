//! Configuration for a harvest run.

use crate::error::ConfigError;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder used in `source_url_template` for the source name.
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Configuration for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Channel names to harvest from.
    pub sources: Vec<String>,
    /// URL template; `{source}` is replaced by each source name.
    pub source_url_template: String,
    /// Timeout for a single page retrieval attempt.
    pub fetch_timeout: Duration,
    /// Number of retrieval attempts per source.
    pub fetch_retries: usize,
    /// Delay between retrieval attempts.
    pub retry_delay: Duration,
    /// Maximum number of sources retrieved at the same time.
    pub fetch_concurrency: usize,
    /// Timeout for a single reachability probe.
    pub probe_timeout: Duration,
    /// Maximum number of probes in flight.
    pub probe_concurrency: usize,
    /// Size of the reachable-endpoint shortlist.
    pub reachable_cap: usize,
    /// Size of the isolated (vmess) output.
    pub isolated_cap: usize,
    /// Whether literal-IP endpoints are probed for reachability.
    pub enable_reachability_check: bool,
    /// Label fragments that mark a label as a channel advertisement.
    pub placeholder_markers: Vec<String>,
    /// Key of the persisted link store.
    pub store_key: String,
    /// Key of the isolated-protocol output.
    pub isolated_key: String,
    /// Key of the reachable-endpoint output.
    pub reachable_key: String,
    /// Local path of the GeoLite2 country database.
    pub geoip_db_path: PathBuf,
    /// URL the country database is downloaded from when missing.
    pub geoip_db_url: String,
    /// Timeout for the whole country database download.
    pub geoip_download_timeout: Duration,
}

impl HarvestConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder::new()
    }

    /// Build the retrieval URL for a source, or `None` if the result is not a valid URL.
    pub fn source_url(&self, source: &str) -> Option<url::Url> {
        let raw = self
            .source_url_template
            .replace(SOURCE_PLACEHOLDER, source.trim());
        url::Url::parse(&raw).ok()
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfigBuilder::new().build()
    }
}

/// Builder for `HarvestConfig`.
pub struct HarvestConfigBuilder {
    sources: Vec<String>,
    source_url_template: Option<String>,
    fetch_timeout: Option<Duration>,
    fetch_retries: Option<usize>,
    retry_delay: Option<Duration>,
    fetch_concurrency: Option<usize>,
    probe_timeout: Option<Duration>,
    probe_concurrency: Option<usize>,
    reachable_cap: Option<usize>,
    isolated_cap: Option<usize>,
    enable_reachability_check: Option<bool>,
    placeholder_markers: Option<Vec<String>>,
    store_key: Option<String>,
    isolated_key: Option<String>,
    reachable_key: Option<String>,
    geoip_db_path: Option<PathBuf>,
    geoip_db_url: Option<String>,
    geoip_download_timeout: Option<Duration>,
}

impl HarvestConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            source_url_template: None,
            fetch_timeout: None,
            fetch_retries: None,
            retry_delay: None,
            fetch_concurrency: None,
            probe_timeout: None,
            probe_concurrency: None,
            reachable_cap: None,
            isolated_cap: None,
            enable_reachability_check: None,
            placeholder_markers: None,
            store_key: None,
            isolated_key: None,
            reachable_key: None,
            geoip_db_path: None,
            geoip_db_url: None,
            geoip_download_timeout: None,
        }
    }

    /// Set the channel names to harvest from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the retrieval URL template. It must contain `{source}`.
    pub fn source_url_template(mut self, template: impl Into<String>) -> Self {
        self.source_url_template = Some(template.into());
        self
    }

    /// Set the timeout of a single retrieval attempt.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set the number of retrieval attempts per source.
    pub fn fetch_retries(mut self, retries: usize) -> Self {
        self.fetch_retries = Some(retries);
        self
    }

    /// Set the delay between retrieval attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set how many sources are retrieved concurrently.
    pub fn fetch_concurrency(mut self, count: usize) -> Self {
        self.fetch_concurrency = Some(count);
        self
    }

    /// Set the timeout of a reachability probe.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set how many probes may be in flight at once.
    pub fn probe_concurrency(mut self, count: usize) -> Self {
        self.probe_concurrency = Some(count);
        self
    }

    /// Set the size of the reachable-endpoint shortlist.
    pub fn reachable_cap(mut self, cap: usize) -> Self {
        self.reachable_cap = Some(cap);
        self
    }

    /// Set the size of the isolated-protocol output.
    pub fn isolated_cap(mut self, cap: usize) -> Self {
        self.isolated_cap = Some(cap);
        self
    }

    /// Enable or disable reachability probing.
    pub fn enable_reachability_check(mut self, enabled: bool) -> Self {
        self.enable_reachability_check = Some(enabled);
        self
    }

    /// Set the label fragments treated as channel advertisements.
    pub fn placeholder_markers(mut self, markers: Vec<impl Into<String>>) -> Self {
        self.placeholder_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    /// Set the key of the persisted link store.
    pub fn store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = Some(key.into());
        self
    }

    /// Set the key of the isolated-protocol output.
    pub fn isolated_key(mut self, key: impl Into<String>) -> Self {
        self.isolated_key = Some(key.into());
        self
    }

    /// Set the key of the reachable-endpoint output.
    pub fn reachable_key(mut self, key: impl Into<String>) -> Self {
        self.reachable_key = Some(key.into());
        self
    }

    /// Set the local path of the country database.
    pub fn geoip_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.geoip_db_path = Some(path.into());
        self
    }

    /// Set the URL the country database is downloaded from.
    pub fn geoip_db_url(mut self, url: impl Into<String>) -> Self {
        self.geoip_db_url = Some(url.into());
        self
    }

    /// Set the timeout of the country database download.
    pub fn geoip_download_timeout(mut self, timeout: Duration) -> Self {
        self.geoip_download_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HarvestConfig {
        HarvestConfig {
            sources: self.sources,
            source_url_template: self
                .source_url_template
                .unwrap_or_else(|| "https://t.me/s/{source}".to_string()),
            fetch_timeout: self.fetch_timeout.unwrap_or(Duration::from_secs(15)),
            fetch_retries: self.fetch_retries.unwrap_or(5).max(1),
            retry_delay: self.retry_delay.unwrap_or(Duration::from_secs(8)),
            fetch_concurrency: self.fetch_concurrency.unwrap_or(4).max(1),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_secs(5)),
            probe_concurrency: self.probe_concurrency.unwrap_or(16).max(1),
            reachable_cap: self.reachable_cap.unwrap_or(25),
            isolated_cap: self.isolated_cap.unwrap_or(25),
            enable_reachability_check: self.enable_reachability_check.unwrap_or(true),
            placeholder_markers: self
                .placeholder_markers
                .unwrap_or_else(|| vec!["t.me".to_string(), "کانال".to_string()]),
            store_key: self.store_key.unwrap_or_else(|| "2.txt".to_string()),
            isolated_key: self
                .isolated_key
                .unwrap_or_else(|| "vmess_links.txt".to_string()),
            reachable_key: self
                .reachable_key
                .unwrap_or_else(|| "reachable_links.txt".to_string()),
            geoip_db_path: self
                .geoip_db_path
                .unwrap_or_else(|| PathBuf::from("GeoLite2-Country.mmdb")),
            geoip_db_url: self
                .geoip_db_url
                .unwrap_or_else(|| "https://git.io/GeoLite2-Country.mmdb".to_string()),
            geoip_download_timeout: self
                .geoip_download_timeout
                .unwrap_or(Duration::from_secs(120)),
        }
    }
}

impl Default for HarvestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a JSON array of source names.
pub fn parse_sources(content: &str) -> Result<Vec<String>, ConfigError> {
    let sources: Vec<String> = serde_json::from_str(content)?;
    Ok(sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Load source names from a JSON file.
pub async fn load_sources(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_sources(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_batch_job() {
        let config = HarvestConfig::default();
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.fetch_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(8));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.geoip_download_timeout, Duration::from_secs(120));
        assert_eq!(config.reachable_cap, 25);
        assert_eq!(config.isolated_cap, 25);
        assert!(config.enable_reachability_check);
        assert_eq!(config.placeholder_markers, vec!["t.me", "کانال"]);
    }

    #[test]
    fn source_url_substitutes_name() {
        let config = HarvestConfig::default();
        let url = config.source_url("v2ray_configs").unwrap();
        assert_eq!(url.as_str(), "https://t.me/s/v2ray_configs");
    }

    #[test]
    fn source_url_rejects_invalid_template() {
        let config = HarvestConfig::builder()
            .source_url_template("not a url {source}")
            .build();
        assert!(config.source_url("x").is_none());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = HarvestConfig::builder()
            .fetch_concurrency(0)
            .probe_concurrency(0)
            .fetch_retries(0)
            .build();
        assert_eq!(config.fetch_concurrency, 1);
        assert_eq!(config.probe_concurrency, 1);
        assert_eq!(config.fetch_retries, 1);
    }

    #[test]
    fn parses_source_list() {
        let sources = parse_sources(r#"["alpha", " beta ", ""]"#).unwrap();
        assert_eq!(sources, vec!["alpha", "beta"]);
    }

    #[test]
    fn loads_source_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telegram-channels.json");
        std::fs::write(&path, r#"["v2ray_configs_pool", "ConfigsHubPlus"]"#).unwrap();

        let sources = tokio_test::block_on(load_sources(&path)).unwrap();
        assert_eq!(sources, vec!["v2ray_configs_pool", "ConfigsHubPlus"]);

        let missing = tokio_test::block_on(load_sources(&dir.path().join("absent.json")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn rejects_malformed_source_list() {
        assert!(matches!(
            parse_sources(r#"{"alpha": 1}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
