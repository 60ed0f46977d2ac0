//! Page retrieval with bounded retry, and harvesting across all sources.

use crate::config::HarvestConfig;
use crate::error::FetchError;
use crate::extract;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::{info, warn};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

/// Source of raw page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieve the page at `url` in a single attempt.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// `PageFetcher` backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(transport)
    }
}

/// Fetch `url`, retrying up to `attempts` times with `delay` between attempts.
///
/// Returns `None` once every attempt has failed.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    attempts: usize,
    delay: Duration,
) -> Option<String> {
    for attempt in 1..=attempts {
        match fetcher.fetch(url).await {
            Ok(body) => return Some(body),
            Err(e) => {
                warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    warn!("All {} attempts to collect failed for {}", attempts, url);
    None
}

/// Fetch every configured source and extract the union of their links.
///
/// A source that cannot be retrieved contributes nothing; the others proceed.
pub async fn harvest(config: &HarvestConfig, fetcher: &dyn PageFetcher) -> HashSet<String> {
    info!("Harvesting links from {} sources", config.sources.len());

    let urls: Vec<String> = config
        .sources
        .iter()
        .filter_map(|source| match config.source_url(source) {
            Some(url) => Some(url.to_string()),
            None => {
                warn!("Skipping source {:?}: not a valid URL", source);
                None
            }
        })
        .collect();

    let results: Vec<(String, HashSet<String>)> = stream::iter(urls)
        .map(|url| async move {
            let links = fetch_with_retry(fetcher, &url, config.fetch_retries, config.retry_delay)
                .await
                .map(|page| extract::extract_links(&page))
                .unwrap_or_default();
            (url, links)
        })
        .buffer_unordered(config.fetch_concurrency)
        .collect()
        .await;

    let mut all_links = HashSet::new();
    for (url, links) in results {
        info!("Extracted {} links from {}", links.len(), url);
        all_links.extend(links);
    }

    info!("Found {} unique links across all sources", all_links.len());
    all_links
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves canned responses, failing the first `failures` attempts per URL.
    struct ScriptedFetcher {
        pages: HashMap<String, String>,
        failures: usize,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedFetcher {
        fn new(pages: &[(&str, &str)], failures: usize) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, p)| (u.to_string(), p.to_string()))
                    .collect(),
                failures,
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let call = {
                let mut calls = self.calls.lock();
                let count = calls.entry(url.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            if call <= self.failures {
                return Err(FetchError::Timeout { url: url.to_string() });
            }
            self.pages.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn page_with(code: &str) -> String {
        format!(
            r#"<div class="tgme_widget_message_text js-message_text"><code>{code}</code></div>"#
        )
    }

    #[tokio::test]
    async fn retries_until_success() {
        let fetcher = ScriptedFetcher::new(&[("https://t.me/s/a", "ok")], 2);
        let body = fetch_with_retry(&fetcher, "https://t.me/s/a", 5, Duration::ZERO).await;
        assert_eq!(body.as_deref(), Some("ok"));
        assert_eq!(fetcher.calls("https://t.me/s/a"), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let fetcher = ScriptedFetcher::new(&[], 0);
        let body = fetch_with_retry(&fetcher, "https://t.me/s/missing", 3, Duration::ZERO).await;
        assert!(body.is_none());
        assert_eq!(fetcher.calls("https://t.me/s/missing"), 3);
    }

    #[tokio::test]
    async fn harvest_tolerates_failing_sources() {
        let good = page_with("trojan://pw@198.51.100.7:443#x");
        let fetcher = ScriptedFetcher::new(&[("https://t.me/s/good", good.as_str())], 0);
        let config = HarvestConfig::builder()
            .sources(vec!["good", "dead"])
            .fetch_retries(2)
            .retry_delay(Duration::ZERO)
            .build();

        let links = harvest(&config, &fetcher).await;
        assert_eq!(links.len(), 1);
        assert!(links.contains("trojan://pw@198.51.100.7:443#x"));
        assert_eq!(fetcher.calls("https://t.me/s/dead"), 2);
    }

    #[tokio::test]
    async fn harvest_unions_sources() {
        let a = page_with("ss://k@192.0.2.1:8388#a");
        let b = page_with("ss://k@192.0.2.1:8388#a");
        let c = page_with("vmess://eyJhZGQiOiIxIn0=");
        let fetcher = ScriptedFetcher::new(
            &[
                ("https://t.me/s/a", a.as_str()),
                ("https://t.me/s/b", b.as_str()),
                ("https://t.me/s/c", c.as_str()),
            ],
            0,
        );
        let config = HarvestConfig::builder()
            .sources(vec!["a", "b", "c"])
            .retry_delay(Duration::ZERO)
            .build();

        let links = harvest(&config, &fetcher).await;
        assert_eq!(links.len(), 2);
    }
}
