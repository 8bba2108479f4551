//! Search-engine ping fired after a post goes live.
//!
//! Strictly best effort: the lifecycle service logs and swallows whatever
//! this returns. A slow or dead ping endpoint must never delay a
//! publication, hence the short request timeout.

use async_trait::async_trait;

use lexfront_core::config::SearchConfig;
use lexfront_core::error::{LexfrontError, Result};
use lexfront_lifecycle::notify::SearchIndexNotifier;

/// HTTP pinger for the configured search endpoint.
pub struct SearchPing {
    client: reqwest::Client,
    ping_url: String,
    enabled: bool,
}

impl SearchPing {
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            ping_url: config.ping_url.clone(),
            enabled: config.enabled,
        }
    }

    /// Substitute the published page URL into the ping template.
    fn ping_target(&self, url: &str) -> String {
        self.ping_url.replace("{url}", url)
    }
}

#[async_trait]
impl SearchIndexNotifier for SearchPing {
    async fn notify(&self, url: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let target = self.ping_target(url);
        let resp = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| LexfrontError::Dispatch(format!("Search ping {target}: {e}")))?;
        if !resp.status().is_success() {
            return Err(LexfrontError::Dispatch(format!(
                "Search ping {target}: HTTP {}",
                resp.status()
            )));
        }
        tracing::debug!("🔍 Search index pinged for {url}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_target_substitution() {
        let ping = SearchPing::new(&SearchConfig {
            enabled: true,
            ping_url: "https://search.example/ping?u={url}".into(),
        });
        assert_eq!(
            ping.ping_target("https://nguyen-law.vn/blog/news"),
            "https://search.example/ping?u=https://nguyen-law.vn/blog/news"
        );
    }

    #[tokio::test]
    async fn test_disabled_ping_is_noop() {
        let ping = SearchPing::new(&SearchConfig {
            enabled: false,
            ping_url: "https://127.0.0.1:1/unreachable?u={url}".into(),
        });
        // Never touches the network when disabled.
        ping.notify("https://x/blog/y").await.unwrap();
    }
}
