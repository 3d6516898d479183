//! HTTP feed collector for platform gateways that serve raw records as JSON.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::info;
use vipwatch_core::{Platform, RawRecord};

use crate::{CollectionError, SourceCollector};

/// GETs `{url}?limit=N` and expects a JSON array of raw records.
pub struct HttpFeedCollector {
    client: reqwest::Client,
    platform: Platform,
    name: String,
    url: String,
}

impl HttpFeedCollector {
    /// `url` should be like `http://localhost:8080/feed/twitter`.
    pub fn new(platform: Platform, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            platform,
            name: format!("{platform}:{url}"),
            url,
        }
    }

    fn request_url(&self, limit: usize) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}limit={limit}", self.url)
    }
}

#[async_trait]
impl SourceCollector for HttpFeedCollector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawRecord>, CollectionError> {
        let url = self.request_url(limit);
        info!(url = %url, "fetching feed");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectionError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollectionError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let mut records: Vec<RawRecord> = resp.json().await?;
        records.truncate(limit);
        info!(source = %self.name, count = records.len(), "fetched feed");
        Ok(records)
    }
}
