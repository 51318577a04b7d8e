use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::app::ports::{FetchedPage, Fetcher};
use crate::config::HttpConfig;
use crate::constants;
use crate::error::{ExtractorError, Result};

/// Page fetcher sending a fixed descriptive User-Agent and Accept headers.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ExtractorError::config(format!("invalid http.user_agent: {}", e)))?;
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static(constants::ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(constants::ACCEPT_LANGUAGE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, url: &Url) -> Result<FetchedPage> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(url = %url, status, bytes = body.len(), "Fetched page");
        Ok(FetchedPage { status, body })
    }
}
