use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::MarketplaceConfig;
use crate::error::{PipelineError, Result};

const MARKETPLACE_HEADER: &str = "X-EBAY-C-MARKETPLACE-ID";

/// Application keys for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_id: String,
    pub cert_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub additional_images: Vec<ImageRef>,
}

impl ItemDetails {
    /// `(index, url)` for every image: 0 is the primary, additional images count from 1.
    pub fn image_urls(&self) -> Vec<(usize, String)> {
        let primary = self
            .image
            .as_ref()
            .and_then(|i| i.image_url.clone())
            .map(|url| (0, url));
        let additional = self
            .additional_images
            .iter()
            .enumerate()
            .filter_map(|(i, img)| img.image_url.clone().map(|url| (i + 1, url)));
        primary.into_iter().chain(additional).collect()
    }
}

/// Optional filters for a listing search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
}

impl SearchQuery {
    fn params(&self, limit: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", limit.to_string()),
            ("fieldgroups", "EXTENDED".to_string()),
        ];
        if let Some(q) = self.keyword.as_deref().filter(|q| !q.is_empty()) {
            params.push(("q", q.to_string()));
        }
        if let Some(c) = self.category.as_deref().filter(|c| !c.is_empty()) {
            params.push(("category_ids", c.to_string()));
        }
        params
    }
}

/// Browse API client with bearer-token auth and retry on transient failures.
pub struct MarketplaceClient {
    http: reqwest::Client,
    config: MarketplaceConfig,
    credentials: Credentials,
    token: Option<String>,
}

fn network(url: &str, reason: impl ToString) -> PipelineError {
    PipelineError::Network {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// 429 and 5xx are worth another attempt.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

impl MarketplaceClient {
    pub fn new(config: MarketplaceConfig, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            credentials,
            token: None,
        })
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Client-credentials grant. Stores and returns the access token.
    pub async fn fetch_token(&mut self) -> Result<String> {
        let url = self.config.identity_url.clone();
        let form = [
            ("grant_type", "client_credentials"),
            ("scope", self.config.scope.as_str()),
        ];
        let response = self
            .send_with_retry(&url, || {
                self.http
                    .post(&url)
                    .basic_auth(&self.credentials.app_id, Some(&self.credentials.cert_id))
                    .form(&form)
            })
            .await
            .map_err(|e| PipelineError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Token(format!("{}: {}", status, body)));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Token(e.to_string()))?;
        let token = body
            .access_token
            .ok_or_else(|| PipelineError::Token("response has no access_token".into()))?;

        info!(
            "Access token acquired (expires in {}s)",
            body.expires_in.unwrap_or_default()
        );
        self.token = Some(token.clone());
        Ok(token)
    }

    async fn bearer(&mut self) -> Result<String> {
        match &self.token {
            Some(token) => Ok(token.clone()),
            None => self.fetch_token().await,
        }
    }

    pub async fn search(&mut self, query: &SearchQuery) -> Result<Vec<ItemSummary>> {
        let token = self.bearer().await?;
        let url = format!("{}/item_summary/search", self.config.browse_url);
        let params = query.params(self.config.search_limit);

        let response = self
            .send_with_retry(&url, || {
                self.http
                    .get(&url)
                    .query(&params)
                    .bearer_auth(&token)
                    .header(MARKETPLACE_HEADER, &self.config.marketplace_id)
            })
            .await?;
        let body: SearchResponse = Self::ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| network(&url, e))?;

        debug!(
            "Search returned {} of {} items",
            body.item_summaries.len(),
            body.total.unwrap_or_default()
        );
        Ok(body.item_summaries)
    }

    pub async fn item_details(&mut self, item_id: &str) -> Result<ItemDetails> {
        let token = self.bearer().await?;
        let url = format!("{}/item/{}", self.config.browse_url, item_id);

        let response = self
            .send_with_retry(&url, || {
                self.http
                    .get(&url)
                    .bearer_auth(&token)
                    .header(MARKETPLACE_HEADER, &self.config.marketplace_id)
            })
            .await?;
        Self::ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| network(&url, e))
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send_with_retry(url, || self.http.get(url)).await?;
        let bytes = Self::ensure_success(url, response)
            .await?
            .bytes()
            .await
            .map_err(|e| network(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn ensure_success(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(network(url, format!("HTTP {}: {}", status, body.trim())))
    }

    /// Send the request built by `build`, retrying connect errors, timeouts, 429 and 5xx
    /// with exponential backoff. The last response is returned as-is once retries run out.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut attempt = 0;
        loop {
            let outcome = build().send().await;
            let transient = match &outcome {
                Ok(response) => is_transient_status(response.status()),
                Err(e) => is_transient_error(e),
            };
            if !transient || attempt >= self.config.max_retries {
                return outcome.map_err(|e| network(url, e));
            }

            attempt += 1;
            match &outcome {
                Ok(response) => warn!(
                    "{} returned {}; retry {}/{} in {:?}",
                    url,
                    response.status(),
                    attempt,
                    self.config.max_retries,
                    backoff
                ),
                Err(e) => warn!(
                    "{} failed: {}; retry {}/{} in {:?}",
                    url, e, attempt, self.config.max_retries, backoff
                ),
            }
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}
