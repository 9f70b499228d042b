//! HTTP client for market scraping
//!
//! Wraps reqwest with the behaviors every market source needs: browser-like
//! default headers, optional per-market headers (API bearer tokens), a
//! randomized inter-request delay so traversals do not hammer the source,
//! and retry with exponential backoff on 429/5xx and transport errors.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::infrastructure::config::HttpConfig;

pub struct HttpClient {
    client: Client,
    config: HttpConfig,
    extra_headers: HeaderMap,
}

impl HttpClient {
    /// Create a client with the configured user agent and timeout.
    pub fn new(config: HttpConfig) -> Result<Self> {
        Self::with_headers(config, &[])
    }

    /// Create a client that sends additional headers on every request
    /// (API markets pass their bearer tokens here).
    pub fn with_headers(config: HttpConfig, headers: &[(&str, &str)]) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("invalid user agent")?,
        );
        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
        );

        let mut extra_headers = HeaderMap::new();
        for (name, value) in headers {
            let name: HeaderName = name
                .parse()
                .with_context(|| format!("invalid header name '{name}'"))?;
            let value =
                HeaderValue::from_str(value).with_context(|| format!("invalid value for {name}"))?;
            extra_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(default_headers)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            extra_headers,
        })
    }

    /// GET a URL after a randomized delay, retrying 429/5xx and transport
    /// errors with exponential backoff.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.random_delay().await;

        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .client
                .get(url)
                .headers(self.extra_headers.clone())
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    debug!(url, status = %response.status(), "fetched");
                    return Ok(response);
                }
                Ok(response) if is_retryable(response.status()) && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        url,
                        status = %response.status(),
                        attempt = attempt + 1,
                        "retryable status, backing off {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(response) => {
                    anyhow::bail!(
                        "HTTP request failed with status {}: {url}",
                        response.status()
                    );
                }
                Err(error) if attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        "transport error ({error}), backing off {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("failed to fetch {url}"));
                }
            }
        }
    }

    /// GET and return the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {url}"))
    }

    /// GET and deserialize a JSON response body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode JSON response from {url}"))
    }

    async fn random_delay(&self) {
        let HttpConfig {
            delay_min_ms,
            delay_max_ms,
            ..
        } = self.config;
        if delay_max_ms == 0 {
            return;
        }
        let span = delay_max_ms.saturating_sub(delay_min_ms).max(1);
        let millis = delay_min_ms + fastrand::u64(0..span);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn backoff(&self, attempt: u32) -> Duration {
        // 0.8s, 1.6s, 3.2s, ...
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(1 << attempt))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
