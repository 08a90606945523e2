use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::config::DataConfig;

/// Source of raw wiki HTML. The CLI uses [`WikiClient`]; tests hand in canned pages.
pub trait PageFetcher {
    fn fetch_page(&mut self, url: &str) -> Result<String>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct WikiClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl WikiClientConfig {
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            rate_limit_ms: config.rate_limit_ms(),
            max_retries: config.max_retries(),
            retry_delay_ms: 500,
        }
    }
}

pub struct WikiClient {
    client: Client,
    config: WikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl WikiClient {
    pub fn new(config: WikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build wiki HTTP client")?;
        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn from_config(config: &DataConfig) -> Result<Self> {
        Self::new(WikiClientConfig::from_config(config))
    }

    /// Keeps successive requests at least `rate_limit_ms` apart.
    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        sleep(Duration::from_millis(
            self.config
                .retry_delay_ms
                .saturating_mul(attempt as u64 + 1),
        ));
    }
}

impl PageFetcher for WikiClient {
    fn fetch_page(&mut self, url: &str) -> Result<String> {
        info!(url, "fetching wiki page");
        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            let response = self
                .client
                .get(url)
                .header("User-Agent", self.config.user_agent.clone())
                .header("Accept", "text/html, text/plain;q=0.9,*/*;q=0.1")
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            debug!(url, %status, attempt, "retrying wiki request");
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("HTTP {} while fetching {}", status.as_u16(), url);
                    }
                    return response
                        .text()
                        .with_context(|| format!("failed to read response body from {url}"));
                }
                Err(error) => {
                    if attempt < self.config.max_retries {
                        debug!(url, %error, attempt, "retrying wiki request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to fetch {url}"));
                }
            }
        }

        bail!("wiki request exhausted retry budget for {url}")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use anyhow::{Result, bail};

    use super::PageFetcher;

    /// Serves canned HTML by URL; unknown URLs fail like an HTTP 404.
    #[derive(Default)]
    pub struct StaticPages {
        pub pages: BTreeMap<String, String>,
        pub requested: Vec<String>,
    }

    impl StaticPages {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    impl PageFetcher for StaticPages {
        fn fetch_page(&mut self, url: &str) -> Result<String> {
            self.requested.push(url.to_string());
            match self.pages.get(url) {
                Some(html) => Ok(html.clone()),
                None => bail!("HTTP 404 while fetching {url}"),
            }
        }

        fn request_count(&self) -> usize {
            self.requested.len()
        }
    }
}
