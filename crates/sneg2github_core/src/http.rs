use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

use crate::config::AppConfig;

/// Anything that can hand back the HTML of a forum page.
pub trait PageSource {
    fn fetch_html(&mut self, url: &str) -> Result<String>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct PageClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub request_delay_ms: u64,
    pub retry_delay_ms: u64,
}

impl PageClientConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            request_delay_ms: config.request_delay_ms(),
            retry_delay_ms: 1_000,
        }
    }
}

/// Blocking page fetcher: polite delay between requests, one retry on transient failures.
pub struct PageClient {
    client: Client,
    config: PageClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl PageClient {
    pub fn new(config: PageClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build forum HTTP client")?;
        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl PageSource for PageClient {
    fn fetch_html(&mut self, url: &str) -> Result<String> {
        const MAX_RETRIES: usize = 1;

        for attempt in 0..=MAX_RETRIES {
            self.apply_rate_limit();
            debug!(url, attempt, "GET forum page");
            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < MAX_RETRIES && is_retryable_status(status) {
                            sleep(Duration::from_millis(self.config.retry_delay_ms));
                            continue;
                        }
                        bail!("GET {url} failed with HTTP {status}");
                    }
                    return response
                        .text()
                        .with_context(|| format!("failed to read body of {url}"));
                }
                Err(error) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&error) {
                        sleep(Duration::from_millis(self.config.retry_delay_ms));
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to GET {url}"));
                }
            }
        }

        bail!("GET {url} exhausted retry budget")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
