use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
    redirect::Policy,
};
use tracing::{debug, instrument};

use crate::error::{Result, ValidatorError};

/// Fast, bodiless check that a stream URL answers at all
#[async_trait]
pub trait QuickCheck: Send + Sync {
    /// Returns the response status when the URL is reachable
    ///
    /// # Errors
    /// [`ValidatorError::Network`] on transport failure or an out-of-range status
    async fn check(&self, url: &str) -> Result<StatusCode>;
}

/// Any status in `[200, 400)` counts, including unfollowed redirects
#[must_use]
pub fn is_reachable(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

/// [`QuickCheck`] over HTTP `HEAD`
#[derive(Debug, Clone)]
pub struct HttpQuickCheck {
    client: reqwest::Client,
}

impl HttpQuickCheck {
    /// # Errors
    /// [`ValidatorError::Configuration`] if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: init_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl QuickCheck for HttpQuickCheck {
    #[instrument(skip(self))]
    async fn check(&self, url: &str) -> Result<StatusCode> {
        let res = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ValidatorError::Network {
                url: url.to_string(),
                reason: describe_transport_error(&e),
            })?;

        let status = res.status();
        debug!("HEAD {url} -> {status}");
        if !is_reachable(status) {
            return Err(ValidatorError::Network {
                url: url.to_string(),
                reason: format!("HTTP status {status}"),
            });
        }

        Ok(status)
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else if e.is_builder() {
        format!("unsupported URL: {e}")
    } else {
        e.to_string()
    }
}

/// Builds the client used for quick checks. Redirects are not followed
fn init_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let user_agent = HeaderValue::from_str(&format!(
        "{}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ))
    .map_err(|e| ValidatorError::Configuration(format!("Invalid User-Agent header: {e}")))?;
    headers.insert(USER_AGENT, user_agent);

    reqwest::Client::builder()
        .default_headers(headers)
        .redirect(Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| ValidatorError::Configuration(format!("Unable to build HTTP client: {e}")))
}
