//! HTTP transport with retry, backoff and rate-limit classification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, RETRY_AFTER,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;

use super::auth::CookieJar;
use super::throttle::HostThrottle;
use crate::constants::{
    CLIENT_NAME_ID, CLIENT_VERSION, DEFAULT_RATE_LIMIT_COOLDOWN_SECS, USER_AGENT, YOUTUBE_BASE_URL,
};
use crate::error::{ArchiverError, Result};

/// Sends a JSON payload and returns the decoded JSON response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `payload` to `url`.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-http(s) URL, `RateLimited` on HTTP 429 and
    /// `Network` for everything else that goes wrong.
    async fn send(&self, url: &str, payload: &Value) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::constants::DEFAULT_TIMEOUT_SECS),
            max_retries: crate::constants::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(crate::constants::DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// What went wrong with a single attempt.
enum AttemptError {
    /// Give up now with this error.
    Fatal(ArchiverError),
    /// Worth another attempt.
    Retryable { message: String, status: Option<u16> },
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
    settings: TransportSettings,
    cookies: Option<CookieJar>,
    throttle: Arc<HostThrottle>,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be constructed.
    pub fn new(
        settings: TransportSettings,
        cookies: Option<CookieJar>,
        throttle: Arc<HostThrottle>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-youtube-client-name", HeaderValue::from_static(CLIENT_NAME_ID));
        headers.insert("x-youtube-client-version", HeaderValue::from_static(CLIENT_VERSION));
        headers.insert(ORIGIN, HeaderValue::from_static(YOUTUBE_BASE_URL));
        headers.insert(REFERER, HeaderValue::from_static("https://www.youtube.com/"));

        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ArchiverError::network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            cookies: cookies.filter(|jar| !jar.is_empty()),
            throttle,
        })
    }

    #[must_use]
    pub fn throttle(&self) -> &Arc<HostThrottle> {
        &self.throttle
    }

    async fn attempt(&self, url: &Url, payload: &Value) -> std::result::Result<Value, AttemptError> {
        let host = url.host_str().unwrap_or_default();
        let _permit = self.throttle.acquire(host).await.map_err(AttemptError::Fatal)?;

        let mut request = self.client.post(url.clone()).json(payload);
        if let Some(jar) = &self.cookies {
            if let Some(cookie) = jar.cookie_header() {
                request = request.header(COOKIE, cookie);
            }
            if let Some(auth) = jar.authorization(&url.origin().ascii_serialization()) {
                request = request.header(AUTHORIZATION, auth);
            }
        }

        let response = request.send().await.map_err(|e| AttemptError::Retryable {
            message: e.to_string(),
            status: None,
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            warn!(host = %host, retry_after_secs = ?retry_after.map(|d| d.as_secs()), "Rate limited (HTTP 429)");
            self.throttle
                .cool_down(
                    host,
                    retry_after.unwrap_or(Duration::from_secs(DEFAULT_RATE_LIMIT_COOLDOWN_SECS)),
                )
                .await;
            return Err(AttemptError::Fatal(ArchiverError::RateLimited { retry_after }));
        }
        if status.is_server_error() {
            return Err(AttemptError::Retryable {
                message: format!("HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }
        if !status.is_success() {
            error!(status = status.as_u16(), url = %url, "HTTP error");
            return Err(AttemptError::Fatal(ArchiverError::network_status(
                status.as_u16(),
                format!("HTTP {status}"),
            )));
        }

        let body = response.bytes().await.map_err(|e| AttemptError::Retryable {
            message: format!("failed to read response body: {e}"),
            status: None,
        })?;

        let value: Value = serde_json::from_slice(&body).map_err(|e| {
            AttemptError::Fatal(ArchiverError::network(format!("invalid JSON response: {e}")))
        })?;

        if let Some(api_error) = value.get("error").filter(|e| e.is_object()) {
            let message = api_error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown API error");
            let code = api_error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok());
            return Err(AttemptError::Fatal(ArchiverError::Network {
                message: format!("API error: {message}"),
                status: code,
            }));
        }

        Ok(value)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, payload: &Value) -> Result<Value> {
        let parsed = Url::parse(url).map_err(|e| ArchiverError::validation(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ArchiverError::validation(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let attempts = self.settings.max_retries.saturating_add(1);
        let mut last_error = String::from("no attempt made");
        let mut last_status = None;

        for attempt in 0..attempts {
            debug!(url = %url, attempt = attempt + 1, of = attempts, "Sending request");

            match self.attempt(&parsed, payload).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable { message, status }) => {
                    warn!(url = %url, attempt = attempt + 1, error = %message, "Request failed");
                    last_error = message;
                    last_status = status;
                }
            }

            if attempt + 1 < attempts {
                let wait = backoff_delay(self.settings.retry_delay, attempt);
                debug!(wait_ms = wait.as_millis() as u64, "Retrying after backoff");
                tokio::time::sleep(wait).await;
            }
        }

        error!(url = %url, attempts, error = %last_error, "Request failed after all attempts");
        Err(ArchiverError::Network {
            message: format!("request failed after {attempts} attempts: {last_error}"),
            status: last_status,
        })
    }
}

/// `base * 2^attempt`, attempt index starting at 0.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Parse a `Retry-After` header given in seconds. HTTP-date values are ignored.
fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }

    #[test]
    fn test_parse_retry_after() {
        let v = HeaderValue::from_static("120");
        assert_eq!(parse_retry_after(Some(&v)), Some(Duration::from_secs(120)));
        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&date)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let transport = HttpTransport::new(
            TransportSettings::default(),
            None,
            Arc::new(HostThrottle::default()),
        )
        .unwrap();
        let err = transport
            .send("file:///etc/passwd", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiverError::Validation(_)));

        let err = transport
            .send("not a url", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiverError::Validation(_)));
    }
}
