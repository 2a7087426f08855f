//! Channel id lookup from public channel and post pages.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::api::CookieJar;
use crate::constants::USER_AGENT;
use crate::error::{ArchiverError, Result};
use crate::target::is_channel_id;

/// Patterns that carry the page owner's channel id, most specific first.
static CHANNEL_PAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""externalId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#"<meta\s+itemprop="identifier"\s+content="(UC[A-Za-z0-9_-]{22})""#,
        r#""channelId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#"<link\s+rel="canonical"\s+href="[^"]*/channel/(UC[A-Za-z0-9_-]{22})""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// On a post page the author's browse endpoint comes before any other
/// channel reference.
static POST_PAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""authorEndpoint"\s*:\s*\{[^}]*?"browseId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#""browseEndpoint"\s*:\s*\{\s*"browseId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#""channelId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// First channel id captured by any of `patterns`, in pattern order.
fn first_match(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(html)?.get(1).map(|m| m.as_str().to_string()))
        .filter(|id| is_channel_id(id))
}

/// Resolves handles and post ids to the owning channel id.
#[derive(Clone)]
pub struct ChannelResolver {
    client: Client,
    site_base: String,
    cookie_header: Option<String>,
}

impl ChannelResolver {
    /// # Errors
    ///
    /// `Network` if the HTTP client cannot be built.
    pub fn new(site_base: &str, timeout: Duration, cookies: Option<&CookieJar>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ArchiverError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            site_base: site_base.trim_end_matches('/').to_string(),
            cookie_header: cookies.and_then(CookieJar::cookie_header),
        })
    }

    async fn fetch_page(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.site_base);
        debug!(url = %url, "Fetching page for channel lookup");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-GB,en;q=0.9");
        if let Some(cookie) = &self.cookie_header {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArchiverError::network(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ArchiverError::NotFound(url));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ArchiverError::RateLimited { retry_after: None });
        }
        if !status.is_success() {
            return Err(ArchiverError::network_status(
                status.as_u16(),
                format!("HTTP {status} from {url}"),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| ArchiverError::network(format!("failed to read {url}: {e}")))
    }

    /// Channel id behind an `@handle`. The leading `@` is optional.
    ///
    /// # Errors
    ///
    /// `NotFound` if the page does not exist or names no channel, or the
    /// network error of the page fetch.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(ArchiverError::validation("handle must not be empty"));
        }
        let path = if handle.starts_with('@') {
            format!("/{handle}")
        } else {
            format!("/@{handle}")
        };
        self.resolve_path(&path, handle).await
    }

    /// Channel id behind a legacy `/c/<name>` URL.
    ///
    /// # Errors
    ///
    /// As [`Self::resolve_handle`].
    pub async fn resolve_custom_name(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(ArchiverError::validation("channel name must not be empty"));
        }
        self.resolve_path(&format!("/c/{name}"), name).await
    }

    async fn resolve_path(&self, path: &str, label: &str) -> Result<String> {
        let html = self.fetch_page(path).await?;
        let id = first_match(&html, &CHANNEL_PAGE_PATTERNS)
            .ok_or_else(|| ArchiverError::NotFound(format!("no channel id on page for {label}")))?;
        info!(name = %label, channel_id = %id, "Resolved channel");
        Ok(id)
    }

    /// Channel id of the author of `post_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the post page names no channel, or the network error
    /// of the page fetch.
    pub async fn resolve_post_channel(&self, post_id: &str) -> Result<String> {
        if post_id.is_empty() {
            return Err(ArchiverError::validation("post id must not be empty"));
        }
        let html = self.fetch_page(&format!("/post/{post_id}")).await?;
        let id = first_match(&html, &POST_PAGE_PATTERNS)
            .or_else(|| first_match(&html, &CHANNEL_PAGE_PATTERNS))
            .ok_or_else(|| ArchiverError::NotFound(format!("no channel id on page for post {post_id}")))?;
        info!(post_id = %post_id, channel_id = %id, "Resolved post channel");
        Ok(id)
    }
}
