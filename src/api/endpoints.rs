//! Request payload builders and the endpoint client.
//!
//! The payload builders are pure functions so the exact wire shape can be
//! checked without a server. `InnertubeClient` pairs them with a
//! [`Transport`] and the `browse`/`next` endpoint URLs.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

use super::transport::Transport;
use crate::constants::{
    CLIENT_LOCALE, CLIENT_NAME, CLIENT_VERSION, COMMUNITY_TAB_PARAMS, POST_DETAIL_BROWSE_ID,
};
use crate::error::{ArchiverError, Result};

/// Leading tag bytes of the post-detail `params` record.
const POST_DETAIL_TAG: [u8; 4] = [0xC2, 0x03, 0x5A, 0x12];
const POST_ID_TAG: u8 = 0x1A;
const TRAILING_CHANNEL_TAG: u8 = 0x5A;

/// The `context` envelope shared by every request.
#[must_use]
pub fn client_context() -> Value {
    json!({
        "client": {
            "hl": CLIENT_LOCALE,
            "clientName": CLIENT_NAME,
            "clientVersion": CLIENT_VERSION,
        },
        "user": {
            "lockedSafetyMode": false,
        },
    })
}

/// Payload for the first page of a channel's community tab.
///
/// # Errors
///
/// `Validation` if `channel_id` is empty.
pub fn initial_feed_payload(channel_id: &str) -> Result<Value> {
    require("channel id", channel_id)?;
    Ok(json!({
        "context": client_context(),
        "browseId": channel_id,
        "params": COMMUNITY_TAB_PARAMS,
    }))
}

/// Payload for any continuation fetch (posts, comments or replies).
///
/// # Errors
///
/// `Validation` if `token` is empty.
pub fn continuation_payload(token: &str) -> Result<Value> {
    require("continuation token", token)?;
    Ok(json!({
        "context": client_context(),
        "continuation": token,
    }))
}

/// Payload for a single post's detail page.
///
/// # Errors
///
/// `Validation` if either id is empty or too long to length-prefix.
pub fn post_detail_payload(channel_id: &str, post_id: &str) -> Result<Value> {
    Ok(json!({
        "context": client_context(),
        "browseId": POST_DETAIL_BROWSE_ID,
        "params": post_detail_params(channel_id, post_id)?,
    }))
}

/// Base64 of the length-prefixed record selecting one post:
/// `C2 03 5A 12 | len ch | 1A len post | 5A len ch`.
///
/// # Errors
///
/// `Validation` if either id is empty or longer than 255 bytes.
pub fn post_detail_params(channel_id: &str, post_id: &str) -> Result<String> {
    require("channel id", channel_id)?;
    require("post id", post_id)?;

    let channel = channel_id.as_bytes();
    let post = post_id.as_bytes();
    let channel_len = length_prefix("channel id", channel)?;
    let post_len = length_prefix("post id", post)?;

    let mut record = Vec::with_capacity(POST_DETAIL_TAG.len() + 5 + channel.len() * 2 + post.len());
    record.extend_from_slice(&POST_DETAIL_TAG);
    record.push(channel_len);
    record.extend_from_slice(channel);
    record.push(POST_ID_TAG);
    record.push(post_len);
    record.extend_from_slice(post);
    record.push(TRAILING_CHANNEL_TAG);
    record.push(channel_len);
    record.extend_from_slice(channel);

    Ok(STANDARD.encode(record))
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ArchiverError::validation(format!("{what} cannot be empty")));
    }
    Ok(())
}

fn length_prefix(what: &str, bytes: &[u8]) -> Result<u8> {
    u8::try_from(bytes.len())
        .map_err(|_| ArchiverError::validation(format!("{what} is too long ({} bytes)", bytes.len())))
}

/// Client for the four logical API operations.
#[derive(Clone)]
pub struct InnertubeClient {
    transport: Arc<dyn Transport>,
    browse_url: String,
    next_url: String,
}

impl InnertubeClient {
    /// `api_base` is the API root, e.g. `https://www.youtube.com/youtubei/v1`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        Self {
            transport,
            browse_url: format!("{base}/browse"),
            next_url: format!("{base}/next"),
        }
    }

    /// First page of a channel's community tab.
    pub async fn initial_feed(&self, channel_id: &str) -> Result<Value> {
        let payload = initial_feed_payload(channel_id)?;
        debug!(channel_id = %channel_id, "Fetching initial community feed");
        self.transport.send(&self.browse_url, &payload).await
    }

    /// Posts or comments continuation against the browse endpoint.
    pub async fn continuation(&self, token: &str) -> Result<Value> {
        let payload = continuation_payload(token)?;
        debug!(token = %abbreviate(token), "Fetching continuation");
        self.transport.send(&self.browse_url, &payload).await
    }

    /// Reply continuation against the next endpoint.
    pub async fn reply_continuation(&self, token: &str) -> Result<Value> {
        let payload = continuation_payload(token)?;
        debug!(token = %abbreviate(token), "Fetching reply continuation");
        self.transport.send(&self.next_url, &payload).await
    }

    /// Detail page for one post, which carries its comment section.
    pub async fn post_detail(&self, channel_id: &str, post_id: &str) -> Result<Value> {
        let payload = post_detail_payload(channel_id, post_id)?;
        debug!(channel_id = %channel_id, post_id = %post_id, "Fetching post detail");
        self.transport.send(&self.browse_url, &payload).await
    }
}

/// First 20 characters of a token, for logs.
fn abbreviate(token: &str) -> &str {
    token.char_indices().nth(20).map_or(token, |(i, _)| &token[..i])
}
