//! Classification of what the user asked to archive.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{ArchiverError, Result};

static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").unwrap());
static HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^@[A-Za-z0-9_.-]+$").unwrap());
static POST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Ugk[A-Za-z0-9_-]{17,57}$").unwrap());

/// An archive target after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `UC` followed by 22 characters.
    ChannelId(String),
    /// `@name`, resolved to a channel id before scraping.
    Handle(String),
    /// Legacy `/c/<name>` URL, resolved like a handle.
    CustomName(String),
    /// A single post, archived on its own.
    Post(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelId(id) => write!(f, "channel {id}"),
            Self::Handle(handle) => write!(f, "handle {handle}"),
            Self::CustomName(name) => write!(f, "custom channel name {name}"),
            Self::Post(id) => write!(f, "post {id}"),
        }
    }
}

#[must_use]
pub fn is_channel_id(value: &str) -> bool {
    CHANNEL_ID.is_match(value)
}

#[must_use]
pub fn is_post_id(value: &str) -> bool {
    POST_ID.is_match(value)
}

#[must_use]
pub fn is_handle(value: &str) -> bool {
    HANDLE.is_match(value)
}

/// Parse a channel id, handle, channel/post URL or post id.
///
/// # Errors
///
/// `Validation` if the input matches none of the accepted forms.
pub fn parse_target(input: &str) -> Result<Target> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ArchiverError::validation("target must not be empty"));
    }

    if is_channel_id(input) {
        return Ok(Target::ChannelId(input.to_string()));
    }
    if is_handle(input) {
        return Ok(Target::Handle(input.to_string()));
    }
    if is_post_id(input) {
        return Ok(Target::Post(input.to_string()));
    }

    if input.contains("youtube.com") || input.starts_with("http") {
        return parse_url(input);
    }

    Err(ArchiverError::validation(format!(
        "'{input}' is not a channel id, @handle, post id or YouTube URL"
    )))
}

fn parse_url(input: &str) -> Result<Target> {
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| ArchiverError::validation(format!("invalid URL '{input}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ArchiverError::validation(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if host != "youtube.com" && !host.ends_with(".youtube.com") {
        return Err(ArchiverError::validation(format!("'{host}' is not a YouTube host")));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let target = match segments.as_slice() {
        ["channel", id, ..] if is_channel_id(id) => Target::ChannelId((*id).to_string()),
        ["post", id, ..] if is_post_id(id) => Target::Post((*id).to_string()),
        ["c", name, ..] => Target::CustomName((*name).to_string()),
        [first, ..] if is_handle(first) => Target::Handle((*first).to_string()),
        _ => {
            return Err(ArchiverError::validation(format!(
                "could not find a channel or post in '{input}'"
            )))
        }
    };
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "UCabcdefghijklmnopqrstuv";

    #[test]
    fn test_bare_forms() {
        assert_eq!(parse_target(ID).unwrap(), Target::ChannelId(ID.to_string()));
        assert_eq!(
            parse_target(" @some.creator ").unwrap(),
            Target::Handle("@some.creator".to_string())
        );
        assert_eq!(
            parse_target("UgkxAbCdEfGhIjKlMnOpQrStUvWx").unwrap(),
            Target::Post("UgkxAbCdEfGhIjKlMnOpQrStUvWx".to_string())
        );
    }

    #[test]
    fn test_channel_id_length_is_exact() {
        assert!(!is_channel_id("UCshort"));
        assert!(!is_channel_id(&format!("{ID}x")));
        assert!(is_channel_id(ID));
    }

    #[test]
    fn test_post_id_length_bounds() {
        assert!(!is_post_id("Ugkshort"));
        assert!(is_post_id(&format!("Ugk{}", "a".repeat(17))));
        assert!(is_post_id(&format!("Ugk{}", "a".repeat(57))));
        assert!(!is_post_id(&format!("Ugk{}", "a".repeat(58))));
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            parse_target(&format!("https://www.youtube.com/channel/{ID}/community")).unwrap(),
            Target::ChannelId(ID.to_string())
        );
        assert_eq!(
            parse_target("youtube.com/@creator/posts").unwrap(),
            Target::Handle("@creator".to_string())
        );
        assert_eq!(
            parse_target("https://m.youtube.com/c/OldName").unwrap(),
            Target::CustomName("OldName".to_string())
        );
        assert_eq!(
            parse_target("https://www.youtube.com/post/UgkxAbCdEfGhIjKlMnOpQrStUvWx?si=x").unwrap(),
            Target::Post("UgkxAbCdEfGhIjKlMnOpQrStUvWx".to_string())
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_target("").is_err());
        assert!(parse_target("not a channel").is_err());
        assert!(parse_target("https://example.com/@creator").is_err());
        assert!(parse_target("https://www.youtube.com/watch?v=abc").is_err());
        assert!(parse_target("ftp://youtube.com/@creator").is_err());
    }
}
