//! Session-cookie authentication.
//!
//! Cookies come from a Netscape-format cookie file (as exported by browser
//! extensions and yt-dlp). When a `SAPISID` cookie is present each request
//! also carries a `SAPISIDHASH` authorization header, which must be
//! recomputed per request because it embeds the current unix time.

use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Cookie names that carry the session secret, in lookup order.
const SAPISID_COOKIES: &[&str] = &["SAPISID", "__Secure-3PAPISID"];

/// Domains whose cookies are kept.
const COOKIE_DOMAINS: &[&str] = &["youtube.com", "google.com"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Read and parse a Netscape cookie file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub async fn from_netscape_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let jar = Self::parse_netscape(&contents);
        if jar.is_empty() {
            warn!(path = %path.display(), "No YouTube/Google cookies found in cookie file");
        } else {
            info!(path = %path.display(), count = jar.len(), "Loaded cookies");
        }
        Ok(jar)
    }

    /// Parse Netscape cookie lines: `domain flag path secure expiry name value`.
    ///
    /// Malformed lines are skipped. A later cookie with the same name
    /// replaces an earlier one.
    #[must_use]
    pub fn parse_netscape(contents: &str) -> Self {
        let mut jar = Self::default();
        for (line_num, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            // `#HttpOnly_` prefixed lines are real cookies, not comments
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 7 {
                debug!(line = line_num + 1, "Skipping malformed cookie line");
                continue;
            }

            let domain = parts[0];
            if !COOKIE_DOMAINS.iter().any(|d| domain.contains(d)) {
                continue;
            }
            jar.insert(parts[5], parts[6]);
        }
        jar
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        if let Some(existing) = self.cookies.iter_mut().find(|(n, _)| n == name) {
            existing.1 = value.to_string();
        } else {
            self.cookies.push((name.to_string(), value.to_string()));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value, or `None` for an empty jar.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// `Authorization` header for `origin` at the current time, if the jar
    /// holds a session secret.
    #[must_use]
    pub fn authorization(&self, origin: &str) -> Option<String> {
        let secret = SAPISID_COOKIES.iter().find_map(|name| self.get(name))?;
        Some(sapisid_hash(chrono::Utc::now().timestamp(), secret, origin))
    }
}

/// `SAPISIDHASH <ts>_<sha1("<ts> <secret> <origin>")>`.
#[must_use]
pub fn sapisid_hash(timestamp: i64, secret: &str, origin: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{timestamp} {secret} {origin}").as_bytes());
    format!("SAPISIDHASH {timestamp}_{}", hex::encode(hasher.finalize()))
}
