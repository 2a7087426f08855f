use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::api::{HostThrottle, TransportSettings};
use crate::constants::{
    DEFAULT_COMMENT_BATCH_DELAY_MS, DEFAULT_MAX_COMMENTS, DEFAULT_MAX_REPLIES,
    DEFAULT_MAX_RETRIES, DEFAULT_REPLY_BATCH_DELAY_MS, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TIMEOUT_SECS, YOUTUBE_API_BASE_URL, YOUTUBE_BASE_URL,
};
use crate::scraper::ScrapeSettings;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "post_archiver.toml";
/// Directory under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "post-archiver";
/// Upper bound accepted for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as number: {source}")]
    ParseFloat {
        name: String,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// What to fetch and how politely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// `None` archives every post.
    pub max_posts: Option<usize>,
    pub extract_comments: bool,
    pub max_comments_per_post: usize,
    pub max_replies_per_comment: usize,
    pub download_images: bool,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub comment_batch_delay_ms: u64,
    pub reply_batch_delay_ms: u64,
    pub comment_concurrency: usize,
    pub api_base_url: String,
    pub site_base_url: String,
    pub cookies_file: Option<PathBuf>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_posts: None,
            extract_comments: false,
            max_comments_per_post: DEFAULT_MAX_COMMENTS,
            max_replies_per_comment: DEFAULT_MAX_REPLIES,
            download_images: false,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            comment_batch_delay_ms: DEFAULT_COMMENT_BATCH_DELAY_MS,
            reply_batch_delay_ms: DEFAULT_REPLY_BATCH_DELAY_MS,
            comment_concurrency: 1,
            api_base_url: YOUTUBE_API_BASE_URL.to_string(),
            site_base_url: YOUTUBE_BASE_URL.to_string(),
            cookies_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Defaults to the working directory.
    pub output_dir: Option<PathBuf>,
    pub pretty_print: bool,
    pub include_summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            pretty_print: true,
            include_summary: true,
        }
    }
}

/// Application configuration: config file, then environment, then CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_file: Option<PathBuf>,
    pub scraping: ScrapingConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load from `explicit`, else the first default location that exists,
    /// else defaults; then apply `POST_ARCHIVER_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed, or an
    /// environment variable holds an invalid value.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "Loading config file");
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        let body = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        std::fs::write(path, body).map_err(|e| write_err(e.to_string()))
    }

    /// Override fields from `POST_ARCHIVER_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns an error for a variable that does not parse.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let s = &mut self.scraping;
        if let Some(max) = optional_env("POST_ARCHIVER_MAX_POSTS") {
            let max = parse_usize("POST_ARCHIVER_MAX_POSTS", &max)?;
            s.max_posts = (max > 0).then_some(max);
        }
        s.extract_comments = parse_env_bool("POST_ARCHIVER_EXTRACT_COMMENTS", s.extract_comments)?;
        s.max_comments_per_post =
            parse_env_usize("POST_ARCHIVER_MAX_COMMENTS", s.max_comments_per_post)?;
        s.max_replies_per_comment =
            parse_env_usize("POST_ARCHIVER_MAX_REPLIES", s.max_replies_per_comment)?;
        s.download_images = parse_env_bool("POST_ARCHIVER_DOWNLOAD_IMAGES", s.download_images)?;
        s.request_timeout_secs = parse_env_u64("POST_ARCHIVER_TIMEOUT_SECS", s.request_timeout_secs)?;
        s.max_retries = parse_env_u32("POST_ARCHIVER_MAX_RETRIES", s.max_retries)?;
        s.retry_delay_secs = parse_env_f64("POST_ARCHIVER_RETRY_DELAY_SECS", s.retry_delay_secs)?;
        s.comment_batch_delay_ms =
            parse_env_u64("POST_ARCHIVER_COMMENT_DELAY_MS", s.comment_batch_delay_ms)?;
        s.reply_batch_delay_ms = parse_env_u64("POST_ARCHIVER_REPLY_DELAY_MS", s.reply_batch_delay_ms)?;
        s.comment_concurrency =
            parse_env_usize("POST_ARCHIVER_COMMENT_CONCURRENCY", s.comment_concurrency)?;
        s.api_base_url = env_or_default("POST_ARCHIVER_API_BASE_URL", &s.api_base_url);
        s.site_base_url = env_or_default("POST_ARCHIVER_SITE_BASE_URL", &s.site_base_url);
        if let Some(path) = optional_env("POST_ARCHIVER_COOKIES_FILE") {
            s.cookies_file = Some(PathBuf::from(path));
        }

        let o = &mut self.output;
        if let Some(dir) = optional_env("POST_ARCHIVER_OUTPUT_DIR") {
            o.output_dir = Some(PathBuf::from(dir));
        }
        o.pretty_print = parse_env_bool("POST_ARCHIVER_PRETTY_PRINT", o.pretty_print)?;
        o.include_summary = parse_env_bool("POST_ARCHIVER_INCLUDE_SUMMARY", o.include_summary)?;

        if let Some(path) = optional_env("POST_ARCHIVER_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scraping;
        if s.extract_comments && s.max_comments_per_post == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_comments_per_post".to_string(),
                message: "must be at least 1 when comments are extracted".to_string(),
            });
        }
        if s.comment_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "comment_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if s.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidValue {
                name: "max_retries".to_string(),
                message: format!("must be at most {MAX_RETRIES_LIMIT}, got {}", s.max_retries),
            });
        }
        if s.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "request_timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !s.retry_delay_secs.is_finite() || s.retry_delay_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "retry_delay_secs".to_string(),
                message: format!("must be a non-negative number, got {}", s.retry_delay_secs),
            });
        }
        for (name, value) in [("api_base_url", &s.api_base_url), ("site_base_url", &s.site_base_url)] {
            let scheme_ok = Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !scheme_ok {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("must be an http(s) URL, got '{value}'"),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            timeout: Duration::from_secs(self.scraping.request_timeout_secs),
            max_retries: self.scraping.max_retries,
            retry_delay: self.retry_delay(),
        }
    }

    /// One request slot per concurrent comment worker on each host.
    #[must_use]
    pub fn host_throttle(&self) -> HostThrottle {
        HostThrottle::new(self.scraping.comment_concurrency)
    }

    #[must_use]
    pub fn scrape_settings(&self) -> ScrapeSettings {
        let s = &self.scraping;
        ScrapeSettings {
            max_posts: s.max_posts,
            extract_comments: s.extract_comments,
            max_comments: s.max_comments_per_post,
            max_replies: s.max_replies_per_comment,
            post_batch_delay: self.retry_delay(),
            comment_batch_delay: Duration::from_millis(s.comment_batch_delay_ms),
            reply_batch_delay: Duration::from_millis(s.reply_batch_delay_ms),
            comment_concurrency: s.comment_concurrency,
            site_base_url: s.site_base_url.clone(),
        }
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.scraping.retry_delay_secs).unwrap_or_default()
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Scraping settings as recorded in the archive metadata.
    #[must_use]
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::to_value(&self.scraping).unwrap_or_default()
    }
}

/// Config files checked when none is given explicitly, in order.
#[must_use]
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join("config.toml"));
    }
    locations
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|e| ConfigError::ParseInt {
        name: name.to_string(),
        source: e,
    })
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_usize(name, &val),
        _ => Ok(default),
    }
}

fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseFloat {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.scraping.max_comments_per_post, 100);
        assert_eq!(config.scraping.max_replies_per_comment, 200);
        assert!(config.output.pretty_print);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.scraping.comment_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraping.extract_comments = true;
        config.scraping.max_comments_per_post = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraping.api_base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraping.retry_delay_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraping.max_retries = u32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_host_throttle_matches_comment_concurrency() {
        let mut config = Config::default();
        config.scraping.comment_concurrency = 2;
        let throttle = config.host_throttle();

        let _first = throttle.acquire("www.youtube.com").await.unwrap();
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            throttle.acquire("www.youtube.com"),
        )
        .await;
        assert!(second.is_ok(), "second worker should get its own slot");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let mut config = Config::default();
        config.scraping.max_posts = Some(25);
        config.scraping.extract_comments = true;
        config.output.output_dir = Some(PathBuf::from("/tmp/archives"));

        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scraping]\nmax_posts = 3\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.scraping.max_posts, Some(3));
        assert_eq!(config.scraping.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.output.include_summary);
    }

    #[test]
    fn test_unreadable_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "scraping = 5").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Toml { .. })));
    }

    #[test]
    #[serial]
    fn test_env_overlay() {
        std::env::set_var("POST_ARCHIVER_MAX_POSTS", "7");
        std::env::set_var("POST_ARCHIVER_EXTRACT_COMMENTS", "yes");
        std::env::set_var("POST_ARCHIVER_RETRY_DELAY_SECS", "0.25");
        std::env::set_var("POST_ARCHIVER_OUTPUT_DIR", "/data/out");

        let mut config = Config::default();
        let result = config.apply_env();

        std::env::remove_var("POST_ARCHIVER_MAX_POSTS");
        std::env::remove_var("POST_ARCHIVER_EXTRACT_COMMENTS");
        std::env::remove_var("POST_ARCHIVER_RETRY_DELAY_SECS");
        std::env::remove_var("POST_ARCHIVER_OUTPUT_DIR");

        result.unwrap();
        assert_eq!(config.scraping.max_posts, Some(7));
        assert!(config.scraping.extract_comments);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.output_dir(), PathBuf::from("/data/out"));
    }

    #[test]
    #[serial]
    fn test_env_overlay_rejects_garbage() {
        std::env::set_var("POST_ARCHIVER_MAX_RETRIES", "many");
        let result = Config::default().apply_env();
        std::env::remove_var("POST_ARCHIVER_MAX_RETRIES");
        assert!(matches!(result, Err(ConfigError::ParseInt { .. })));
    }

    #[test]
    #[serial]
    fn test_max_posts_zero_means_unlimited() {
        std::env::set_var("POST_ARCHIVER_MAX_POSTS", "0");
        let mut config = Config::default();
        config.scraping.max_posts = Some(4);
        let result = config.apply_env();
        std::env::remove_var("POST_ARCHIVER_MAX_POSTS");
        result.unwrap();
        assert_eq!(config.scraping.max_posts, None);
    }
}
