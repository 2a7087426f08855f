//! Image downloads for archived posts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::{IMAGES_DIR_NAME, USER_AGENT};
use crate::error::{ArchiverError, Result};
use crate::models::Post;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const DEFAULT_EXTENSION: &str = "jpg";
const MAX_STEM_LENGTH: usize = 200;

/// Make `name` safe to use as a file name stem.
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '-' | '_' | '.' => c,
            c if c.is_alphanumeric() => c,
            _ => '_',
        })
        .collect();

    let joined = replaced
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let trimmed = joined.trim_matches('.');

    let stem: String = trimmed.chars().take(MAX_STEM_LENGTH).collect();
    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

/// Extension for a downloaded image: the URL path's, else the content
/// type's, else `jpg`.
fn pick_extension(url: &Url, content_type: Option<&str>) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .and_then(|last| {
            // Image hosts append sizing after '=' (".../photo.png=s0").
            let name = last.split('=').next().unwrap_or(last);
            name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
        })
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));

    from_path
        .or_else(|| {
            let subtype = content_type?.split(';').next()?.trim().strip_prefix("image/")?;
            let ext = if subtype == "jpeg" { "jpg" } else { subtype };
            ALLOWED_EXTENSIONS.contains(&ext).then(|| ext.to_string())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// First path under `dir` named `stem.ext`, `stem_1.ext`, ... that does not
/// exist yet.
async fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.{ext}"));
    let mut n = 1;
    while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = dir.join(format!("{stem}_{n}.{ext}"));
        n += 1;
    }
    candidate
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub path: PathBuf,
    pub byte_size: u64,
}

/// Downloads image URLs to local files.
#[derive(Clone)]
pub struct ImageDownloader {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl ImageDownloader {
    /// # Errors
    ///
    /// `Network` if the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_retries: u32, retry_delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ArchiverError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_retries,
            retry_delay,
        })
    }

    /// Download `url` into `dest_dir` as `<file_stem>.<ext>`.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-http(s) URL, `Io` if the file cannot be
    /// written, or the last `Network` error once retries are exhausted.
    pub async fn download(&self, url: &str, dest_dir: &Path, file_stem: &str) -> Result<DownloadedImage> {
        let parsed = Url::parse(url)
            .map_err(|e| ArchiverError::validation(format!("invalid image URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ArchiverError::validation(format!(
                "unsupported image URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
            match self.fetch(&parsed).await {
                Ok((bytes, content_type)) => {
                    tokio::fs::create_dir_all(dest_dir).await?;
                    let ext = pick_extension(&parsed, content_type.as_deref());
                    let path = unique_path(dest_dir, &sanitize_file_stem(file_stem), &ext).await;
                    tokio::fs::write(&path, &bytes).await?;
                    debug!(url = %url, path = %path.display(), bytes = bytes.len(), "Downloaded image");
                    return Ok(DownloadedImage {
                        path,
                        byte_size: bytes.len() as u64,
                    });
                }
                Err(e) => {
                    debug!(url = %url, attempt, error = %e, "Image download attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ArchiverError::network("image download failed")))
    }

    async fn fetch(&self, url: &Url) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArchiverError::network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiverError::network_status(
                status.as_u16(),
                format!("HTTP {status}"),
            ));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchiverError::network(e.to_string()))?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Download every image of every post into `<output_dir>/images`,
    /// filling in `local_path` and `byte_size`. Failures are logged and
    /// skipped. Returns the number of images downloaded.
    pub async fn download_post_images(&self, posts: &mut [Post], output_dir: &Path) -> usize {
        let dest = output_dir.join(IMAGES_DIR_NAME);
        let mut downloaded = 0;

        for post in posts.iter_mut() {
            let multiple = post.images.len() > 1;
            for (index, image) in post.images.iter_mut().enumerate() {
                if image.local_path.is_some() || image.remote_url.is_empty() {
                    continue;
                }
                let stem = if multiple {
                    format!("{}_image_{}", post.id, index + 1)
                } else {
                    post.id.clone()
                };
                match self.download(&image.remote_url, &dest, &stem).await {
                    Ok(file) => {
                        image.local_path = Some(file.path.display().to_string());
                        image.byte_size = Some(file.byte_size);
                        downloaded += 1;
                    }
                    Err(e) => {
                        warn!(post_id = %post.id, url = %image.remote_url, error = %e, "Failed to download image");
                    }
                }
            }
        }

        info!(downloaded, dir = %dest.display(), "Image download finished");
        downloaded
    }
}
