//! Archive and summary files.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use crate::media::sanitize_file_stem;
use crate::models::ArchiveData;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes archives and summaries into one output directory.
#[derive(Debug, Clone)]
pub struct OutputManager {
    output_dir: PathBuf,
    pretty: bool,
}

impl OutputManager {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            pretty,
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `posts_<channel>_<timestamp>.json` under the output directory.
    #[must_use]
    pub fn archive_path(&self, channel_id: &str) -> PathBuf {
        self.output_dir.join(format!(
            "posts_{}_{}.json",
            sanitize_file_stem(channel_id),
            Local::now().format(TIMESTAMP_FORMAT)
        ))
    }

    /// Serialize `archive` to `path`, or to [`Self::archive_path`] if none
    /// is given. An existing file at the target is renamed to a backup
    /// first. Totals are refreshed before writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory, backup or file cannot be written.
    pub async fn save_archive(&self, archive: &mut ArchiveData, path: Option<&Path>) -> Result<PathBuf> {
        let path = path.map_or_else(|| self.archive_path(&archive.metadata.channel_id), Path::to_path_buf);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let backup = backup_path(&path);
            tokio::fs::rename(&path, &backup)
                .await
                .with_context(|| format!("Failed to back up existing file: {}", path.display()))?;
            warn!(path = %path.display(), backup = %backup.display(), "Existing archive moved to backup");
        }

        archive.refresh_totals();
        let body = if self.pretty {
            serde_json::to_string_pretty(archive)
        } else {
            serde_json::to_string(archive)
        }
        .context("Failed to serialize archive")?;

        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write archive: {}", path.display()))?;

        info!(
            path = %path.display(),
            posts = archive.metadata.posts_count,
            comments = archive.metadata.total_comments,
            "Archive saved"
        );
        Ok(path)
    }

    /// Write the human-readable summary next to the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_summary(&self, archive: &ArchiveData) -> Result<PathBuf> {
        let path = self.output_dir.join(format!(
            "summary_{}_{}.txt",
            sanitize_file_stem(&archive.metadata.channel_id),
            Local::now().format(TIMESTAMP_FORMAT)
        ));
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", self.output_dir.display()))?;
        tokio::fs::write(&path, summary_report(archive))
            .await
            .with_context(|| format!("Failed to write summary: {}", path.display()))?;
        info!(path = %path.display(), "Summary saved");
        Ok(path)
    }
}

/// `<stem>_backup_<timestamp>.<ext>` beside `path`.
fn backup_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            "{stem}_backup_{}.{}",
            Local::now().format(TIMESTAMP_FORMAT),
            ext.to_string_lossy()
        ),
        None => format!("{stem}_backup_{}", Local::now().format(TIMESTAMP_FORMAT)),
    };
    let mut candidate = path.with_file_name(&name);
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{n}_{name}"));
        n += 1;
    }
    candidate
}

/// Plain-text statistics for an archive.
#[must_use]
pub fn summary_report(archive: &ArchiveData) -> String {
    let meta = &archive.metadata;
    let posts = &archive.posts;
    let replies: usize = posts
        .iter()
        .flat_map(|p| &p.comments)
        .map(|c| c.replies.len())
        .sum();
    let top_level = meta.total_comments.saturating_sub(replies);
    let with_images = posts.iter().filter(|p| !p.images.is_empty()).count();
    let members_only = posts.iter().filter(|p| p.is_members_only).count();
    let with_comments = posts.iter().filter(|p| !p.comments.is_empty()).count();

    let mut out = String::new();
    let _ = writeln!(out, "Community Posts Archive Summary");
    let _ = writeln!(out, "==============================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Channel ID: {}", meta.channel_id);
    let _ = writeln!(out, "Scraped: {}", meta.scrape_date);
    let _ = writeln!(out);
    let _ = writeln!(out, "Posts");
    let _ = writeln!(out, "  Total posts: {}", meta.posts_count);
    let _ = writeln!(out, "  Posts with images: {with_images}");
    let _ = writeln!(out, "  Members-only posts: {members_only}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Comments");
    let _ = writeln!(out, "  Posts with comments: {with_comments}");
    let _ = writeln!(out, "  Top-level comments: {top_level}");
    let _ = writeln!(out, "  Replies: {replies}");
    let _ = writeln!(out, "  Total: {}", meta.total_comments);
    let _ = writeln!(out);
    let _ = writeln!(out, "Images");
    let _ = writeln!(out, "  Total images: {}", meta.total_images);
    let _ = writeln!(out, "  Downloaded: {}", meta.images_downloaded);
    let _ = writeln!(out);
    let _ = writeln!(out, "Warnings: {}", meta.warnings);

    if let Some(config) = meta.config_used.as_object().filter(|c| !c.is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Configuration");
        for (key, value) in config {
            let _ = writeln!(out, "  {key}: {value}");
        }
    }
    out
}
