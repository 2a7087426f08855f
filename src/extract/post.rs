//! Post renderer extraction.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::shapes::{
    Attachment, AuthorCommentBadge, Badge, NavigationEndpoint, PostRenderer, Run, Text,
    Thumbnails,
};
use crate::constants::RELATIVE_TIME_INDICATORS;
use crate::error::{ArchiverError, Result};
use crate::models::{Author, Image, Link, Post};

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// First run of digits in `text`, or `"0"`.
#[must_use]
pub fn first_digit_run(text: &str) -> String {
    DIGITS
        .find(text)
        .map_or_else(|| "0".to_string(), |m| m.as_str().to_string())
}

/// Whether a display timestamp is relative ("2 days ago", "(edited)").
#[must_use]
pub fn is_relative_timestamp(timestamp: &str) -> bool {
    let lower = timestamp.to_lowercase();
    RELATIVE_TIME_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

/// Make a site-relative URL absolute against `site_base`.
#[must_use]
pub fn absolutize(site_base: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{url}", site_base.trim_end_matches('/'))
    } else {
        url.to_string()
    }
}

/// Verified/member flags from the badge list and the comment badge icon.
pub(crate) fn apply_badges(
    author: &mut Author,
    badges: &[Badge],
    comment_badge: Option<&AuthorCommentBadge>,
) {
    for badge in badges {
        if let Some(meta) = &badge.metadata_badge_renderer {
            if meta.style.contains("BADGE_STYLE_TYPE_VERIFIED") {
                author.is_verified = true;
            } else if meta.style.contains("BADGE_STYLE_TYPE_MEMBER") {
                author.is_member = true;
            }
        } else if let Some(live) = &badge.live_chat_author_badge_renderer {
            if live.author_badge_type.contains("VERIFIED") {
                author.is_verified = true;
            } else if live.author_badge_type.contains("MEMBER") {
                author.is_member = true;
            }
        }
    }

    if comment_badge
        .and_then(|b| b.author_comment_badge_renderer.as_ref())
        .is_some_and(|r| r.icon.icon_type == "CHECK_CIRCLE_THICK")
    {
        author.is_verified = true;
    }
}

/// URL of the largest thumbnail.
pub(crate) fn last_thumbnail(thumbnails: &Thumbnails) -> String {
    thumbnails
        .thumbnails
        .last()
        .map(|t| t.url.clone())
        .unwrap_or_default()
}

/// Extracts [`Post`]s from `backstagePostRenderer` nodes.
#[derive(Debug, Clone)]
pub struct PostExtractor {
    site_base: String,
}

impl PostExtractor {
    #[must_use]
    pub fn new(site_base: impl Into<String>) -> Self {
        Self {
            site_base: site_base.into(),
        }
    }

    /// # Errors
    ///
    /// `Parse` if the renderer has no `postId`.
    pub fn extract(&self, renderer: &PostRenderer) -> Result<Post> {
        if renderer.post_id.is_empty() {
            return Err(ArchiverError::parse("post renderer without postId"));
        }

        let timestamp = renderer
            .published_time_text
            .first()
            .unwrap_or_default()
            .to_string();
        let likes = renderer.vote_count.first().unwrap_or("0").to_string();

        let post = Post {
            id: renderer.post_id.clone(),
            text: renderer.content_text.joined(),
            timestamp_is_relative: is_relative_timestamp(&timestamp),
            timestamp_display: timestamp,
            like_count_display: likes,
            declared_comment_count: Self::comment_count(renderer),
            is_members_only: renderer.sponsors_only_badge.is_some(),
            author: self.author(renderer),
            images: renderer
                .backstage_attachment
                .as_ref()
                .map(extract_images)
                .unwrap_or_default(),
            links: self.links(&renderer.content_text),
            comments: Vec::new(),
        };

        debug!(
            post_id = %post.id,
            images = post.images.len(),
            links = post.links.len(),
            "Extracted post"
        );
        Ok(post)
    }

    fn author(&self, renderer: &PostRenderer) -> Author {
        let mut author = Author::default();

        let first_run = renderer.author_text.runs.first();
        if let Some(run) = first_run {
            author.display_name.clone_from(&run.text);
        } else if let Some(text) = &renderer.author_text.simple_text {
            author.display_name.clone_from(text);
        }

        let browse = first_run
            .and_then(|r| r.navigation_endpoint.as_ref())
            .and_then(|e| e.browse_endpoint.as_ref())
            .filter(|b| !b.browse_id.is_empty())
            .or_else(|| {
                renderer
                    .author_endpoint
                    .as_ref()
                    .and_then(|e| e.browse_endpoint.as_ref())
            });
        if let Some(browse) = browse {
            author.id.clone_from(&browse.browse_id);
            if !browse.canonical_base_url.is_empty() {
                author.profile_url = absolutize(&self.site_base, &browse.canonical_base_url);
            }
        }

        author.avatar_url = last_thumbnail(&renderer.author_thumbnail);
        apply_badges(
            &mut author,
            &renderer.author_badges,
            renderer.author_comment_badge.as_ref(),
        );
        author
    }

    fn comment_count(renderer: &PostRenderer) -> String {
        renderer
            .action_buttons
            .comment_action_buttons_renderer
            .as_ref()
            .and_then(|b| b.reply_button.as_ref())
            .and_then(|b| b.button_renderer.text.first())
            .map_or_else(|| "0".to_string(), first_digit_run)
    }

    /// Links carried by the navigation endpoints of the content runs.
    pub fn links(&self, content: &Text) -> Vec<Link> {
        content
            .runs
            .iter()
            .filter_map(|run| {
                let url = run
                    .navigation_endpoint
                    .as_ref()
                    .and_then(|e| self.endpoint_url(e))?;
                Some(Link {
                    display_text: run.text.clone(),
                    target_url: url,
                })
            })
            .collect()
    }

    fn endpoint_url(&self, endpoint: &NavigationEndpoint) -> Option<String> {
        let raw = if let Some(meta) = &endpoint.command_metadata {
            meta.web_command_metadata.url.clone()
        } else if let Some(url) = &endpoint.url_endpoint {
            Some(url.url.clone())
        } else {
            endpoint
                .browse_endpoint
                .as_ref()
                .map(|b| b.canonical_base_url.clone())
        }?;

        if raw.is_empty() {
            return None;
        }
        Some(absolutize(&self.site_base, &raw))
    }
}

/// Concatenated text of a run list.
#[must_use]
pub fn run_text(runs: &[Run]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

/// Images of a single- or multi-image attachment.
#[must_use]
pub fn extract_images(attachment: &Attachment) -> Vec<Image> {
    if let Some(single) = &attachment.backstage_image_renderer {
        return image_from(&single.image).into_iter().collect();
    }
    attachment
        .post_multi_image_renderer
        .as_ref()
        .map(|multi| {
            multi
                .images
                .iter()
                .filter_map(|item| item.backstage_image_renderer.as_ref())
                .filter_map(|r| image_from(&r.image))
                .collect()
        })
        .unwrap_or_default()
}

/// Best-resolution URL is the first thumbnail's base with `=s0`; the
/// dimensions come from the last (largest) thumbnail.
fn image_from(thumbnails: &Thumbnails) -> Option<Image> {
    let first = thumbnails.thumbnails.first()?;
    if first.url.is_empty() {
        return None;
    }
    let base = first.url.split('=').next().unwrap_or(&first.url);
    let largest = thumbnails.thumbnails.last();
    Some(Image {
        remote_url: format!("{base}=s0"),
        width: largest.and_then(|t| t.width),
        height: largest.and_then(|t| t.height),
        ..Image::default()
    })
}
