//! Pagination engine.
//!
//! Drives three nested pagination scopes: the channel's post feed, each
//! post's comment section and each comment's replies. Every scope follows
//! the same loop (fetch, extract, append, follow the next token) and stops
//! when the token runs out, a bound is reached, the token repeats or a
//! continuation fetch fails. Only the first fetch of a run is fatal; later
//! failures cut the scope short and are counted as warnings.

pub mod cursor;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::InnertubeClient;
use crate::constants::{
    DEFAULT_COMMENT_BATCH_DELAY_MS, DEFAULT_MAX_COMMENTS, DEFAULT_MAX_REPLIES,
    DEFAULT_REPLY_BATCH_DELAY_MS, DEFAULT_RETRY_DELAY_SECS, MAX_REPLY_PAGES, POSTS_TAB_TITLES,
    YOUTUBE_BASE_URL,
};
use crate::error::{ArchiverError, Result};
use crate::extract::navigator::{
    comment_section_token, continuation_items, find_post_renderer, find_tab, tab_items,
};
use crate::extract::shapes::{parse_lenient, PostRenderer};
use crate::extract::{ContentItem, PostExtractor, Reconciler, ReplyBatch};
use crate::models::{ArchiveData, ArchiveMetadata, Comment, Post};
pub use cursor::{CursorLedger, PaginationCursor, Scope};

/// Bounds and pacing for one run.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// `None` means no limit.
    pub max_posts: Option<usize>,
    pub extract_comments: bool,
    pub max_comments: usize,
    pub max_replies: usize,
    pub post_batch_delay: Duration,
    pub comment_batch_delay: Duration,
    pub reply_batch_delay: Duration,
    /// Posts whose comments are extracted at the same time.
    pub comment_concurrency: usize,
    pub site_base_url: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            max_posts: None,
            extract_comments: false,
            max_comments: DEFAULT_MAX_COMMENTS,
            max_replies: DEFAULT_MAX_REPLIES,
            post_batch_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            comment_batch_delay: Duration::from_millis(DEFAULT_COMMENT_BATCH_DELAY_MS),
            reply_batch_delay: Duration::from_millis(DEFAULT_REPLY_BATCH_DELAY_MS),
            comment_concurrency: 1,
            site_base_url: YOUTUBE_BASE_URL.to_string(),
        }
    }
}

/// Archives a channel's community posts, or a single post.
pub struct CommunityScraper {
    client: InnertubeClient,
    settings: ScrapeSettings,
    posts: PostExtractor,
    reconciler: Reconciler,
    cancel: CancellationToken,
    warnings: AtomicUsize,
}

impl CommunityScraper {
    #[must_use]
    pub fn new(client: InnertubeClient, settings: ScrapeSettings, cancel: CancellationToken) -> Self {
        let posts = PostExtractor::new(settings.site_base_url.clone());
        let reconciler = Reconciler::new(settings.site_base_url.clone(), settings.max_replies);
        Self {
            client,
            settings,
            posts,
            reconciler,
            cancel,
            warnings: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }

    /// Warnings recorded so far in this run.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    fn note_warnings(&self, count: usize) {
        if count > 0 {
            self.warnings.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Wrap posts gathered for `channel_id` into an archive carrying this
    /// run's warning count.
    #[must_use]
    pub fn archive(&self, channel_id: &str, posts: Vec<Post>) -> ArchiveData {
        let mut metadata = ArchiveMetadata::new(channel_id);
        metadata.warnings = self.warnings();
        ArchiveData::new(metadata, posts)
    }

    /// Sleep for `delay` unless cancelled first. Returns false on cancel.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn post_limit_reached(&self, count: usize) -> bool {
        self.settings.max_posts.is_some_and(|max| count >= max)
    }

    /// Archive every community post of `channel_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty channel id, or the error of the initial
    /// feed fetch. Everything after that degrades to a shorter result.
    pub async fn scrape_channel(&self, channel_id: &str) -> Result<ArchiveData> {
        if channel_id.is_empty() {
            return Err(ArchiverError::validation("channel id must not be empty"));
        }
        info!(channel_id = %channel_id, "Starting community post extraction");

        let response = self.client.initial_feed(channel_id).await?;
        let Some(tab) = find_tab(&response, POSTS_TAB_TITLES) else {
            warn!(channel_id = %channel_id, "Channel has no community posts tab");
            self.note_warnings(1);
            return Ok(self.archive(channel_id, Vec::new()));
        };

        let mut posts = Vec::new();
        let mut next = self.absorb_posts(&tab_items(tab), &mut posts);
        let mut ledger = CursorLedger::new(Scope::Posts);

        while !self.post_limit_reached(posts.len()) {
            let Some(cursor) = ledger.admit(next.take()) else {
                break;
            };
            if !self.pause(self.settings.post_batch_delay).await {
                info!("Post pagination cancelled");
                break;
            }

            let response = match self.client.continuation(&cursor.token).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, posts = posts.len(), "Post continuation failed, keeping partial results");
                    self.note_warnings(1);
                    break;
                }
            };

            let before = posts.len();
            next = self.absorb_posts(&continuation_items(&response), &mut posts);
            if posts.len() == before && next.is_some() {
                debug!("Batch carried no posts, following its token");
            }
            info!(posts = posts.len(), "Fetched post batch");
        }

        if let Some(max) = self.settings.max_posts {
            posts.truncate(max);
        }

        if self.settings.extract_comments && !self.cancel.is_cancelled() {
            self.attach_comments(channel_id, &mut posts).await;
        }

        info!(
            channel_id = %channel_id,
            posts = posts.len(),
            warnings = self.warnings(),
            "Finished community post extraction"
        );
        Ok(self.archive(channel_id, posts))
    }

    /// Extract posts from `items` into `posts`, returning the batch's next
    /// token.
    fn absorb_posts(&self, items: &[&Value], posts: &mut Vec<Post>) -> Option<String> {
        let mut next = None;
        for item in items {
            match ContentItem::classify(item) {
                ContentItem::Post(renderer) => {
                    if self.post_limit_reached(posts.len()) {
                        continue;
                    }
                    match self.posts.extract(&renderer) {
                        Ok(post) if posts.iter().any(|p| p.id == post.id) => {
                            debug!(post_id = %post.id, "Skipping duplicate post");
                        }
                        Ok(post) => posts.push(post),
                        Err(e) => {
                            debug!(error = %e, "Dropping post item");
                            self.note_warnings(1);
                        }
                    }
                }
                ContentItem::Continuation(token) => {
                    if next.is_none() {
                        next = Some(token);
                    }
                }
                _ => debug!("Skipping non-post item"),
            }
        }
        next
    }

    /// Fetch comments for each post, `comment_concurrency` posts at a time.
    /// Cancelled units leave their post without comments.
    async fn attach_comments(&self, channel_id: &str, posts: &mut [Post]) {
        let units: Vec<(usize, String)> = posts
            .iter()
            .enumerate()
            .filter(|(_, post)| post.declared_comment_count != "0")
            .map(|(i, post)| (i, post.id.clone()))
            .collect();
        debug!(posts = units.len(), "Extracting comments");

        let results: Vec<(usize, Option<Vec<Comment>>)> = stream::iter(units)
            .map(|(index, post_id)| async move {
                let comments = tokio::select! {
                    () = self.cancel.cancelled() => None,
                    result = self.extract_comments(channel_id, &post_id) => match result {
                        Ok(comments) => Some(comments),
                        Err(e) => {
                            warn!(post_id = %post_id, error = %e, "Comment extraction failed");
                            self.note_warnings(1);
                            None
                        }
                    },
                };
                (index, comments)
            })
            .buffered(self.settings.comment_concurrency.max(1))
            .collect()
            .await;

        for (index, comments) in results {
            if let Some(comments) = comments {
                posts[index].comments = comments;
            }
        }
    }

    /// All comments (with replies) of one post.
    ///
    /// # Errors
    ///
    /// The error of the post-detail fetch that seeds the comment scope.
    pub async fn extract_comments(&self, channel_id: &str, post_id: &str) -> Result<Vec<Comment>> {
        let detail = self.client.post_detail(channel_id, post_id).await?;
        Ok(self.comments_from_detail(post_id, &detail).await)
    }

    /// Archive one post by id, with its comments when enabled.
    ///
    /// # Errors
    ///
    /// The post-detail fetch error, `NotFound` if the response carries no
    /// post renderer, or `Parse` if the renderer has no id.
    pub async fn scrape_post(&self, channel_id: &str, post_id: &str) -> Result<Post> {
        info!(channel_id = %channel_id, post_id = %post_id, "Extracting individual post");
        let detail = self.client.post_detail(channel_id, post_id).await?;

        let renderer = find_post_renderer(&detail)
            .and_then(parse_lenient::<PostRenderer>)
            .ok_or_else(|| ArchiverError::NotFound(format!("post {post_id}")))?;
        let mut post = self.posts.extract(&renderer)?;

        if self.settings.extract_comments {
            post.comments = self.comments_from_detail(post_id, &detail).await;
        }
        Ok(post)
    }

    async fn comments_from_detail(&self, post_id: &str, detail: &Value) -> Vec<Comment> {
        let mut comments: Vec<Comment> = Vec::new();
        let mut next = comment_section_token(detail);
        if next.is_none() {
            debug!(post_id = %post_id, "Post has no comment section");
            return comments;
        }

        let mut ledger = CursorLedger::new(Scope::Comments);
        while comments.len() < self.settings.max_comments {
            let Some(cursor) = ledger.admit(next.take()) else {
                break;
            };
            if ledger.consumed() > 1 && !self.pause(self.settings.comment_batch_delay).await {
                break;
            }

            let response = match self.client.continuation(&cursor.token).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(post_id = %post_id, error = %e, comments = comments.len(), "Comment continuation failed, keeping partial results");
                    self.note_warnings(1);
                    break;
                }
            };

            let batch = self.reconciler.comment_batch(&response);
            self.note_warnings(batch.dropped);

            for thread in batch.threads {
                if comments.len() >= self.settings.max_comments {
                    break;
                }
                if comments.iter().any(|c| c.id == thread.comment.id) {
                    continue;
                }
                let mut comment = thread.comment;
                if let Some(token) = thread.reply_token {
                    if comment.replies.len() < self.settings.max_replies
                        && !self.cancel.is_cancelled()
                    {
                        self.fetch_replies(&mut comment, token).await;
                    }
                }
                comments.push(comment);
            }

            debug!(post_id = %post_id, comments = comments.len(), "Fetched comment batch");
            next = batch.next_token;
        }

        comments
    }

    /// Follow a comment's reply continuation until exhausted, bounded, or
    /// [`MAX_REPLY_PAGES`] pages in.
    async fn fetch_replies(&self, comment: &mut Comment, token: String) {
        let mut ledger = CursorLedger::new(Scope::Replies);
        let mut next = Some(token);

        for page in 0..MAX_REPLY_PAGES {
            if comment.replies.len() >= self.settings.max_replies {
                break;
            }
            let Some(cursor) = ledger.admit(next.take()) else {
                break;
            };
            if page > 0 && !self.pause(self.settings.reply_batch_delay).await {
                break;
            }

            let batch = match self.reply_page(&cursor.token).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(comment_id = %comment.id, error = %e, "Reply continuation failed, keeping partial results");
                    self.note_warnings(1);
                    break;
                }
            };
            self.note_warnings(batch.dropped);
            if batch.replies.is_empty() {
                break;
            }

            for reply in batch.replies {
                if comment.replies.len() >= self.settings.max_replies {
                    break;
                }
                comment.push_reply(reply);
            }
            next = batch.next_token;
        }

        debug!(comment_id = %comment.id, replies = comment.replies.len(), "Fetched replies");
    }

    /// One reply page: the reply endpoint first, then the generic
    /// continuation endpoint with the same token if that came back empty.
    async fn reply_page(&self, token: &str) -> Result<ReplyBatch> {
        let primary = self
            .reconciler
            .reply_batch(&self.client.reply_continuation(token).await?);
        if !primary.replies.is_empty() {
            return Ok(primary);
        }

        debug!("Reply endpoint returned nothing, retrying token on browse");
        let fallback = self
            .reconciler
            .reply_batch(&self.client.continuation(token).await?);
        Ok(fallback)
    }
}
