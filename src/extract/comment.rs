//! Comment reconciliation.
//!
//! A comment batch may mix two encodings of the same entity. Legacy threads
//! carry a complete `commentRenderer`. View-model threads carry only three
//! keys (`commentKey`, `toolbarStateKey`, `inlineRepliesKey`) that point into
//! the flat list of entity payloads delivered under `frameworkUpdates`. Both
//! end up as the same [`Comment`].

use serde_json::Value;
use tracing::debug;

use super::navigator::{continuation_items, entity_mutations, reply_continuation_token};
use super::post::{
    absolutize, apply_badges, first_digit_run, is_relative_timestamp, last_thumbnail, run_text,
};
use super::shapes::{
    parse_lenient, CommentEntityPayload, CommentRenderer, CommentViewModel, ContentItem,
    RepliesRenderer, Text, Toolbar,
};
use crate::error::{ArchiverError, Result};
use crate::models::{Author, Comment};

const HEARTED: &str = "TOOLBAR_HEART_STATE_HEARTED";

#[derive(Debug, Clone)]
enum Entity {
    Comment(Box<CommentEntityPayload>),
    Toolbar(Toolbar),
}

/// Entity payloads of one response, keyed by `entityKey`, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entries: Vec<(String, Entity)>,
}

impl EntityIndex {
    #[must_use]
    pub fn from_response(response: &Value) -> Self {
        let entries = entity_mutations(response)
            .iter()
            .filter_map(|mutation| {
                let key = mutation.get("entityKey").and_then(Value::as_str)?;
                let payload = mutation.get("payload")?;
                let entity = if let Some(comment) = payload.get("commentEntityPayload") {
                    Entity::Comment(Box::new(parse_lenient(comment)?))
                } else if let Some(toolbar) = payload.get("engagementToolbarStateEntityPayload") {
                    Entity::Toolbar(parse_lenient(toolbar)?)
                } else {
                    return None;
                };
                Some((key.to_string(), entity))
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comment entity stored under exactly `key`.
    #[must_use]
    pub fn comment(&self, key: &str) -> Option<&CommentEntityPayload> {
        if key.is_empty() {
            return None;
        }
        self.entries.iter().find_map(|(k, e)| match e {
            Entity::Comment(c) if k == key => Some(c.as_ref()),
            _ => None,
        })
    }

    /// Toolbar entity stored under exactly `key`.
    #[must_use]
    pub fn toolbar(&self, key: &str) -> Option<&Toolbar> {
        if key.is_empty() {
            return None;
        }
        self.entries.iter().find_map(|(k, e)| match e {
            Entity::Toolbar(t) if k == key => Some(t),
            _ => None,
        })
    }

    /// Comment entities whose key starts with `prefix`, excluding `exclude`.
    /// An empty prefix matches nothing.
    pub fn comments_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
        exclude: &'a str,
    ) -> impl Iterator<Item = &'a CommentEntityPayload> + 'a {
        self.entries.iter().filter_map(move |(k, e)| match e {
            Entity::Comment(c) if !prefix.is_empty() && k.starts_with(prefix) && k != exclude => {
                Some(c.as_ref())
            }
            _ => None,
        })
    }

    /// All comment entities with their keys.
    pub fn comments(&self) -> impl Iterator<Item = (&str, &CommentEntityPayload)> {
        self.entries.iter().filter_map(|(k, e)| match e {
            Entity::Comment(c) => Some((k.as_str(), c.as_ref())),
            Entity::Toolbar(_) => None,
        })
    }
}

/// A top-level comment with the replies found in its own batch, plus the
/// token for fetching more.
#[derive(Debug, Clone)]
pub struct ReconciledThread {
    pub comment: Comment,
    pub reply_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentBatch {
    pub threads: Vec<ReconciledThread>,
    pub next_token: Option<String>,
    /// Recognised items that failed to extract.
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReplyBatch {
    pub replies: Vec<Comment>,
    pub next_token: Option<String>,
    pub dropped: usize,
}

impl ReplyBatch {
    fn accept(&mut self, reply: Comment) {
        if !self.replies.iter().any(|r| r.id == reply.id) {
            self.replies.push(reply);
        }
    }
}

/// Turns raw comment and reply batches into [`Comment`]s.
#[derive(Debug, Clone)]
pub struct Reconciler {
    site_base: String,
    max_replies: usize,
}

impl Reconciler {
    #[must_use]
    pub fn new(site_base: impl Into<String>, max_replies: usize) -> Self {
        Self {
            site_base: site_base.into(),
            max_replies,
        }
    }

    /// Extract every thread of a comment continuation response.
    #[must_use]
    pub fn comment_batch(&self, response: &Value) -> CommentBatch {
        let index = EntityIndex::from_response(response);
        let mut batch = CommentBatch::default();

        for raw in continuation_items(response) {
            match ContentItem::classify(raw) {
                ContentItem::Continuation(token) => {
                    if batch.next_token.is_none() {
                        batch.next_token = Some(token);
                    }
                }
                ContentItem::Unrecognized(key) => {
                    debug!(item = %key, "Skipping unrecognized comment item");
                }
                ContentItem::Post(_) => {
                    debug!("Skipping post item in comment batch");
                }
                item => match self.reconcile(item, &index) {
                    Ok(thread) => batch.threads.push(thread),
                    Err(e) => {
                        debug!(error = %e, "Dropping comment item");
                        batch.dropped += 1;
                    }
                },
            }
        }

        debug!(
            comments = batch.threads.len(),
            dropped = batch.dropped,
            entities = index.len(),
            has_next = batch.next_token.is_some(),
            "Extracted comment batch"
        );
        batch
    }

    /// Reconcile one thread or bare comment item.
    ///
    /// # Errors
    ///
    /// `Parse` if the comment has no id, its entity is missing, or the item
    /// is not a comment shape.
    pub fn reconcile(&self, item: ContentItem, index: &EntityIndex) -> Result<ReconciledThread> {
        match item {
            ContentItem::LegacyThread { comment, replies } => {
                let comment = self.comment_from_renderer(&comment)?;
                Ok(self.attach_embedded(comment, replies.as_ref()))
            }
            ContentItem::ViewModelThread { view_model, replies } => {
                let mut comment = self.comment_from_view_model(&view_model, index)?;
                let inline = index
                    .comments_with_prefix(&view_model.inline_replies_key, &view_model.comment_key);
                for entity in inline {
                    if comment.replies.len() >= self.max_replies {
                        break;
                    }
                    match self.comment_from_entity(entity, None) {
                        Ok(reply) => {
                            comment.push_reply(reply);
                        }
                        Err(e) => debug!(error = %e, "Dropping inline reply"),
                    }
                }
                Ok(self.attach_embedded(comment, replies.as_ref()))
            }
            ContentItem::Comment(renderer) => Ok(ReconciledThread {
                comment: self.comment_from_renderer(&renderer)?,
                reply_token: None,
            }),
            ContentItem::Post(_) | ContentItem::Continuation(_) | ContentItem::Unrecognized(_) => {
                Err(ArchiverError::parse("not a comment item"))
            }
        }
    }

    fn comment_from_view_model(
        &self,
        view_model: &CommentViewModel,
        index: &EntityIndex,
    ) -> Result<Comment> {
        let entity = index.comment(&view_model.comment_key).ok_or_else(|| {
            ArchiverError::parse(format!(
                "no comment entity for key '{}'",
                view_model.comment_key
            ))
        })?;
        let toolbar = index.toolbar(&view_model.toolbar_state_key);
        let mut comment = self.comment_from_entity(entity, toolbar)?;
        if comment.id.is_empty() {
            comment.id.clone_from(&view_model.comment_id);
        }
        comment.is_pinned = view_model.pinned_text.is_some();
        Ok(comment)
    }

    /// Append the replies embedded in the thread, then pick the token for
    /// fetching more.
    fn attach_embedded(&self, mut comment: Comment, replies: Option<&RepliesRenderer>) -> ReconciledThread {
        let Some(replies) = replies else {
            return ReconciledThread {
                comment,
                reply_token: None,
            };
        };

        for raw in &replies.contents {
            if comment.replies.len() >= self.max_replies {
                break;
            }
            let Some(renderer) = raw.get("commentRenderer").and_then(parse_lenient::<CommentRenderer>) else {
                continue;
            };
            match self.comment_from_renderer(&renderer) {
                Ok(reply) => {
                    comment.push_reply(reply);
                }
                Err(e) => debug!(error = %e, "Dropping embedded reply"),
            }
        }

        ReconciledThread {
            comment,
            reply_token: replies_token(replies),
        }
    }

    /// Extract a reply continuation response.
    #[must_use]
    pub fn reply_batch(&self, response: &Value) -> ReplyBatch {
        let index = EntityIndex::from_response(response);
        let mut batch = ReplyBatch::default();
        let mut used_keys: Vec<&str> = Vec::new();

        for raw in continuation_items(response) {
            let result = match ContentItem::classify(raw) {
                ContentItem::Comment(renderer) => self.comment_from_renderer(&renderer),
                ContentItem::LegacyThread { comment, .. } => self.comment_from_renderer(&comment),
                ContentItem::ViewModelThread { view_model, .. } => {
                    let reply = self.comment_from_view_model(&view_model, &index);
                    if let Some((key, _)) = index.comments().find(|(k, _)| *k == view_model.comment_key) {
                        used_keys.push(key);
                    }
                    reply
                }
                _ => continue,
            };
            match result {
                Ok(reply) => batch.accept(reply),
                Err(e) => {
                    debug!(error = %e, "Dropping reply item");
                    batch.dropped += 1;
                }
            }
        }

        for (key, entity) in index.comments() {
            if used_keys.contains(&key) {
                continue;
            }
            match self.comment_from_entity(entity, None) {
                Ok(reply) => batch.accept(reply),
                Err(e) => {
                    debug!(error = %e, "Dropping reply entity");
                    batch.dropped += 1;
                }
            }
        }

        batch.next_token = reply_continuation_token(response);
        debug!(
            replies = batch.replies.len(),
            dropped = batch.dropped,
            has_next = batch.next_token.is_some(),
            "Extracted reply batch"
        );
        batch
    }

    /// Build a comment from a legacy `commentRenderer`.
    ///
    /// # Errors
    ///
    /// `Parse` if `commentId` is missing.
    pub fn comment_from_renderer(&self, renderer: &CommentRenderer) -> Result<Comment> {
        if renderer.comment_id.is_empty() {
            return Err(ArchiverError::parse("commentRenderer without commentId"));
        }

        let mut author = Author {
            display_name: renderer.author_text.first().unwrap_or_default().to_string(),
            avatar_url: last_thumbnail(&renderer.author_thumbnail),
            ..Author::default()
        };
        if let Some(browse) = renderer
            .author_endpoint
            .as_ref()
            .and_then(|e| e.browse_endpoint.as_ref())
        {
            author.id.clone_from(&browse.browse_id);
            if !browse.canonical_base_url.is_empty() {
                author.profile_url = absolutize(&self.site_base, &browse.canonical_base_url);
            }
        }
        apply_badges(
            &mut author,
            &renderer.author_badges,
            renderer.author_comment_badge.as_ref(),
        );
        if renderer.sponsor_comment_badge.is_some() {
            author.is_member = true;
        }

        let timestamp = renderer
            .published_time_text
            .first()
            .unwrap_or_default()
            .to_string();
        let buttons = renderer.action_buttons.comment_action_buttons_renderer.as_ref();
        let hearted = renderer.action_buttons.creator_heart.is_some()
            || buttons.is_some_and(|b| b.creator_heart.is_some());

        let mut reply_count = renderer
            .reply_count
            .as_ref()
            .map_or_else(|| "0".to_string(), reply_count_display);
        if reply_count == "0" {
            if let Some(text) = buttons
                .and_then(|b| b.reply_button.as_ref())
                .and_then(|b| b.button_renderer.text.first())
            {
                reply_count = first_digit_run(text);
            }
        }

        Ok(Comment {
            id: renderer.comment_id.clone(),
            text: renderer.content_text.joined(),
            like_count_display: renderer.vote_count.first().unwrap_or("0").to_string(),
            timestamp_is_relative: is_relative_timestamp(&timestamp),
            timestamp_display: timestamp,
            author,
            is_hearted_by_channel: hearted,
            is_pinned: renderer.pinned_comment_badge.is_some(),
            reply_count_display: reply_count,
            replies: Vec::new(),
        })
    }

    /// Build a comment from a `commentEntityPayload`, letting a separate
    /// toolbar entity override the inline toolbar's defaults.
    ///
    /// # Errors
    ///
    /// `Parse` if neither `commentId` nor the entity key is present.
    pub fn comment_from_entity(
        &self,
        entity: &CommentEntityPayload,
        toolbar_entity: Option<&Toolbar>,
    ) -> Result<Comment> {
        let props = &entity.properties;
        let id = if props.comment_id.is_empty() {
            entity.key.clone()
        } else {
            props.comment_id.clone()
        };
        if id.is_empty() {
            return Err(ArchiverError::parse("comment entity without id"));
        }

        let text = props
            .content
            .content
            .clone()
            .unwrap_or_else(|| run_text(&props.content.runs));

        let author_data = &entity.author;
        let command = &author_data.channel_command.innertube_command;
        let profile_path = command
            .browse_endpoint
            .as_ref()
            .map(|b| b.canonical_base_url.clone())
            .filter(|u| !u.is_empty())
            .or_else(|| {
                command
                    .command_metadata
                    .as_ref()
                    .and_then(|m| m.web_command_metadata.url.clone())
            })
            .unwrap_or_default();
        let author = Author {
            id: author_data.channel_id.clone(),
            display_name: author_data.display_name.clone(),
            profile_url: if profile_path.is_empty() {
                String::new()
            } else {
                absolutize(&self.site_base, &profile_path)
            },
            avatar_url: author_data.avatar_thumbnail_url.clone(),
            is_verified: author_data.is_verified,
            is_member: author_data.sponsor_badge_a11y.is_some(),
        };

        let engagement = Engagement::from_inline(&entity.toolbar).overridden_by(toolbar_entity);

        Ok(Comment {
            id,
            text,
            like_count_display: engagement.likes,
            timestamp_is_relative: is_relative_timestamp(&props.published_time),
            timestamp_display: props.published_time.clone(),
            author,
            is_hearted_by_channel: engagement.hearted,
            is_pinned: false,
            reply_count_display: engagement.replies,
            replies: Vec::new(),
        })
    }
}

/// Like count, heart flag and reply count of an entity comment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Engagement {
    likes: String,
    hearted: bool,
    replies: String,
}

impl Engagement {
    fn from_inline(toolbar: &Toolbar) -> Self {
        Self {
            likes: toolbar
                .like_count_a11y
                .clone()
                .or_else(|| toolbar.like_count_liked.clone())
                .unwrap_or_else(|| "0".to_string()),
            hearted: toolbar.heart_state.as_deref() == Some(HEARTED),
            replies: toolbar
                .reply_count_a11y
                .as_deref()
                .map_or_else(|| "0".to_string(), first_digit_run),
        }
    }

    /// Non-default values of the separate toolbar entity win.
    fn overridden_by(mut self, toolbar: Option<&Toolbar>) -> Self {
        let Some(toolbar) = toolbar else {
            return self;
        };
        if let Some(likes) = toolbar
            .like_count_a11y
            .as_deref()
            .filter(|l| !l.is_empty() && *l != "0")
        {
            self.likes = likes.to_string();
        }
        if toolbar.heart_state.as_deref() == Some(HEARTED) {
            self.hearted = true;
        }
        if let Some(replies) = toolbar
            .reply_count_a11y
            .as_deref()
            .map(first_digit_run)
            .filter(|r| r != "0")
        {
            self.replies = replies;
        }
        self
    }
}

/// `replyCount` as a text object, number or string.
fn reply_count_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(_) => parse_lenient::<Text>(value)
            .and_then(|t| t.first().map(str::to_string))
            .unwrap_or_else(|| "0".to_string()),
        _ => "0".to_string(),
    }
}

/// Reply continuation token, checked in order: the `continuations` array
/// (continuation data or its "show more replies" button), a continuation
/// marker in contents, then the `viewReplies` button.
#[must_use]
pub fn replies_token(replies: &RepliesRenderer) -> Option<String> {
    let from_continuations = replies.continuations.iter().find_map(|c| {
        c.next_continuation_data
            .as_ref()
            .map(|d| d.continuation.as_str())
            .filter(|t| !t.is_empty())
            .or_else(|| {
                c.button_renderer
                    .as_ref()
                    .and_then(|b| b.command.as_ref())
                    .and_then(|cmd| cmd.token())
            })
            .map(str::to_string)
    });

    from_continuations
        .or_else(|| {
            replies.contents.iter().find_map(|item| match ContentItem::classify(item) {
                ContentItem::Continuation(token) => Some(token),
                _ => None,
            })
        })
        .or_else(|| {
            replies
                .view_replies
                .as_ref()
                .and_then(|b| b.button_renderer.command.as_ref())
                .and_then(|cmd| cmd.token())
                .map(str::to_string)
        })
}
