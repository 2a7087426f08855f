//! Typed views over the upstream response envelopes.
//!
//! Every struct uses `#[serde(default)]` so an absent field is simply empty.
//! Fields whose upstream type has been seen to drift are read through
//! [`lenient`], which falls back to the default instead of failing the
//! whole renderer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize `T`, or `T::default()` if the value has an unexpected shape.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(&value).unwrap_or_default())
}

/// Deserialize a sequence, keeping only the elements that parse as `T`.
pub fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Parse `value` as `T`, treating any mismatch as absent.
#[must_use]
pub fn parse_lenient<T: DeserializeOwned>(value: &Value) -> Option<T> {
    T::deserialize(value).ok()
}

/// Display text: either `simpleText` or a list of runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Text {
    pub simple_text: Option<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub runs: Vec<Run>,
}

impl Text {
    /// `simpleText` if present, else the first run.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.simple_text
            .as_deref()
            .or_else(|| self.runs.first().map(|r| r.text.as_str()))
    }

    /// `simpleText` if present, else all runs concatenated.
    #[must_use]
    pub fn joined(&self) -> String {
        match &self.simple_text {
            Some(text) => text.clone(),
            None => self.runs.iter().map(|r| r.text.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Run {
    pub text: String,
    #[serde(deserialize_with = "lenient")]
    pub navigation_endpoint: Option<NavigationEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationEndpoint {
    #[serde(deserialize_with = "lenient")]
    pub command_metadata: Option<CommandMetadata>,
    #[serde(deserialize_with = "lenient")]
    pub url_endpoint: Option<UrlEndpoint>,
    #[serde(deserialize_with = "lenient")]
    pub browse_endpoint: Option<BrowseEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandMetadata {
    pub web_command_metadata: WebCommandMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebCommandMetadata {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UrlEndpoint {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowseEndpoint {
    pub browse_id: String,
    pub canonical_base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thumbnails {
    #[serde(deserialize_with = "lenient_seq")]
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: String,
    #[serde(deserialize_with = "lenient")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Badge {
    #[serde(deserialize_with = "lenient")]
    pub metadata_badge_renderer: Option<MetadataBadge>,
    #[serde(deserialize_with = "lenient")]
    pub live_chat_author_badge_renderer: Option<LiveChatBadge>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataBadge {
    pub style: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveChatBadge {
    pub author_badge_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorCommentBadge {
    #[serde(deserialize_with = "lenient")]
    pub author_comment_badge_renderer: Option<AuthorCommentBadgeRenderer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorCommentBadgeRenderer {
    pub icon: Icon,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Icon {
    pub icon_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionButtons {
    #[serde(deserialize_with = "lenient")]
    pub comment_action_buttons_renderer: Option<CommentActionButtons>,
    pub creator_heart: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentActionButtons {
    #[serde(deserialize_with = "lenient")]
    pub reply_button: Option<ButtonWrapper>,
    pub creator_heart: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonWrapper {
    pub button_renderer: ButtonRenderer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ButtonRenderer {
    #[serde(deserialize_with = "lenient")]
    pub text: Text,
    #[serde(deserialize_with = "lenient")]
    pub command: Option<ContinuationHolder>,
}

/// Any node carrying `continuationCommand.token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinuationHolder {
    pub continuation_command: Option<ContinuationCommand>,
}

impl ContinuationHolder {
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.continuation_command
            .as_ref()
            .map(|c| c.token.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContinuationCommand {
    pub token: String,
}

/// `continuationItemRenderer`: the "show more" marker ending a batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinuationItemRenderer {
    #[serde(deserialize_with = "lenient")]
    pub continuation_endpoint: Option<ContinuationHolder>,
    #[serde(deserialize_with = "lenient")]
    pub button: Option<ButtonWrapper>,
}

impl ContinuationItemRenderer {
    /// Token from the endpoint, else from the button command.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.continuation_endpoint
            .as_ref()
            .and_then(ContinuationHolder::token)
            .or_else(|| {
                self.button
                    .as_ref()
                    .and_then(|b| b.button_renderer.command.as_ref())
                    .and_then(ContinuationHolder::token)
            })
    }
}

/// `backstagePostRenderer`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostRenderer {
    pub post_id: String,
    #[serde(deserialize_with = "lenient")]
    pub author_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub author_endpoint: Option<NavigationEndpoint>,
    #[serde(deserialize_with = "lenient")]
    pub author_thumbnail: Thumbnails,
    #[serde(deserialize_with = "lenient_seq")]
    pub author_badges: Vec<Badge>,
    #[serde(deserialize_with = "lenient")]
    pub author_comment_badge: Option<AuthorCommentBadge>,
    #[serde(deserialize_with = "lenient")]
    pub content_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub published_time_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub vote_count: Text,
    #[serde(deserialize_with = "lenient")]
    pub action_buttons: ActionButtons,
    pub sponsors_only_badge: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub backstage_attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    #[serde(deserialize_with = "lenient")]
    pub backstage_image_renderer: Option<ImageRenderer>,
    #[serde(deserialize_with = "lenient")]
    pub post_multi_image_renderer: Option<MultiImageRenderer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageRenderer {
    pub image: Thumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MultiImageRenderer {
    #[serde(deserialize_with = "lenient_seq")]
    pub images: Vec<Attachment>,
}

/// Legacy `commentRenderer`, used for comments and replies alike.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentRenderer {
    pub comment_id: String,
    #[serde(deserialize_with = "lenient")]
    pub content_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub vote_count: Text,
    #[serde(deserialize_with = "lenient")]
    pub published_time_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub author_text: Text,
    #[serde(deserialize_with = "lenient")]
    pub author_endpoint: Option<NavigationEndpoint>,
    #[serde(deserialize_with = "lenient")]
    pub author_thumbnail: Thumbnails,
    #[serde(deserialize_with = "lenient_seq")]
    pub author_badges: Vec<Badge>,
    #[serde(deserialize_with = "lenient")]
    pub author_comment_badge: Option<AuthorCommentBadge>,
    pub sponsor_comment_badge: Option<Value>,
    /// A text object, a bare number or a string depending on the client.
    pub reply_count: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub action_buttons: ActionButtons,
    pub pinned_comment_badge: Option<Value>,
}

/// `commentRepliesRenderer` hanging off a thread.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepliesRenderer {
    /// Raw items: embedded `commentRenderer`s and continuation markers.
    #[serde(deserialize_with = "lenient")]
    pub contents: Vec<Value>,
    #[serde(deserialize_with = "lenient_seq")]
    pub continuations: Vec<RepliesContinuation>,
    #[serde(deserialize_with = "lenient")]
    pub view_replies: Option<ButtonWrapper>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepliesContinuation {
    #[serde(deserialize_with = "lenient")]
    pub next_continuation_data: Option<NextContinuationData>,
    #[serde(deserialize_with = "lenient")]
    pub button_renderer: Option<ButtonRenderer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NextContinuationData {
    pub continuation: String,
}

/// Keys a view-model thread uses to point into the entity payloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentViewModel {
    pub comment_key: String,
    pub toolbar_state_key: String,
    pub inline_replies_key: String,
    pub comment_id: String,
    pub pinned_text: Option<Value>,
}

/// `commentEntityPayload`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentEntityPayload {
    pub key: String,
    #[serde(deserialize_with = "lenient")]
    pub properties: EntityProperties,
    #[serde(deserialize_with = "lenient")]
    pub author: EntityAuthor,
    #[serde(deserialize_with = "lenient")]
    pub toolbar: Toolbar,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityProperties {
    pub comment_id: String,
    #[serde(deserialize_with = "lenient")]
    pub content: EntityContent,
    pub published_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityContent {
    pub content: Option<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityAuthor {
    pub channel_id: String,
    pub display_name: String,
    pub avatar_thumbnail_url: String,
    #[serde(deserialize_with = "lenient")]
    pub is_verified: bool,
    pub sponsor_badge_a11y: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub channel_command: ChannelCommand,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelCommand {
    pub innertube_command: NavigationEndpoint,
}

/// Engagement toolbar state, inline on a comment entity or as its own
/// `engagementToolbarStateEntityPayload`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Toolbar {
    pub like_count_a11y: Option<String>,
    pub like_count_liked: Option<String>,
    pub heart_state: Option<String>,
    pub reply_count_a11y: Option<String>,
}

/// One content item from a feed, comment or reply batch.
#[derive(Debug, Clone)]
pub enum ContentItem {
    Post(Box<PostRenderer>),
    /// Thread whose comment is a full `commentRenderer`.
    LegacyThread {
        comment: Box<CommentRenderer>,
        replies: Option<RepliesRenderer>,
    },
    /// Thread whose comment lives in the batch's entity payloads.
    ViewModelThread {
        view_model: CommentViewModel,
        replies: Option<RepliesRenderer>,
    },
    /// A bare `commentRenderer` (replies in reply batches).
    Comment(Box<CommentRenderer>),
    Continuation(String),
    /// Anything else; carries the item's first key for diagnostics.
    Unrecognized(String),
}

impl ContentItem {
    /// Classify a raw item into one of the known shapes.
    #[must_use]
    pub fn classify(item: &Value) -> Self {
        if let Some(post) = item
            .pointer("/backstagePostThreadRenderer/post/backstagePostRenderer")
            .or_else(|| item.get("backstagePostRenderer"))
        {
            return parse_lenient::<PostRenderer>(post).map_or_else(
                || Self::Unrecognized("backstagePostRenderer".to_string()),
                |p| Self::Post(Box::new(p)),
            );
        }

        if let Some(thread) = item.get("commentThreadRenderer") {
            let replies = thread
                .pointer("/replies/commentRepliesRenderer")
                .and_then(parse_lenient::<RepliesRenderer>);

            if let Some(vm) = thread.pointer("/commentViewModel/commentViewModel") {
                if let Some(view_model) = parse_lenient::<CommentViewModel>(vm) {
                    return Self::ViewModelThread { view_model, replies };
                }
            }
            if let Some(renderer) = thread.pointer("/comment/commentRenderer") {
                if let Some(comment) = parse_lenient::<CommentRenderer>(renderer) {
                    return Self::LegacyThread {
                        comment: Box::new(comment),
                        replies,
                    };
                }
            }
            return Self::Unrecognized("commentThreadRenderer".to_string());
        }

        if let Some(renderer) = item.get("commentRenderer") {
            return parse_lenient::<CommentRenderer>(renderer).map_or_else(
                || Self::Unrecognized("commentRenderer".to_string()),
                |c| Self::Comment(Box::new(c)),
            );
        }

        if let Some(marker) = item.get("continuationItemRenderer") {
            if let Some(token) =
                parse_lenient::<ContinuationItemRenderer>(marker).and_then(|c| c.token().map(str::to_string))
            {
                return Self::Continuation(token);
            }
            return Self::Unrecognized("continuationItemRenderer".to_string());
        }

        let key = item
            .as_object()
            .and_then(|o| o.keys().next().cloned())
            .unwrap_or_else(|| "<non-object>".to_string());
        Self::Unrecognized(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_first_and_joined() {
        let t: Text = parse_lenient(&json!({"runs": [{"text": "a"}, {"text": "b"}]})).unwrap();
        assert_eq!(t.first(), Some("a"));
        assert_eq!(t.joined(), "ab");

        let t: Text = parse_lenient(&json!({"simpleText": "x"})).unwrap();
        assert_eq!(t.first(), Some("x"));
        assert_eq!(t.joined(), "x");
    }

    #[test]
    fn test_lenient_fields_survive_bad_types() {
        let renderer: PostRenderer = parse_lenient(&json!({
            "postId": "P1",
            "contentText": "not an object",
            "authorBadges": [{"metadataBadgeRenderer": {"style": "BADGE_STYLE_TYPE_VERIFIED"}}, 42],
            "authorThumbnail": {"thumbnails": [{"url": "u", "width": "wide"}]}
        }))
        .unwrap();
        assert_eq!(renderer.post_id, "P1");
        assert!(renderer.content_text.runs.is_empty());
        assert_eq!(renderer.author_badges.len(), 1);
        assert_eq!(renderer.author_thumbnail.thumbnails[0].url, "u");
        assert_eq!(renderer.author_thumbnail.thumbnails[0].width, None);
    }

    #[test]
    fn test_classify_post() {
        let item = json!({"backstagePostThreadRenderer": {"post": {"backstagePostRenderer": {"postId": "P"}}}});
        assert!(matches!(ContentItem::classify(&item), ContentItem::Post(p) if p.post_id == "P"));
    }

    #[test]
    fn test_classify_threads() {
        let legacy = json!({"commentThreadRenderer": {"comment": {"commentRenderer": {"commentId": "C"}}}});
        assert!(matches!(
            ContentItem::classify(&legacy),
            ContentItem::LegacyThread { comment, replies: None } if comment.comment_id == "C"
        ));

        let vm = json!({"commentThreadRenderer": {
            "commentViewModel": {"commentViewModel": {"commentKey": "k", "toolbarStateKey": "t", "inlineRepliesKey": "r"}},
            "replies": {"commentRepliesRenderer": {"contents": []}}
        }});
        match ContentItem::classify(&vm) {
            ContentItem::ViewModelThread { view_model, replies } => {
                assert_eq!(view_model.comment_key, "k");
                assert!(replies.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_continuation_variants() {
        let endpoint = json!({"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "T1"}}}});
        assert!(matches!(ContentItem::classify(&endpoint), ContentItem::Continuation(t) if t == "T1"));

        let button = json!({"continuationItemRenderer": {"button": {"buttonRenderer": {"command": {"continuationCommand": {"token": "T2"}}}}}});
        assert!(matches!(ContentItem::classify(&button), ContentItem::Continuation(t) if t == "T2"));

        let empty = json!({"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": ""}}}});
        assert!(matches!(ContentItem::classify(&empty), ContentItem::Unrecognized(_)));
    }

    #[test]
    fn test_classify_unrecognized() {
        assert!(matches!(
            ContentItem::classify(&json!({"shelfRenderer": {}})),
            ContentItem::Unrecognized(k) if k == "shelfRenderer"
        ));
        assert!(matches!(ContentItem::classify(&json!(7)), ContentItem::Unrecognized(_)));
    }
}
