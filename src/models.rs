//! Canonical data model for archived posts, comments and run metadata.
//!
//! Every extractor in the crate converges on these types. The serde
//! representation is the archive's canonical JSON layout: author fields are
//! flattened into their owning post or comment under `author_*` keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArchiverError, Result};

/// A channel that authored a post or comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    #[serde(rename = "author_id")]
    pub id: String,
    #[serde(rename = "author")]
    pub display_name: String,
    #[serde(rename = "author_url")]
    pub profile_url: String,
    #[serde(rename = "author_thumbnail")]
    pub avatar_url: String,
    #[serde(rename = "author_is_verified")]
    pub is_verified: bool,
    #[serde(rename = "author_is_member")]
    pub is_member: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(rename = "text")]
    pub display_text: String,
    #[serde(rename = "url")]
    pub target_url: String,
}

/// An image attachment. `local_path` and `byte_size` are filled in by the
/// downloader after extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    #[serde(rename = "src")]
    pub remote_url: String,
    pub local_path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(rename = "file_size")]
    pub byte_size: Option<u64>,
}

/// A top-level comment or a reply. Replies never carry replies of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(rename = "like_count")]
    pub like_count_display: String,
    #[serde(rename = "timestamp")]
    pub timestamp_display: String,
    #[serde(rename = "timestamp_estimated")]
    pub timestamp_is_relative: bool,
    #[serde(flatten)]
    pub author: Author,
    #[serde(rename = "is_favorited")]
    pub is_hearted_by_channel: bool,
    pub is_pinned: bool,
    #[serde(rename = "reply_count")]
    pub reply_count_display: String,
    pub replies: Vec<Comment>,
}

impl Default for Comment {
    fn default() -> Self {
        Self {
            id: String::new(),
            text: String::new(),
            like_count_display: "0".to_string(),
            timestamp_display: String::new(),
            timestamp_is_relative: true,
            author: Author::default(),
            is_hearted_by_channel: false,
            is_pinned: false,
            reply_count_display: "0".to_string(),
            replies: Vec::new(),
        }
    }
}

impl Comment {
    /// Append a reply unless one with the same id is already present.
    ///
    /// Returns `true` if the reply was appended.
    pub fn push_reply(&mut self, reply: Comment) -> bool {
        if self.replies.iter().any(|r| r.id == reply.id) {
            return false;
        }
        self.replies.push(reply);
        true
    }

    /// This comment plus all of its replies.
    #[must_use]
    pub fn total_count(&self) -> usize {
        1 + self.replies.iter().map(Comment::total_count).sum::<usize>()
    }

    /// # Errors
    ///
    /// Returns a parse error if the value cannot be serialized.
    pub fn to_canonical(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ArchiverError::parse(e.to_string()))
    }

    /// Rebuild a comment from its canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed input or an empty id anywhere in
    /// the tree.
    pub fn from_canonical(value: &Value) -> Result<Self> {
        let comment = Self::deserialize(value).map_err(|e| ArchiverError::parse(e.to_string()))?;
        comment.check_ids()?;
        Ok(comment)
    }

    fn check_ids(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ArchiverError::parse("comment without id"));
        }
        self.replies.iter().try_for_each(Comment::check_ids)
    }
}

/// A community post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    #[serde(rename = "post_id")]
    pub id: String,
    #[serde(rename = "content")]
    pub text: String,
    #[serde(rename = "timestamp")]
    pub timestamp_display: String,
    #[serde(rename = "timestamp_estimated")]
    pub timestamp_is_relative: bool,
    #[serde(rename = "likes", default = "zero")]
    pub like_count_display: String,
    #[serde(rename = "comments_count", default = "zero")]
    pub declared_comment_count: String,
    #[serde(rename = "members_only")]
    pub is_members_only: bool,
    #[serde(flatten)]
    pub author: Author,
    pub images: Vec<Image>,
    pub links: Vec<Link>,
    pub comments: Vec<Comment>,
}

fn zero() -> String {
    "0".to_string()
}

impl Post {
    /// Number of comments including replies.
    #[must_use]
    pub fn total_comments(&self) -> usize {
        self.comments.iter().map(Comment::total_count).sum()
    }

    /// # Errors
    ///
    /// Returns a parse error if the value cannot be serialized.
    pub fn to_canonical(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ArchiverError::parse(e.to_string()))
    }

    /// Rebuild a post from its canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed input or a missing post or
    /// comment id.
    pub fn from_canonical(value: &Value) -> Result<Self> {
        let post = Self::deserialize(value).map_err(|e| ArchiverError::parse(e.to_string()))?;
        if post.id.is_empty() {
            return Err(ArchiverError::parse("post without post_id"));
        }
        post.comments.iter().try_for_each(Comment::check_ids)?;
        Ok(post)
    }
}

/// Run metadata written alongside the posts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveMetadata {
    pub channel_id: String,
    pub scrape_date: String,
    pub scrape_timestamp: i64,
    pub posts_count: usize,
    pub total_comments: usize,
    pub total_images: usize,
    pub images_downloaded: usize,
    /// Items dropped and pagination scopes cut short during the run.
    pub warnings: usize,
    pub config_used: Value,
}

impl ArchiveMetadata {
    #[must_use]
    pub fn new(channel_id: impl Into<String>) -> Self {
        let now = chrono::Local::now();
        Self {
            channel_id: channel_id.into(),
            scrape_date: now.to_rfc3339(),
            scrape_timestamp: now.timestamp(),
            config_used: Value::Object(serde_json::Map::new()),
            ..Self::default()
        }
    }
}

/// A complete archive: metadata plus the posts gathered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveData {
    #[serde(flatten)]
    pub metadata: ArchiveMetadata,
    pub posts: Vec<Post>,
}

impl ArchiveData {
    #[must_use]
    pub fn new(metadata: ArchiveMetadata, posts: Vec<Post>) -> Self {
        let mut data = Self { metadata, posts };
        data.refresh_totals();
        data
    }

    /// Recompute the derived totals from the posts.
    pub fn refresh_totals(&mut self) {
        self.metadata.posts_count = self.posts.len();
        self.metadata.total_comments = self.posts.iter().map(Post::total_comments).sum();
        self.metadata.total_images = self.posts.iter().map(|p| p.images.len()).sum();
        self.metadata.images_downloaded = self
            .posts
            .iter()
            .flat_map(|p| &p.images)
            .filter(|img| img.local_path.is_some())
            .count();
    }

    /// # Errors
    ///
    /// Returns a parse error if the value cannot be serialized.
    pub fn to_canonical(&mut self) -> Result<Value> {
        self.refresh_totals();
        serde_json::to_value(&*self).map_err(|e| ArchiverError::parse(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns a parse error for malformed input or any post without an id.
    pub fn from_canonical(value: &Value) -> Result<Self> {
        let data = Self::deserialize(value).map_err(|e| ArchiverError::parse(e.to_string()))?;
        for post in &data.posts {
            if post.id.is_empty() {
                return Err(ArchiverError::parse("post without post_id"));
            }
            post.comments.iter().try_for_each(Comment::check_ids)?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_author() -> Author {
        Author {
            id: "UCabcdefghijklmnopqrstuv".to_string(),
            display_name: "Some Channel".to_string(),
            profile_url: "https://www.youtube.com/@some".to_string(),
            avatar_url: "https://yt3.ggpht.com/a.jpg".to_string(),
            is_verified: true,
            is_member: false,
        }
    }

    fn sample_post() -> Post {
        let reply = Comment {
            id: "Ugz.reply1".to_string(),
            text: "a reply".to_string(),
            author: sample_author(),
            ..Comment::default()
        };
        let comment = Comment {
            id: "Ugz".to_string(),
            text: "top level".to_string(),
            like_count_display: "1.2K".to_string(),
            timestamp_display: "2 days ago".to_string(),
            is_pinned: true,
            is_hearted_by_channel: true,
            reply_count_display: "1".to_string(),
            replies: vec![reply],
            ..Comment::default()
        };
        Post {
            id: "UgkxPOST".to_string(),
            text: "Hello world".to_string(),
            timestamp_display: "3 weeks ago".to_string(),
            timestamp_is_relative: true,
            like_count_display: "15K".to_string(),
            declared_comment_count: "312".to_string(),
            is_members_only: false,
            author: sample_author(),
            images: vec![Image {
                remote_url: "https://yt3.ggpht.com/img=s0".to_string(),
                width: Some(1080),
                height: Some(1080),
                ..Image::default()
            }],
            links: vec![Link {
                display_text: "example".to_string(),
                target_url: "https://example.com".to_string(),
            }],
            comments: vec![comment],
        }
    }

    #[test]
    fn test_post_canonical_round_trip() {
        let post = sample_post();
        let value = post.to_canonical().unwrap();
        let back = Post::from_canonical(&value).unwrap();
        assert_eq!(post, back);
    }

    #[test]
    fn test_post_canonical_keys() {
        let value = sample_post().to_canonical().unwrap();
        assert_eq!(value["post_id"], "UgkxPOST");
        assert_eq!(value["content"], "Hello world");
        assert_eq!(value["likes"], "15K");
        assert_eq!(value["comments_count"], "312");
        assert_eq!(value["author"], "Some Channel");
        assert_eq!(value["author_id"], "UCabcdefghijklmnopqrstuv");
        assert_eq!(value["author_is_verified"], true);
        assert_eq!(value["images"][0]["src"], "https://yt3.ggpht.com/img=s0");
        assert_eq!(value["images"][0]["local_path"], Value::Null);
        assert_eq!(value["links"][0]["text"], "example");
        assert_eq!(value["comments"][0]["is_favorited"], true);
        assert_eq!(value["comments"][0]["like_count"], "1.2K");
        assert_eq!(value["comments"][0]["replies"][0]["id"], "Ugz.reply1");
    }

    #[test]
    fn test_from_canonical_defaults() {
        let post = Post::from_canonical(&json!({"post_id": "abc"})).unwrap();
        assert_eq!(post.like_count_display, "0");
        assert_eq!(post.declared_comment_count, "0");
        assert!(post.comments.is_empty());

        let comment = Comment::from_canonical(&json!({"id": "c1"})).unwrap();
        assert!(comment.timestamp_is_relative);
        assert_eq!(comment.reply_count_display, "0");
    }

    #[test]
    fn test_from_canonical_rejects_empty_ids() {
        assert!(Post::from_canonical(&json!({"content": "no id"})).is_err());
        assert!(Post::from_canonical(&json!({"post_id": "p", "comments": [{"text": "x"}]})).is_err());
        assert!(Comment::from_canonical(&json!({"id": "c", "replies": [{"id": ""}]})).is_err());
    }

    #[test]
    fn test_push_reply_dedups() {
        let mut comment = Comment {
            id: "c".to_string(),
            ..Comment::default()
        };
        let reply = Comment {
            id: "r".to_string(),
            ..Comment::default()
        };
        assert!(comment.push_reply(reply.clone()));
        assert!(!comment.push_reply(reply));
        assert_eq!(comment.replies.len(), 1);
    }

    #[test]
    fn test_archive_totals() {
        let mut post = sample_post();
        post.images[0].local_path = Some("images/UgkxPOST.jpg".to_string());
        let mut archive = ArchiveData::new(ArchiveMetadata::new("UCabcdefghijklmnopqrstuv"), vec![post]);
        assert_eq!(archive.metadata.posts_count, 1);
        assert_eq!(archive.metadata.total_comments, 2);
        assert_eq!(archive.metadata.total_images, 1);
        assert_eq!(archive.metadata.images_downloaded, 1);

        let value = archive.to_canonical().unwrap();
        assert_eq!(value["channel_id"], "UCabcdefghijklmnopqrstuv");
        assert_eq!(value["total_comments"], 2);
        let back = ArchiveData::from_canonical(&value).unwrap();
        assert_eq!(back, archive);
    }
}
