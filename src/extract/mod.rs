//! Extraction from raw API responses into the archive models.
//!
//! Nothing here performs I/O. [`navigator`] locates nodes, [`shapes`] gives
//! them types, and [`post`] and [`comment`] turn them into [`crate::models`].

pub mod comment;
pub mod navigator;
pub mod post;
pub mod shapes;

pub use comment::{CommentBatch, EntityIndex, ReconciledThread, Reconciler, ReplyBatch};
pub use post::PostExtractor;
pub use shapes::ContentItem;
