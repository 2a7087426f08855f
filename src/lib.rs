//! Community post archiver library.
//!
//! Fetches a channel's community posts through the web client's JSON API,
//! follows post, comment and reply pagination, and reconciles the legacy and
//! entity-based response encodings into one archive model.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod media;
pub mod models;
pub mod output;
pub mod resolver;
pub mod scraper;
pub mod target;

pub use error::{ArchiverError, Result};
