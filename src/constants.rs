//! Shared constants used across the application.

/// Public site origin. Used for absolute links and as the SAPISID hash origin.
pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

/// Base URL of the internal JSON API.
pub const YOUTUBE_API_BASE_URL: &str = "https://www.youtube.com/youtubei/v1";

/// Browser user agent sent with every request.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Web client version the API expects in the `context` envelope and headers.
pub const CLIENT_VERSION: &str = "2.20241113.07.00";

/// Web client name for the `context` envelope.
pub const CLIENT_NAME: &str = "WEB";

/// Numeric client name for the `X-YouTube-Client-Name` header.
pub const CLIENT_NAME_ID: &str = "1";

/// Interface language requested in the `context` envelope.
pub const CLIENT_LOCALE: &str = "en-GB";

/// Opaque `params` blob selecting the community/posts tab of a channel.
pub const COMMUNITY_TAB_PARAMS: &str = "Egljb21tdW5pdHnyBgQKAkoA";

/// `browseId` used for single-post detail requests.
pub const POST_DETAIL_BROWSE_ID: &str = "FEpost_detail";

/// Tab titles (lowercased) that identify the community tab.
pub const POSTS_TAB_TITLES: &[&str] = &["posts", "community"];

/// `sectionIdentifier` of the comment section inside a post-detail response.
pub const COMMENT_SECTION_ID: &str = "comment-item-section";

/// Hard ceiling on reply continuation fetches per comment.
pub const MAX_REPLY_PAGES: usize = 10;

/// Cooldown applied to a host after a 429 with no `Retry-After` hint.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Depth ceiling for the last-resort recursive search over a response.
pub const MAX_SEARCH_DEPTH: usize = 32;

/// Node ceiling for the last-resort recursive search over a response.
pub const MAX_SEARCH_NODES: usize = 50_000;

/// Words that mark a display timestamp as relative ("3 days ago", "edited").
pub const RELATIVE_TIME_INDICATORS: &[&str] = &[
    "hour", "hours", "minute", "minutes", "day", "days", "week", "weeks", "month", "months",
    "year", "years", "ago", "edited",
];

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_MAX_COMMENTS: usize = 100;
pub const DEFAULT_MAX_REPLIES: usize = 200;
pub const DEFAULT_COMMENT_BATCH_DELAY_MS: u64 = 500;
pub const DEFAULT_REPLY_BATCH_DELAY_MS: u64 = 300;

/// Directory (under the output directory) that downloaded images go to.
pub const IMAGES_DIR_NAME: &str = "images";
