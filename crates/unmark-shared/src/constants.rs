/// Transformations allowed per identity per calendar day (UTC)
pub const DAILY_LIMIT: u32 = 5;

/// Maximum decoded upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Request body limit for JSON uploads. Base64 inflates by 4/3, plus envelope.
pub const MAX_REQUEST_BODY: usize = MAX_UPLOAD_SIZE / 3 * 4 + 1024 * 1024;

/// Length of a share slug in characters
pub const SHARE_SLUG_LEN: usize = 8;

/// Maximum number of entries returned by the public feed
pub const PUBLIC_FEED_CAP: u32 = 1000;

/// Default page size for history listings
pub const DEFAULT_HISTORY_PAGE: u32 = 20;

/// Largest page a single history listing may return
pub const MAX_HISTORY_PAGE: u32 = 100;

/// Fixed instruction sent with every remote transformation
pub const TRANSFORM_PROMPT: &str = "No one watermarks. Clean, high quality image.";

/// Identity used for the singleton scope of the local (device) store
pub const LOCAL_IDENTITY: &str = "local";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
