/// Cookie carrying the session id.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Default session lifetime (10 minutes).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 600;

/// Upper bound for a requested session lifetime (24 hours).
pub const DEFAULT_SESSION_MAX_TTL_SECS: i64 = 86_400;

/// Uncompacted renewals the reaper tolerates before rebuilding its queue.
pub const DEFAULT_GARBAGE_THRESHOLD: usize = 128;

/// Buffer size of the store-to-reaper notification channel.
pub const DEFAULT_NOTICE_CHANNEL_CAPACITY: usize = 32;

/// Default page size for user listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page size a listing will return.
pub const MAX_PAGE_SIZE: usize = 100;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 256;
