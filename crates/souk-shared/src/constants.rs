/// Collection holding marketplace listings.
pub const LISTINGS: &str = "listings";

/// Collection holding conversation threads.
pub const THREADS: &str = "threads";

/// Sub-collection (under a thread document) holding its messages.
pub const MESSAGES: &str = "messages";

/// Collection holding user profiles.
pub const USERS: &str = "users";

/// Field every paginated / realtime collection is ordered by.
pub const CREATED_AT: &str = "createdAt";

/// Prefix of unscoped thread ids: `thread_{p1}_{p2}`.
pub const THREAD_PREFIX: &str = "thread_";

/// Prefix of scoped thread ids: `thread_scoped_{scope}_{p1}_{p2}`.
pub const SCOPED_THREAD_PREFIX: &str = "thread_scoped_";

/// Parallel asset lists on a document: public URLs and their opaque ids.
pub const ASSET_URLS: &str = "assetUrls";
pub const ASSET_IDS: &str = "assetIds";

/// Preview text written to a thread when the latest message is image-only.
pub const IMAGE_PREVIEW_TEXT: &str = "Image";

/// Maximum number of values accepted by an `in` filter.
pub const MAX_IN_VALUES: usize = 10;

/// Default page size for paginated listing queries.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Default number of uploads kept in flight at once.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 3;

/// Default number of messages kept in a realtime message flow.
pub const DEFAULT_MESSAGE_WINDOW: usize = 50;

/// Default folders on the asset host.
pub const LISTING_FOLDER: &str = "souk-listing-pictures";
pub const CHAT_FOLDER: &str = "souk-chat-pictures";
pub const AVATAR_FOLDER: &str = "souk-profile-pictures";

/// Maximum upload size in bytes (10 MiB).
pub const MAX_ASSET_SIZE: usize = 10 * 1024 * 1024;
