/// Storage bucket holding avatar images.
pub const AVATAR_BUCKET: &str = "avatars";
/// Recommended avatar edge length shown next to the picker, in pixels.
pub const RECOMMENDED_AVATAR_SIZE_PX: u32 = 200;
/// File picker filter for avatar images.
pub const AVATAR_ACCEPT: &str = "image/*";
/// PostgreSQL SQLSTATE reported by the backend for unique constraint violations.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";
/// Query parameter appended to avatar addresses to defeat stale caches.
pub const CACHE_BUST_PARAM: &str = "v";
