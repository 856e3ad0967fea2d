//! Problem type URIs, media types and stream tuning.

pub(crate) const PROBLEM_INTERNAL: &str = "https://jubako.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://jubako.dev/problems/bad-request";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://jubako.dev/problems/not-found";

/// Media type announced for every stream response.
pub const STREAM_CONTENT_TYPE: &str = "video/x-matroska";
/// Media type of the Prometheus text exposition.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";
/// Bytes buffered ahead of the player when reading through a live transfer.
pub const STREAM_READ_AHEAD: usize = 20 * 1024 * 1024;
/// Chunk size of the live transfer body.
pub(crate) const STREAM_CHUNK: usize = 64 * 1024;
