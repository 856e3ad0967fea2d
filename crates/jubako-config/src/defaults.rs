//! Default values applied when neither a flag nor an environment variable is set.

/// HTTP port used when none is configured or the configured one is invalid.
pub const DEFAULT_HTTP_PORT: u16 = 5578;
/// Loopback address the HTTP surface binds to by default.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
/// Log level applied when `RUST_LOG` and the config are both silent.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Directory name created below the user configuration directory.
pub const APP_DIR_NAME: &str = "jubako";
/// Subdirectory of the data root that transfers are written to.
pub const DOWNLOADS_DIR_NAME: &str = "downloads";
