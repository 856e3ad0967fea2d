//! Resolved configuration values.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::defaults::DOWNLOADS_DIR_NAME;
use crate::error::{ConfigError, ConfigResult};

/// Fully resolved process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    /// Address the HTTP surface binds to.
    pub bind_addr: IpAddr,
    /// Port the HTTP surface listens on.
    pub http_port: u16,
    /// Absolute data root; transfers go to its `downloads` subdirectory.
    pub download_root: PathBuf,
    /// Log level handed to the tracing filter.
    pub log_level: String,
    /// Requested log format name, inferred from the build when absent.
    pub log_format: Option<String>,
    /// Directory of `<info-hash>/` folders served by the local engine.
    pub seed_dir: Option<PathBuf>,
    /// Magnet URIs acquired as soon as the server is up.
    pub magnets: Vec<String>,
    /// Player command launched on the stream URL, `auto` to try known players.
    pub player: Option<String>,
}

impl AppConfig {
    /// Socket address of the HTTP surface.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }

    /// Directory transfers are written below.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.download_root.join(DOWNLOADS_DIR_NAME)
    }

    /// Create the data root and the downloads directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when a directory cannot be created.
    pub fn prepare_directories(&self) -> ConfigResult<()> {
        create_dir(&self.download_root)?;
        create_dir(&self.downloads_dir())
    }
}

fn create_dir(path: &Path) -> ConfigResult<()> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::Io {
        operation: "storage.create_dir",
        path: path.to_path_buf(),
        source,
    })
}

/// Recoverable configuration problem that fell back to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Field that was ignored.
    pub field: &'static str,
    /// Rejected value.
    pub value: String,
    /// Machine-readable reason.
    pub reason: &'static str,
    /// Value used instead.
    pub fallback: String,
}

impl Display for ConfigWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} value {:?} rejected ({}); using {}",
            self.field, self.value, self.reason, self.fallback
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn prepare_directories_creates_downloads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = AppConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: 5578,
            download_root: dir.path().join("jubako"),
            log_level: "info".into(),
            log_format: None,
            seed_dir: None,
            magnets: Vec::new(),
            player: None,
        };
        config.prepare_directories()?;
        assert!(config.downloads_dir().is_dir());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5578");
        Ok(())
    }

    #[test]
    fn warning_display_names_field_and_fallback() {
        let warning = ConfigWarning {
            field: "http_port",
            value: "abc".into(),
            reason: "not a port number",
            fallback: "5578".into(),
        };
        assert_eq!(
            warning.to_string(),
            "http_port value \"abc\" rejected (not a port number); using 5578"
        );
    }
}
