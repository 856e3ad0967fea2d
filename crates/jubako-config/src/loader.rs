//! Resolution of flags, environment variables and defaults into an [`AppConfig`].

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::defaults::{APP_DIR_NAME, DEFAULT_BIND_ADDR, DEFAULT_LOG_LEVEL};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, ConfigWarning};
use crate::validate;

/// Command-line flags; each one falls back to its environment variable.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "jubako", about = "Stream media from a peer-to-peer swarm to a local player")]
pub struct CliArgs {
    /// HTTP port of the stream server.
    #[arg(long, env = "JUBAKO_PORT")]
    pub port: Option<String>,
    /// Data root; transfers are written to its `downloads` subdirectory.
    #[arg(long = "download-path", alias = "download_path", env = "JUBAKO_DOWNLOAD_PATH")]
    pub download_path: Option<PathBuf>,
    /// Address the HTTP server binds to.
    #[arg(long = "bind", env = "JUBAKO_BIND_ADDR")]
    pub bind: Option<String>,
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long = "log-level", env = "JUBAKO_LOG_LEVEL")]
    pub log_level: Option<String>,
    /// Log output format (`json` or `pretty`).
    #[arg(long = "log-format", env = "JUBAKO_LOG_FORMAT")]
    pub log_format: Option<String>,
    /// Directory of `<info-hash>/` folders served by the local engine.
    #[arg(long = "seed-dir", env = "JUBAKO_SEED_DIR")]
    pub seed_dir: Option<PathBuf>,
    /// Magnet URI to acquire at startup; repeat the flag for several.
    #[arg(long = "magnet", env = "JUBAKO_MAGNET")]
    pub magnets: Vec<String>,
    /// Player launched on the stream URL once playback can start (`auto` tries mpv, haruna, vlc).
    #[arg(long, env = "JUBAKO_PLAYER")]
    pub player: Option<String>,
}

/// Directories consulted for the default data root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeDirs {
    /// `$XDG_CONFIG_HOME` when set.
    pub xdg_config_home: Option<PathBuf>,
    /// `$HOME` when set.
    pub home: Option<PathBuf>,
}

impl HomeDirs {
    /// Read the directories from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            xdg_config_home: non_empty_var("XDG_CONFIG_HOME"),
            home: non_empty_var("HOME"),
        }
    }

    /// User configuration directory, if one can be derived.
    #[must_use]
    pub fn config_dir(&self) -> Option<PathBuf> {
        self.xdg_config_home
            .clone()
            .or_else(|| self.home.as_ref().map(|home| home.join(".config")))
    }

    /// Default data root: the user configuration directory, else the working directory.
    #[must_use]
    pub fn default_download_root(&self) -> PathBuf {
        self.config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }
}

fn non_empty_var(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Configuration plus the recoverable problems met while resolving it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved configuration.
    pub config: AppConfig,
    /// Values that were rejected in favour of defaults.
    pub warnings: Vec<ConfigWarning>,
}

/// Turns raw flag values into an [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    homes: HomeDirs,
}

impl ConfigLoader {
    /// Loader consulting the process environment for default directories.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_homes(HomeDirs::from_env())
    }

    /// Loader with explicit default directories.
    #[must_use]
    pub const fn with_homes(homes: HomeDirs) -> Self {
        Self { homes }
    }

    /// Parse the process arguments and resolve them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when arguments are malformed or a value fails validation.
    pub fn load(&self) -> ConfigResult<LoadedConfig> {
        self.load_from(std::env::args_os())
    }

    /// Parse an explicit argument list (first item is the program name) and resolve it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when arguments are malformed or a value fails validation.
    pub fn load_from<I, T>(&self, args: I) -> ConfigResult<LoadedConfig>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = CliArgs::try_parse_from(args).map_err(|source| ConfigError::Arguments { source })?;
        self.resolve(args)
    }

    /// Resolve already parsed flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value fails validation.
    pub fn resolve(&self, args: CliArgs) -> ConfigResult<LoadedConfig> {
        let mut warnings = Vec::new();
        let http_port = validate::port_or_default(args.port.as_deref(), &mut warnings);
        let bind_addr = validate::bind_addr(args.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR))?;
        let log_level = validate::log_level(args.log_level.as_deref(), DEFAULT_LOG_LEVEL);
        let log_format = validate::log_format(args.log_format.as_deref())?;

        let download_root = args
            .download_path
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| self.homes.default_download_root());
        let download_root = std::path::absolute(&download_root).map_err(|source| ConfigError::Io {
            operation: "storage.absolute_path",
            path: download_root.clone(),
            source,
        })?;

        Ok(LoadedConfig {
            config: AppConfig {
                bind_addr,
                http_port,
                download_root,
                log_level,
                log_format,
                seed_dir: args.seed_dir.filter(|path| !path.as_os_str().is_empty()),
                magnets: args
                    .magnets
                    .into_iter()
                    .map(|magnet| magnet.trim().to_string())
                    .filter(|magnet| !magnet.is_empty())
                    .collect(),
                player: args.player.filter(|player| !player.trim().is_empty()),
            },
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ConfigLoader {
        ConfigLoader::with_homes(HomeDirs {
            xdg_config_home: Some(PathBuf::from("/xdg")),
            home: Some(PathBuf::from("/home/viewer")),
        })
    }

    #[test]
    fn defaults_apply_without_flags() -> anyhow::Result<()> {
        let loaded = loader().resolve(CliArgs::default())?;
        assert!(loaded.warnings.is_empty());
        let config = loaded.config;
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5578");
        assert_eq!(config.download_root, PathBuf::from("/xdg/jubako"));
        assert_eq!(config.downloads_dir(), PathBuf::from("/xdg/jubako/downloads"));
        assert_eq!(config.log_level, "info");
        assert!(config.log_format.is_none());
        assert!(config.magnets.is_empty());
        assert!(config.player.is_none());
        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> anyhow::Result<()> {
        let loaded = loader().load_from([
            "jubako",
            "--port",
            "6000",
            "--download-path",
            "/srv/media",
            "--bind",
            "0.0.0.0",
            "--log-format",
            "json",
        ])?;
        let config = loaded.config;
        assert_eq!(config.http_port, 6000);
        assert_eq!(config.download_root, PathBuf::from("/srv/media"));
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:6000");
        assert_eq!(config.log_format.as_deref(), Some("json"));
        Ok(())
    }

    #[test]
    fn magnet_flag_repeats_and_player_is_kept() -> anyhow::Result<()> {
        let loaded = loader().load_from([
            "jubako",
            "--magnet",
            "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c",
            "--magnet",
            " ",
            "--magnet",
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567",
            "--player",
            "mpv",
        ])?;
        let config = loaded.config;
        assert_eq!(config.magnets.len(), 2);
        assert!(config.magnets[1].ends_with("01234567"));
        assert_eq!(config.player.as_deref(), Some("mpv"));
        Ok(())
    }

    #[test]
    fn invalid_port_falls_back_with_warning() -> anyhow::Result<()> {
        let loaded = loader().load_from(["jubako", "--port", "not-a-port"])?;
        assert_eq!(loaded.config.http_port, 5578);
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].field, "http_port");
        Ok(())
    }

    #[test]
    fn unknown_flag_is_an_argument_error() {
        assert!(matches!(
            loader().load_from(["jubako", "--frobnicate"]),
            Err(ConfigError::Arguments { .. })
        ));
    }

    #[test]
    fn home_fallbacks_apply_in_order() {
        let home_only = HomeDirs {
            xdg_config_home: None,
            home: Some(PathBuf::from("/home/viewer")),
        };
        assert_eq!(
            home_only.default_download_root(),
            PathBuf::from("/home/viewer/.config/jubako")
        );
        assert_eq!(
            HomeDirs::default().default_download_root(),
            PathBuf::from("./jubako")
        );
    }
}
