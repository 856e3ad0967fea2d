use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jubako_api::{ApiServer, ApiState};
use jubako_config::{AppConfig, ConfigLoader, ConfigWarning};
use jubako_swarm_core::{ReadyFileRegistry, SwarmEngine};
use jubako_swarm_local::LocalEngine;
use jubako_telemetry::{
    GlobalContextGuard, LoggingConfig, Metrics, init_logging, log_format_from_str,
    record_app_mode,
};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::orchestrator::Orchestrator;
use crate::playback::{PlayerLauncher, start_acquisitions};

/// Upper bound on draining HTTP connections once shutdown begins.
const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Dependencies required to bootstrap the Jubako application.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    warnings: Vec<ConfigWarning>,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the command line and environment.
    pub(crate) fn from_env() -> AppResult<Self> {
        let loaded = ConfigLoader::from_env()
            .load()
            .map_err(|err| AppError::config("config.load", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config: loaded.config,
            warnings: loaded.warnings,
            telemetry,
        })
    }
}

/// Entry point for the Jubako boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, or the stream server fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    let logging = LoggingConfig {
        level: &dependencies.config.log_level,
        format: log_format_from_str(dependencies.config.log_format.as_deref()),
        build_sha: option_env!("JUBAKO_BUILD_SHA").unwrap_or("dev"),
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    info!("Jubako application bootstrap starting");
    Box::pin(run_app_with(dependencies, shutdown_signal())).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
pub(crate) async fn run_app_with<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send,
{
    let BootstrapDependencies {
        config,
        warnings,
        telemetry,
    } = dependencies;
    for warning in &warnings {
        warn!(
            field = warning.field,
            value = %warning.value,
            reason = warning.reason,
            fallback = %warning.fallback,
            "configuration value ignored"
        );
    }

    config
        .prepare_directories()
        .map_err(|err| AppError::config("config.prepare_directories", err))?;

    let local = LocalEngine::new(config.downloads_dir());
    if let Some(seed_dir) = config.seed_dir.as_deref() {
        let seeded = local
            .load_seed_dir(seed_dir)
            .map_err(|err| AppError::engine("engine.load_seed_dir", err))?;
        info!(seed_dir = %seed_dir.display(), seeded, "seed directory loaded");
    }
    warn!(
        download_root = %local.download_root().display(),
        "no peer-wire engine linked; transfers resolve from seeded content only"
    );
    let engine: Arc<dyn SwarmEngine> = Arc::new(local);

    let registry = ReadyFileRegistry::new();
    let orchestrator = Orchestrator::new(Arc::clone(&engine), registry.clone(), telemetry.clone());
    let api = ApiServer::new(ApiState::new(registry, engine, telemetry));

    let addr = config.socket_addr();
    let player = config
        .player
        .as_deref()
        .map(|command| PlayerLauncher::new(command, addr));
    let acquisitions = start_acquisitions(&orchestrator, &config.magnets, player).await;

    record_app_mode("serving");
    info!(addr = %addr, magnets = acquisitions.len(), "Launching stream listener");
    let served = serve_until(api, addr, shutdown).await;

    orchestrator.shutdown().await;
    for acquisition in acquisitions {
        if let Err(err) = acquisition.await {
            warn!(error = %err, "acquisition progress task failed");
        }
    }
    served?;
    info!("Jubako shutdown complete");
    Ok(())
}

/// Serve until `shutdown` resolves, then allow [`SERVER_SHUTDOWN_GRACE`] for
/// open connections before the server task is aborted.
async fn serve_until<F>(api: ApiServer, addr: SocketAddr, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send,
{
    let (trigger, stop) = oneshot::channel::<()>();
    let mut server = tokio::spawn(api.serve(addr, async move {
        if stop.await.is_err() {
            std::future::pending::<()>().await;
        }
    }));

    let joined = tokio::select! {
        joined = &mut server => joined,
        () = shutdown => {
            info!("shutdown requested; draining stream server");
            if trigger.send(()).is_err() {
                warn!("stream server exited before shutdown was signalled");
            }
            match tokio::time::timeout(SERVER_SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("stream server exceeded shutdown grace; aborting open connections");
                    server.abort();
                    return Ok(());
                }
            }
        }
    };

    joined
        .map_err(|source| AppError::Task {
            operation: "api_server.join",
            source,
        })?
        .map_err(|err| AppError::api_server("api_server.serve", err))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received"),
        () = terminate => info!("terminate signal received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn dependencies(root: &std::path::Path) -> anyhow::Result<BootstrapDependencies> {
        Ok(BootstrapDependencies {
            config: AppConfig {
                bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                http_port: 0,
                download_root: root.join("data"),
                log_level: "info".to_string(),
                log_format: None,
                seed_dir: None,
                magnets: Vec::new(),
                player: None,
            },
            warnings: Vec::new(),
            telemetry: Metrics::new()?,
        })
    }

    #[tokio::test]
    async fn run_app_with_stops_on_shutdown_signal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let deps = dependencies(dir.path())?;
        run_app_with(deps, async {}).await?;
        assert!(dir.path().join("data").join("downloads").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn configured_magnet_is_acquired_before_shutdown() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let hash = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
        let seed = dir.path().join("seed").join(hash);
        std::fs::create_dir_all(&seed)?;
        std::fs::write(seed.join("feature.mkv"), vec![9_u8; 4096])?;
        std::fs::write(seed.join("feature.srt"), b"subs")?;

        let mut deps = dependencies(dir.path())?;
        deps.config.seed_dir = Some(dir.path().join("seed"));
        deps.config.magnets = vec![format!("magnet:?xt=urn:btih:{hash}&dn=feature")];
        let metrics = deps.telemetry.clone();
        let completed = async move {
            while metrics.snapshot().downloads_completed_total == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(20), run_app_with(deps, completed)).await??;

        let downloaded = dir
            .path()
            .join("data")
            .join("downloads")
            .join(hash)
            .join("feature.mkv");
        assert_eq!(std::fs::read(downloaded)?, vec![9_u8; 4096]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_seed_dir_is_an_engine_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut deps = dependencies(dir.path())?;
        deps.config.seed_dir = Some(dir.path().join("absent"));
        let result = run_app_with(deps, async {}).await;
        assert!(matches!(
            result,
            Err(AppError::Engine {
                operation: "engine.load_seed_dir",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn bind_failure_surfaces_as_api_server_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let mut deps = dependencies(dir.path())?;
        deps.config.http_port = occupied.local_addr()?.port();
        let result = run_app_with(deps, std::future::pending()).await;
        assert!(matches!(
            result,
            Err(AppError::ApiServer {
                operation: "api_server.serve",
                ..
            })
        ));
        Ok(())
    }
}
