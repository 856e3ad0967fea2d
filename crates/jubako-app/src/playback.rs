//! Acquisitions requested at startup and the optional player launched on
//! their stream URL.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Stdio;

use jubako_swarm_core::{AcquisitionError, ContentId, ProgressSnapshot};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

/// Progress at which the configured player is started on the stream URL.
pub const PLAYER_LAUNCH_PERCENT: f64 = 5.0;

/// Player name that tries mpv, haruna and vlc in that order.
pub const AUTO_PLAYER: &str = "auto";

/// Players tried for [`AUTO_PLAYER`], with the flags passed before the URL.
const KNOWN_PLAYERS: [(&str, &[&str]); 3] = [
    ("mpv", &["--fs", "--force-window=immediate"]),
    ("haruna", &[]),
    ("vlc", &["--fullscreen"]),
];

/// Starts a media player on `/stream?hash=` URLs of the local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLauncher {
    command: String,
    server: SocketAddr,
}

impl PlayerLauncher {
    /// Launcher for `command` against a server bound to `server`.
    ///
    /// An unspecified bind address is reached through loopback.
    #[must_use]
    pub fn new(command: impl Into<String>, server: SocketAddr) -> Self {
        let server = if server.ip().is_unspecified() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), server.port())
        } else {
            server
        };
        Self {
            command: command.into(),
            server,
        }
    }

    /// Stream URL of `content_id` on the local server.
    #[must_use]
    pub fn stream_url(&self, content_id: &ContentId) -> String {
        format!("http://{}/stream?hash={}", self.server, content_id.to_hex())
    }

    /// Candidate `(program, leading args)` pairs in launch order.
    fn candidates(&self) -> Vec<(&str, &[&str])> {
        if self.command == AUTO_PLAYER {
            KNOWN_PLAYERS.to_vec()
        } else {
            vec![(self.command.as_str(), &[])]
        }
    }

    /// Spawn the first available player on the stream of `content_id` and
    /// log when it exits.
    pub fn launch(&self, content_id: &ContentId) {
        let url = self.stream_url(content_id);
        for (program, args) in self.candidates() {
            let spawned = Command::new(program)
                .args(args)
                .arg(&url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .spawn();
            match spawned {
                Ok(mut child) => {
                    info!(player = program, url = %url, "player launched");
                    let program = program.to_string();
                    tokio::spawn(async move {
                        match child.wait().await {
                            Ok(status) => info!(player = %program, %status, "player closed"),
                            Err(err) => warn!(player = %program, error = %err, "player wait failed"),
                        }
                    });
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(player = program, error = %err, "player failed to start");
                    return;
                }
            }
        }
        warn!(player = %self.command, url = %url, "no player available; open the stream URL manually");
    }
}

/// Per-magnet progress handler: logs every report and launches the player once.
struct ProgressLog {
    locator: String,
    player: Option<PlayerLauncher>,
    launched: bool,
}

impl ProgressLog {
    fn observe(&mut self, snapshot: Option<ProgressSnapshot>, error: Option<AcquisitionError>) {
        if let Some(error) = error {
            warn!(magnet = %self.locator, kind = error.kind(), error = %error, "acquisition ended");
            return;
        }
        let Some(snapshot) = snapshot else {
            return;
        };
        info!(
            content_id = %snapshot.content_id,
            file = %snapshot.path,
            percent = (snapshot.percent * 10.0).round() / 10.0,
            peers = snapshot.active_peers,
            "downloading"
        );
        if self.should_launch(&snapshot) {
            self.launched = true;
            if let Some(player) = &self.player {
                player.launch(&snapshot.content_id);
            }
        }
    }

    const fn should_launch(&self, snapshot: &ProgressSnapshot) -> bool {
        self.player.is_some() && !self.launched && snapshot.percent >= PLAYER_LAUNCH_PERCENT
    }
}

/// Admit every configured magnet, logging progress as it arrives.
///
/// The returned handles finish once each acquisition reaches a terminal state.
pub async fn start_acquisitions(
    orchestrator: &Orchestrator,
    magnets: &[String],
    player: Option<PlayerLauncher>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(magnets.len());
    for magnet in magnets {
        info!(magnet = %magnet, "starting acquisition");
        let mut log = ProgressLog {
            locator: magnet.clone(),
            player: player.clone(),
            launched: false,
        };
        let handle = orchestrator
            .add_magnet_with_callback(magnet, "", move |snapshot, error| {
                log.observe(snapshot, error);
            })
            .await;
        handles.push(handle);
    }
    handles
}
