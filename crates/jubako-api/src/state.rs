//! Shared state handed to every handler.

use std::sync::Arc;

use jubako_swarm_core::{ReadyFileRegistry, SwarmEngine};
use jubako_telemetry::Metrics;

/// Dependencies the HTTP surface reads from.
pub struct ApiState {
    pub(crate) registry: ReadyFileRegistry,
    pub(crate) engine: Arc<dyn SwarmEngine>,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    /// Bundle the registry, engine and metrics handles.
    #[must_use]
    pub fn new(registry: ReadyFileRegistry, engine: Arc<dyn SwarmEngine>, telemetry: Metrics) -> Self {
        Self {
            registry,
            engine,
            telemetry,
        }
    }
}
