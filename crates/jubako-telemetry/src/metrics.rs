//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters and gauges the download and stream paths update.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Where a stream request was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// Served from a registered file on disk.
    Disk,
    /// Served by reading through an in-flight transfer.
    Network,
    /// Unknown to both the registry and the engine.
    Missing,
    /// Transfer active but without a playable file.
    Empty,
}

impl StreamSource {
    /// Label value recorded on `stream_requests_total`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Missing => "missing",
            Self::Empty => "empty",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    stream_requests_total: IntCounterVec,
    downloads_failed_total: IntCounterVec,
    downloads_completed_total: IntCounter,
    active_downloads: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current number of downloads past metadata resolution.
    pub active_downloads: i64,
    /// Total downloads that reached their final byte.
    pub downloads_completed_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let stream_requests_total = counter_vec(
            "stream_requests_total",
            "Stream requests by the source that answered them",
            &["source"],
        )?;
        let downloads_failed_total = counter_vec(
            "downloads_failed_total",
            "Acquisition tasks that ended in an error, by reason",
            &["reason"],
        )?;
        let downloads_completed_total = IntCounter::with_opts(Opts::new(
            "downloads_completed_total",
            "Acquisition tasks that registered a finished file",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "downloads_completed_total",
            source,
        })?;
        let active_downloads = IntGauge::with_opts(Opts::new(
            "active_downloads",
            "Downloads past metadata resolution and not yet terminal",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "active_downloads",
            source,
        })?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "stream_requests_total", &stream_requests_total)?;
        register(&registry, "downloads_failed_total", &downloads_failed_total)?;
        register(
            &registry,
            "downloads_completed_total",
            &downloads_completed_total,
        )?;
        register(&registry, "active_downloads", &active_downloads)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                stream_requests_total,
                downloads_failed_total,
                downloads_completed_total,
                active_downloads,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the stream request counter for the answering source.
    pub fn inc_stream_request(&self, source: StreamSource) {
        self.inner
            .stream_requests_total
            .with_label_values(&[source.as_str()])
            .inc();
    }

    /// Increment the failed download counter for the given reason.
    pub fn inc_download_failed(&self, reason: &str) {
        self.inner
            .downloads_failed_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Increment the completed download counter.
    pub fn inc_download_completed(&self) {
        self.inner.downloads_completed_total.inc();
    }

    /// Set the active download gauge, saturating at `i64::MAX`.
    pub fn set_active_downloads(&self, count: usize) {
        self.inner
            .active_downloads
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_downloads: self.inner.active_downloads.get(),
            downloads_completed_total: self.inner.downloads_completed_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/stream", 200);
        metrics.inc_stream_request(StreamSource::Disk);
        metrics.inc_stream_request(StreamSource::Missing);
        metrics.inc_download_failed("metadata_timeout");
        metrics.inc_download_completed();
        metrics.set_active_downloads(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_downloads, 3);
        assert_eq!(snapshot.downloads_completed_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total{code=\"200\",route=\"/stream\"} 1"));
        assert!(rendered.contains("stream_requests_total{source=\"disk\"} 1"));
        assert!(rendered.contains("downloads_failed_total{reason=\"metadata_timeout\"} 1"));
        assert!(rendered.contains("active_downloads 3"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_download_completed();
        assert_eq!(second.snapshot().downloads_completed_total, 0);
        assert_eq!(StreamSource::Empty.as_str(), "empty");
        Ok(())
    }
}
