//! Errors raised while installing logging or maintaining the metrics registry.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector definition was rejected.
    #[error("failed to build metrics collector")]
    MetricsCollector {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The registry refused a collector, usually a duplicate name.
    #[error("failed to register metrics collector")]
    MetricsRegister {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Text exposition encoding failed.
    #[error("failed to encode metrics")]
    MetricsEncode {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Encoded exposition was not UTF-8.
    #[error("metrics output was not valid utf-8")]
    MetricsUtf8 {
        /// Underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    /// Metric the failure is attributed to, when there is one.
    #[must_use]
    pub const fn metric(&self) -> Option<&'static str> {
        match self {
            Self::MetricsCollector { name, .. } | Self::MetricsRegister { name, .. } => {
                Some(*name)
            }
            Self::SubscriberInstall { .. } | Self::MetricsEncode { .. } | Self::MetricsUtf8 { .. } => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntCounter, Registry};
    use std::error::Error as _;

    #[test]
    fn duplicate_registration_names_the_metric() {
        let registry = Registry::new();
        let first = IntCounter::new("streams", "first");
        let second = IntCounter::new("streams", "second");
        let (Ok(first), Ok(second)) = (first, second) else {
            unreachable!("static counter options are valid");
        };
        assert!(registry.register(Box::new(first)).is_ok());
        let Err(source) = registry.register(Box::new(second)) else {
            unreachable!("a second collector with the same name is refused");
        };

        let err = TelemetryError::MetricsRegister {
            name: "streams",
            source,
        };
        assert_eq!(err.to_string(), "failed to register metrics collector");
        assert_eq!(err.metric(), Some("streams"));
        assert!(err.source().is_some());
    }

    #[test]
    fn encode_failures_carry_no_metric() {
        let Err(utf8) = String::from_utf8(vec![0, 159]) else {
            unreachable!("0x9f never starts a utf-8 sequence");
        };
        let err = TelemetryError::MetricsUtf8 { source: utf8 };
        assert_eq!(err.to_string(), "metrics output was not valid utf-8");
        assert_eq!(err.metric(), None);
        assert!(err.source().is_some());

        let encode = TelemetryError::MetricsEncode {
            source: PrometheusError::Msg("encode".to_string()),
        };
        assert_eq!(encode.metric(), None);
    }
}
