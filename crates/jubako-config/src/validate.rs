use std::net::IpAddr;

use crate::defaults::DEFAULT_HTTP_PORT;
use crate::error::{ConfigError, ConfigResult};
use crate::model::ConfigWarning;

pub(crate) fn port_or_default(raw: Option<&str>, warnings: &mut Vec<ConfigWarning>) -> u16 {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_HTTP_PORT;
    };
    let reason = match raw.parse::<u16>() {
        Ok(0) => "port must be non-zero",
        Ok(port) => return port,
        Err(_) => "not a port number",
    };
    warnings.push(ConfigWarning {
        field: "http_port",
        value: raw.to_string(),
        reason,
        fallback: DEFAULT_HTTP_PORT.to_string(),
    });
    DEFAULT_HTTP_PORT
}

pub(crate) fn bind_addr(raw: &str) -> ConfigResult<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidField {
            section: "http",
            field: "bind_addr",
            value: Some(raw.to_string()),
            reason: "not an ip address",
        })
}

pub(crate) fn log_format(raw: Option<&str>) -> ConfigResult<Option<String>> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("json") || value.eq_ignore_ascii_case("pretty") => {
            Ok(Some(value.to_ascii_lowercase()))
        }
        Some(value) => Err(ConfigError::InvalidField {
            section: "logging",
            field: "log_format",
            value: Some(value.to_string()),
            reason: "expected json or pretty",
        }),
    }
}

pub(crate) fn log_level(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}
