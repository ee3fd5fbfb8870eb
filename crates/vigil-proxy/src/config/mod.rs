//! Configuration types for the compliance proxy.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: ListenConfig,
    /// Where forwarded traffic is redirected to.
    pub redirect: RedirectTarget,
    /// Optional path to a mock definition document (JSON or YAML).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_definitions: Option<String>,
    /// Optional violation report path; may carry a `{…}` time pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    pub port: u16,
}

/// Redirection target: the scheme, host, and port substituted onto every
/// forwarded request. Path and query always pass through untouched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectTarget {
    pub protocol: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl RedirectTarget {
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.authority())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_max_idle_per_host() -> usize {
    32
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config from {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("cannot parse config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.redirect.protocol.as_str() {
            "http" | "https" => {}
            other => anyhow::bail!(
                "unsupported redirect protocol '{other}'. Supported: http, https"
            ),
        }
        if self.redirect.host.trim().is_empty() {
            anyhow::bail!("redirect host must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "listen:\n  port: 9090\nredirect:\n  protocol: https\n  host: backend.test\n  port: 8443\n"
    }

    #[test]
    fn test_minimal_config_parses() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.listen.port, 9090);
        assert_eq!(config.redirect.base_url(), "https://backend.test:8443");
        assert!(config.mock_definitions.is_none());
        assert!(config.report_file.is_none());
        assert_eq!(config.connection_pool.max_idle_per_host, 32);
    }

    #[test]
    fn test_validate_rejects_unknown_protocol() {
        let mut config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.redirect.protocol = "ftp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.redirect.host = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_portless_authority() {
        let target = RedirectTarget {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: None,
        };
        assert_eq!(target.authority(), "localhost");
        assert_eq!(target.base_url(), "http://localhost");
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.redirect.host, "backend.test");
    }
}
