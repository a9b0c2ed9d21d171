//! Configuration handling for the relay service.
//!
//! Values come from three layers, later ones winning: built-in defaults, the
//! `relay` section of a YAML config file, and `RELAY_*` environment
//! variables. Command-line flags are applied on top by `main`.

use anyhow::Result;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Relay service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address both listeners bind to
    pub bind_addr: IpAddr,
    /// Port producers connect to
    pub source_port: u16,
    /// Port consumers connect to
    pub dest_port: u16,
    /// Bound on a single consumer write before the consumer is dropped
    pub write_timeout: Duration,
    /// Interval between statistics log lines
    pub stats_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            source_port: 33333,
            dest_port: 44444,
            write_timeout: Duration::from_secs(5),
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    relay: Option<FileConfig>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    bind_addr: Option<IpAddr>,
    source_port: Option<u16>,
    dest_port: Option<u16>,
    write_timeout: Option<String>,
    stats_interval: Option<String>,
}

impl RelayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}, using defaults: {}",
                        config_path.as_ref(),
                        e
                    );
                }
            }
        } else {
            warn!("Config file {:?} not found, using defaults", config_path.as_ref());
        }

        config.apply_environment_overrides();

        info!(
            "Final relay configuration: source={}, dest={}, write_timeout={:?}, stats_interval={:?}",
            config.source_addr(),
            config.dest_addr(),
            config.write_timeout,
            config.stats_interval
        );

        Ok(config)
    }

    /// Producer listener address
    pub fn source_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.source_port)
    }

    /// Consumer listener address
    pub fn dest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.dest_port)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        let Some(relay) = root_config.relay else {
            return;
        };

        if let Some(bind_addr) = relay.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(port) = relay.source_port {
            self.source_port = port;
        }
        if let Some(port) = relay.dest_port {
            self.dest_port = port;
        }
        if let Some(value) = relay.write_timeout {
            apply_duration("write_timeout", &value, &mut self.write_timeout);
        }
        if let Some(value) = relay.stats_interval {
            apply_duration("stats_interval", &value, &mut self.stats_interval);
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("RELAY_BIND_ADDR") {
            match value.parse::<IpAddr>() {
                Ok(addr) => {
                    self.bind_addr = addr;
                    info!("Bind address overridden by environment: {}", addr);
                }
                Err(_) => warn!("Ignoring invalid RELAY_BIND_ADDR: {}", value),
            }
        }

        if let Some(value) = lookup("RELAY_SOURCE_PORT") {
            match value.parse::<u16>() {
                Ok(port) => {
                    self.source_port = port;
                    info!("Source port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid RELAY_SOURCE_PORT: {}", value),
            }
        }

        if let Some(value) = lookup("RELAY_DEST_PORT") {
            match value.parse::<u16>() {
                Ok(port) => {
                    self.dest_port = port;
                    info!("Destination port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid RELAY_DEST_PORT: {}", value),
            }
        }

        if let Some(value) = lookup("RELAY_WRITE_TIMEOUT") {
            apply_duration("RELAY_WRITE_TIMEOUT", &value, &mut self.write_timeout);
        }
    }
}

fn apply_duration(name: &str, value: &str, target: &mut Duration) {
    match humantime::parse_duration(value) {
        Ok(duration) => apply_nonzero_duration(name, duration, target),
        Err(_) => warn!("Ignoring invalid {} value: {}", name, value),
    }
}

/// Store `duration` in `target` unless it is zero
pub(crate) fn apply_nonzero_duration(name: &str, duration: Duration, target: &mut Duration) {
    if duration.is_zero() {
        warn!("Ignoring zero {} value", name);
    } else {
        *target = duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.source_addr(), "0.0.0.0:33333".parse().unwrap());
        assert_eq!(config.dest_addr(), "0.0.0.0:44444".parse().unwrap());
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
relay:
  bind_addr: 127.0.0.1
  source_port: 43333
  dest_port: 54444
  write_timeout: 250ms
  stats_interval: 2m
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = RelayConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.source_addr(), "127.0.0.1:43333".parse().unwrap());
        assert_eq!(config.dest_addr(), "127.0.0.1:54444".parse().unwrap());
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert_eq!(config.stats_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RelayConfig::load_from_file("/nonexistent/relay-config.yaml").unwrap();
        assert_eq!(config.source_port, 33333);
        assert_eq!(config.dest_port, 44444);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let mut config = RelayConfig::default();
        config.apply_root_config(
            serde_yaml::from_str("relay:\n  write_timeout: soon\n  stats_interval: 0s\n").unwrap(),
        );
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("RELAY_BIND_ADDR", "::1"),
            ("RELAY_SOURCE_PORT", "1234"),
            ("RELAY_DEST_PORT", "not-a-port"),
            ("RELAY_WRITE_TIMEOUT", "1s"),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.source_addr(), "[::1]:1234".parse().unwrap());
        assert_eq!(config.dest_port, 44444);
        assert_eq!(config.write_timeout, Duration::from_secs(1));
    }
}
