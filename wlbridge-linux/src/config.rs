//! Load config from file, environment and command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;

/// Daemon configuration. File: ~/.config/wlbridge/config.toml or /etc/wlbridge/config.toml.
/// Env overrides: WLBRIDGE_INTERFACE, WLBRIDGE_SERVER, WLBRIDGE_QUEUE_CAPACITY.
/// Command-line flags override both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Wireless interface to capture on.
    #[serde(default)]
    pub interface: Option<String>,
    /// Server address (host:port).
    #[serde(default)]
    pub server: Option<String>,
    /// Put the interface in monitor mode via libpcap (default true).
    #[serde(default = "default_true")]
    pub monitor: bool,
    /// Put the interface in promiscuous mode (default true).
    #[serde(default = "default_true")]
    pub promiscuous: bool,
    /// Hop channels until the first peer is found (default true).
    #[serde(default = "default_true")]
    pub channel_hopping: bool,
    /// Enter monitor mode with ip/iw before opening the capture.
    #[serde(default)]
    pub alt_monitor: bool,
    /// Optional pcap file receiving every captured frame.
    #[serde(default)]
    pub dump_packets: Option<PathBuf>,
    /// Frames buffered between classification and the server connection (default 1024).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Pause between channel changes while hopping (default 100 ms).
    #[serde(default = "default_hop_interval_ms")]
    pub hop_interval_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_hop_interval_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            server: None,
            monitor: true,
            promiscuous: true,
            channel_hopping: true,
            alt_monitor: false,
            dump_packets: None,
            queue_capacity: default_queue_capacity(),
            hop_interval_ms: default_hop_interval_ms(),
        }
    }
}

/// Configuration with required fields checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub interface: String,
    pub server: String,
    pub monitor: bool,
    pub promiscuous: bool,
    pub channel_hopping: bool,
    pub alt_monitor: bool,
    pub dump_packets: Option<PathBuf>,
    pub queue_capacity: usize,
    pub hop_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no wireless interface given (use --interface or set `interface` in the config file)")]
    MissingInterface,
    #[error("no server address given")]
    MissingServer,
    #[error("queue_capacity must be at least 1")]
    ZeroQueue,
}

impl Config {
    /// Apply environment overrides.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(s) = var("WLBRIDGE_INTERFACE") {
            self.interface = Some(s);
        }
        if let Some(s) = var("WLBRIDGE_SERVER") {
            self.server = Some(s);
        }
        if let Some(s) = var("WLBRIDGE_QUEUE_CAPACITY") {
            match s.parse::<usize>() {
                Ok(n) => self.queue_capacity = n,
                Err(_) => tracing::warn!(value = %s, "ignoring invalid WLBRIDGE_QUEUE_CAPACITY"),
            }
        }
    }

    /// Apply command-line overrides. Negative flags only ever switch a feature off.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(s) = &cli.interface {
            self.interface = Some(s.clone());
        }
        if let Some(s) = &cli.server {
            self.server = Some(s.clone());
        }
        if cli.no_monitor {
            self.monitor = false;
        }
        if cli.no_promiscuous {
            self.promiscuous = false;
        }
        if cli.no_channel_hopping {
            self.channel_hopping = false;
        }
        if cli.alt_monitor {
            self.alt_monitor = true;
        }
        if let Some(p) = &cli.dump_packets {
            self.dump_packets = Some(p.clone());
        }
    }

    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let interface = self
            .interface
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingInterface)?;
        let server = self
            .server
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingServer)?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        Ok(Settings {
            interface,
            server,
            monitor: self.monitor,
            promiscuous: self.promiscuous,
            channel_hopping: self.channel_hopping,
            alt_monitor: self.alt_monitor,
            dump_packets: self.dump_packets,
            queue_capacity: self.queue_capacity,
            hop_interval: Duration::from_millis(self.hop_interval_ms),
        })
    }
}

/// Load config: merge default, then config file (if present), then env vars, then flags.
pub fn load(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|k| std::env::var(k).ok());
    c.apply_cli(cli);
    c.into_settings()
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/wlbridge/config.toml"));
    }
    out.push(PathBuf::from("/etc/wlbridge/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    parse_file(&path)
}

fn parse_file(path: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config file");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            Some(c)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn file_fields_and_defaults() {
        let c: Config = toml::from_str(
            r#"
            interface = "wlan1"
            server = "192.168.1.10:7777"
            channel_hopping = false
            queue_capacity = 16
            "#,
        )
        .unwrap();
        assert_eq!(c.interface.as_deref(), Some("wlan1"));
        assert!(!c.channel_hopping);
        assert!(c.monitor);
        assert!(c.promiscuous);
        assert_eq!(c.queue_capacity, 16);
        assert_eq!(c.hop_interval_ms, 100);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(toml::from_str::<Config>("channel = 6").is_err());
    }

    #[test]
    fn env_then_cli_precedence() {
        let mut c = Config::default();
        c.apply_env(|k| match k {
            "WLBRIDGE_INTERFACE" => Some("wlan9".into()),
            "WLBRIDGE_SERVER" => Some("env:1".into()),
            "WLBRIDGE_QUEUE_CAPACITY" => Some("nope".into()),
            _ => None,
        });
        assert_eq!(c.queue_capacity, 1024);
        let cli = Cli::parse_from(["wlbridge", "-H", "cli:2"]);
        c.apply_cli(&cli);
        let s = c.into_settings().unwrap();
        assert_eq!(s.interface, "wlan9");
        assert_eq!(s.server, "cli:2");
        assert!(!s.channel_hopping);
        assert_eq!(s.hop_interval, Duration::from_millis(100));
    }

    #[test]
    fn missing_required_fields() {
        assert!(matches!(
            Config::default().into_settings(),
            Err(ConfigError::MissingInterface)
        ));
        let c = Config {
            interface: Some("wlan0".into()),
            ..Config::default()
        };
        assert!(matches!(c.into_settings(), Err(ConfigError::MissingServer)));
    }
}
