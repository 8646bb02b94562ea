// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const MIN_SPEEDTEST_INTERVAL_SECS: u64 = 10;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
        }
    }
}

/// Cache lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whole snapshot
    pub system_stats_ttl: Duration,
    /// Top processes, refreshed less often than the snapshot
    pub process_list_ttl: Duration,
    /// Tailscale status
    pub vpn_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            system_stats_ttl: Duration::from_secs(2),
            process_list_ttl: Duration::from_secs(8),
            vpn_ttl: Duration::from_secs(15),
        }
    }
}

/// Background bandwidth probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedtestConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub cli_path: PathBuf,
}

impl Default for SpeedtestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            cli_path: PathBuf::from("/usr/bin/speedtest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub speedtest: SpeedtestConfig,
    /// Directory holding `index.html`
    pub static_dir: PathBuf,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            speedtest: SpeedtestConfig::default(),
            static_dir: PathBuf::from("static"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("MONITOR_HOST").unwrap_or(defaults.server.host);
        let port = match env::var("MONITOR_PORT") {
            Ok(val) => parse_port(&val)?,
            Err(_) => defaults.server.port,
        };
        let static_dir = env::var("MONITOR_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);
        let log_level = env::var("MONITOR_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or(defaults.log_level);

        let cache = CacheConfig {
            system_stats_ttl: env_secs("SYSTEM_STATS_TTL_SEC", defaults.cache.system_stats_ttl)?,
            process_list_ttl: env_secs("PROCESS_LIST_TTL_SEC", defaults.cache.process_list_ttl)?,
            vpn_ttl: env_secs("TAILSCALE_CACHE_TTL_SEC", defaults.cache.vpn_ttl)?,
        };

        let speedtest = SpeedtestConfig {
            enabled: env::var("SPEEDTEST_ENABLED")
                .map(|val| val.trim().to_lowercase() != "false")
                .unwrap_or(defaults.speedtest.enabled),
            interval: env_secs("SPEEDTEST_INTERVAL_SEC", defaults.speedtest.interval)?,
            timeout: env_secs("SPEEDTEST_TIMEOUT_SEC", defaults.speedtest.timeout)?,
            cli_path: env::var("SPEEDTEST_CLI_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.speedtest.cli_path),
        };

        let config = Self {
            server: ServerConfig { host, port },
            cache,
            speedtest,
            static_dir,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "MONITOR_HOST cannot be empty".to_string(),
            ));
        }

        if self.speedtest.interval < Duration::from_secs(MIN_SPEEDTEST_INTERVAL_SECS) {
            return Err(ConfigError::IntervalTooShort {
                min: MIN_SPEEDTEST_INTERVAL_SECS,
                actual: self.speedtest.interval.as_secs_f64(),
            });
        }

        let positive = [
            ("SYSTEM_STATS_TTL_SEC", self.cache.system_stats_ttl),
            ("PROCESS_LIST_TTL_SEC", self.cache.process_list_ttl),
            ("TAILSCALE_CACHE_TTL_SEC", self.cache.vpn_ttl),
            ("SPEEDTEST_TIMEOUT_SEC", self.speedtest.timeout),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::InvalidConfig(format!(
                "{name} must be greater than 0"
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_port(val: &str) -> Result<u16, ConfigError> {
    let port = val.trim().parse::<i64>().map_err(|_| {
        ConfigError::InvalidConfig(format!("MONITOR_PORT must be an integer, got '{val}'"))
    })?;
    u16::try_from(port)
        .ok()
        .filter(|port| *port > 0)
        .ok_or(ConfigError::InvalidPort(port))
}

/// Reads a duration given in (possibly fractional) seconds.
fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let Ok(val) = env::var(name) else {
        return Ok(default);
    };
    val.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            ConfigError::InvalidConfig(format!(
                "{name} must be a non-negative number of seconds, got '{val}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;

    use super::*;

    const ALL_VARS: [&str; 11] = [
        "MONITOR_HOST",
        "MONITOR_PORT",
        "MONITOR_STATIC_DIR",
        "MONITOR_LOG_LEVEL",
        "SYSTEM_STATS_TTL_SEC",
        "PROCESS_LIST_TTL_SEC",
        "TAILSCALE_CACHE_TTL_SEC",
        "SPEEDTEST_ENABLED",
        "SPEEDTEST_INTERVAL_SEC",
        "SPEEDTEST_TIMEOUT_SEC",
        "SPEEDTEST_CLI_PATH",
    ];

    fn clear_env() {
        for name in ALL_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.cache.system_stats_ttl, Duration::from_secs(2));
        assert_eq!(config.cache.process_list_ttl, Duration::from_secs(8));
        assert_eq!(config.cache.vpn_ttl, Duration::from_secs(15));
        assert!(config.speedtest.enabled);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("MONITOR_HOST", "127.0.0.1");
        env::set_var("MONITOR_PORT", "8080");
        env::set_var("MONITOR_STATIC_DIR", "/srv/monitor/static");
        env::set_var("MONITOR_LOG_LEVEL", "DEBUG");
        env::set_var("SYSTEM_STATS_TTL_SEC", "0.5");
        env::set_var("TAILSCALE_CACHE_TTL_SEC", "30");
        env::set_var("SPEEDTEST_ENABLED", "False");
        env::set_var("SPEEDTEST_INTERVAL_SEC", "900");
        env::set_var("SPEEDTEST_CLI_PATH", "/opt/speedtest");

        let config = Config::from_env().unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.static_dir, PathBuf::from("/srv/monitor/static"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.cache.system_stats_ttl, Duration::from_millis(500));
        assert_eq!(config.cache.process_list_ttl, Duration::from_secs(8));
        assert_eq!(config.cache.vpn_ttl, Duration::from_secs(30));
        assert!(!config.speedtest.enabled);
        assert_eq!(config.speedtest.interval, Duration::from_secs(900));
        assert_eq!(config.speedtest.cli_path, PathBuf::from("/opt/speedtest"));
        clear_env();
    }

    #[duplicate_item(
        test_name                       port;
        [test_port_zero_is_rejected]    ["0"];
        [test_port_too_large_rejected]  ["70000"];
        [test_negative_port_rejected]   ["-1"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var("MONITOR_PORT", port);
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)), "{err}");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_non_numeric_port_is_rejected() {
        clear_env();
        env::set_var("MONITOR_PORT", "http");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)), "{err}");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_interval_below_minimum_is_rejected() {
        clear_env();
        env::set_var("SPEEDTEST_INTERVAL_SEC", "5");
        let err = Config::from_env().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Speedtest interval must be at least 10 seconds, got 5"
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_interval_at_minimum_is_accepted() {
        clear_env();
        env::set_var("SPEEDTEST_INTERVAL_SEC", "10");
        let config = Config::from_env().unwrap();
        assert_eq!(config.speedtest.interval, Duration::from_secs(10));
        clear_env();
    }

    #[duplicate_item(
        test_name                           var                         value;
        [test_unparseable_ttl_rejected]     ["SYSTEM_STATS_TTL_SEC"]    ["soon"];
        [test_negative_timeout_rejected]    ["SPEEDTEST_TIMEOUT_SEC"]   ["-3"];
        [test_zero_process_ttl_rejected]    ["PROCESS_LIST_TTL_SEC"]    ["0"];
        [test_unknown_log_level_rejected]   ["MONITOR_LOG_LEVEL"]       ["verbose"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var(var, value);
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)), "{err}");
        clear_env();
    }
}
