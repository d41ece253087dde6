use crate::domain::services::TranslatorOptions;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Endpoints
    pub from: String,
    pub to: String,

    // Session retry and dialing
    pub retry_backoff_secs: u64,
    pub connect_timeout_secs: u64,
    pub reconnect_delay_ms: u64,

    // Snapshot hand-off
    pub pipe_capacity: usize,

    // Translation
    pub select_db: bool,
    pub preserve_ttl: bool,

    pub debug: bool,
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} address must not be empty")]
    EmptyAddress(&'static str),

    #[error("pipe capacity must be greater than zero")]
    ZeroPipeCapacity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            from: "127.0.0.1:6379".to_string(),
            to: "127.0.0.1:6380".to_string(),
            retry_backoff_secs: 5,
            connect_timeout_secs: 5,
            reconnect_delay_ms: 100,
            pipe_capacity: 64 * 1024,
            select_db: true,
            preserve_ttl: true,
            debug: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.from.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("source"));
        }
        if self.to.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("target"));
        }
        if self.pipe_capacity == 0 {
            return Err(ConfigError::ZeroPipeCapacity);
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn translator_options(&self) -> TranslatorOptions {
        TranslatorOptions {
            select_db: self.select_db,
            preserve_ttl: self.preserve_ttl,
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    Ok(config_from(|key| std::env::var(key).ok()))
}

/// Build a config from a variable lookup; missing or unparseable values keep their defaults.
fn config_from<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let parse_or = |key: &str, default: u64| {
        lookup(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };

    let flag_or = |key: &str, default: bool| {
        lookup(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    };

    let from = lookup("PORTER_FROM").unwrap_or(defaults.from);
    let to = lookup("PORTER_TO").unwrap_or(defaults.to);

    let retry_backoff_secs = parse_or("PORTER_RETRY_BACKOFF_SECS", defaults.retry_backoff_secs);
    let connect_timeout_secs =
        parse_or("PORTER_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs);
    let reconnect_delay_ms = parse_or("PORTER_RECONNECT_DELAY_MS", defaults.reconnect_delay_ms);

    let pipe_capacity = lookup("PORTER_PIPE_CAPACITY")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(defaults.pipe_capacity);

    let select_db = flag_or("PORTER_SELECT_DB", defaults.select_db);
    let preserve_ttl = flag_or("PORTER_PRESERVE_TTL", defaults.preserve_ttl);

    let debug = lookup("DEBUG").is_some();

    Config {
        from,
        to,
        retry_backoff_secs,
        connect_timeout_secs,
        reconnect_delay_ms,
        pipe_capacity,
        select_db,
        preserve_ttl,
        debug,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.from, "127.0.0.1:6379");
        assert_eq!(cfg.to, "127.0.0.1:6380");
        assert_eq!(cfg.retry_backoff_secs, 5);
        assert_eq!(cfg.reconnect_delay_ms, 100);
        assert_eq!(cfg.pipe_capacity, 65536);
        assert!(cfg.select_db);
        assert!(cfg.preserve_ttl);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let cfg = config_with(&[]);
        assert_eq!(cfg.from, "127.0.0.1:6379");
        assert_eq!(cfg.to, "127.0.0.1:6380");
        assert_eq!(cfg.connect_timeout_secs, 5);
    }

    #[test]
    fn test_custom_endpoints() {
        let cfg = config_with(&[("PORTER_FROM", "10.0.0.1:7000"), ("PORTER_TO", "10.0.0.2:7001")]);
        assert_eq!(cfg.from, "10.0.0.1:7000");
        assert_eq!(cfg.to, "10.0.0.2:7001");
    }

    #[test]
    fn test_numeric_settings() {
        let cfg = config_with(&[
            ("PORTER_RETRY_BACKOFF_SECS", "30"),
            ("PORTER_CONNECT_TIMEOUT_SECS", "2"),
            ("PORTER_RECONNECT_DELAY_MS", "0"),
            ("PORTER_PIPE_CAPACITY", "1024"),
        ]);
        assert_eq!(cfg.retry_backoff(), Duration::from_secs(30));
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.reconnect_delay(), Duration::ZERO);
        assert_eq!(cfg.pipe_capacity, 1024);
    }

    #[test]
    fn test_parse_error_uses_default() {
        let cfg = config_with(&[
            ("PORTER_RETRY_BACKOFF_SECS", "soon"),
            ("PORTER_PIPE_CAPACITY", "-1"),
        ]);
        assert_eq!(cfg.retry_backoff_secs, 5);
        assert_eq!(cfg.pipe_capacity, 65536);
    }

    #[test]
    fn test_flags() {
        let cfg = config_with(&[("PORTER_SELECT_DB", "false"), ("PORTER_PRESERVE_TTL", "0")]);
        assert!(!cfg.select_db);
        assert!(!cfg.preserve_ttl);

        let cfg = config_with(&[("PORTER_SELECT_DB", "TRUE"), ("PORTER_PRESERVE_TTL", "1")]);
        assert!(cfg.select_db);
        assert!(cfg.preserve_ttl);
    }

    #[test]
    fn test_debug_flag_presence() {
        assert!(config_with(&[("DEBUG", "")]).debug);
        assert!(!config_with(&[]).debug);
    }

    #[test]
    fn test_translator_options() {
        let cfg = config_with(&[("PORTER_PRESERVE_TTL", "false")]);
        let options = cfg.translator_options();
        assert!(options.select_db);
        assert!(!options.preserve_ttl);
    }

    #[test]
    fn test_validate() {
        assert_eq!(Config::default().validate(), Ok(()));

        let cfg = Config {
            from: " ".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyAddress("source")));

        let cfg = Config {
            to: String::new(),
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyAddress("target")));

        let cfg = Config {
            pipe_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPipeCapacity));
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::EmptyAddress("target").to_string(),
            "target address must not be empty"
        );
    }

    #[test]
    fn test_load_config_reads_environment() {
        let cfg = load_config().unwrap();
        assert!(!cfg.from.is_empty());
    }
}
