use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Serialize;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Score boundaries between traffic levels. A score at or above a boundary
/// belongs to that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelThresholds {
    pub yellow: u8,
    pub orange: u8,
    pub red: u8,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            yellow: 40,
            orange: 70,
            red: 85,
        }
    }
}

impl LevelThresholds {
    pub fn new(yellow: u8, orange: u8, red: u8) -> Result<Self, ConfigError> {
        if !(yellow < orange && orange < red && red <= 100) {
            return Err(ConfigError::InvalidThresholds(format!(
                "{yellow},{orange},{red}"
            )));
        }
        Ok(Self {
            yellow,
            orange,
            red,
        })
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let parts: Vec<u8> = raw
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConfigError::InvalidThresholds(raw.to_string()))?;

        match parts.as_slice() {
            [yellow, orange, red] => Self::new(*yellow, *orange, *red),
            _ => Err(ConfigError::InvalidThresholds(raw.to_string())),
        }
    }
}

/// Tuning knobs for the scoring engine and the crowd router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub refresh_interval_ms: u64,
    pub staleness_ms: u64,
    /// Mirrors `level_thresholds.orange`; rerouting starts at ORANGE.
    pub reroute_threshold: u8,
    pub alternative_cutoff: u8,
    pub level_thresholds: LevelThresholds,
    pub max_alternatives: usize,
    pub forecast_hours: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 10_000,
            staleness_ms: 10_000,
            reroute_threshold: LevelThresholds::default().orange,
            alternative_cutoff: 50,
            level_thresholds: LevelThresholds::default(),
            max_alternatives: 3,
            forecast_hours: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let level_thresholds = match env::var("TRAFFIC_LEVEL_THRESHOLDS") {
            Ok(raw) => LevelThresholds::parse(&raw)?,
            Err(_) => defaults.level_thresholds,
        };

        let config = Self {
            refresh_interval_ms: env_number(
                "TRAFFIC_REFRESH_INTERVAL_MS",
                defaults.refresh_interval_ms,
            )?,
            staleness_ms: env_number("TRAFFIC_STALENESS_MS", defaults.staleness_ms)?,
            reroute_threshold: env_number("TRAFFIC_REROUTE_THRESHOLD", level_thresholds.orange)?,
            alternative_cutoff: env_number(
                "TRAFFIC_ALTERNATIVE_CUTOFF",
                defaults.alternative_cutoff,
            )?,
            level_thresholds,
            max_alternatives: env_number("TRAFFIC_MAX_ALTERNATIVES", defaults.max_alternatives)?,
            forecast_hours: env_number("TRAFFIC_FORECAST_HOURS", defaults.forecast_hours)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TRAFFIC_REFRESH_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if self.reroute_threshold != self.level_thresholds.orange {
            return Err(ConfigError::InvalidValue {
                name: "TRAFFIC_REROUTE_THRESHOLD",
                value: format!(
                    "{} (must equal the orange threshold {})",
                    self.reroute_threshold, self.level_thresholds.orange
                ),
            });
        }
        if self.staleness_ms > i64::MAX as u64 {
            return Err(ConfigError::InvalidValue {
                name: "TRAFFIC_STALENESS_MS",
                value: self.staleness_ms.to_string(),
            });
        }
        if self.max_alternatives == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TRAFFIC_MAX_ALTERNATIVES",
                value: "0".to_string(),
            });
        }
        if self.alternative_cutoff > 100 {
            return Err(ConfigError::InvalidValue {
                name: "TRAFFIC_ALTERNATIVE_CUTOFF",
                value: self.alternative_cutoff.to_string(),
            });
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidThresholds(String),
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidThresholds(raw) => write!(
                f,
                "TRAFFIC_LEVEL_THRESHOLDS must be three increasing scores up to 100, got '{raw}'"
            ),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidThresholds(_)
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "TRAFFIC_REFRESH_INTERVAL_MS",
            "TRAFFIC_STALENESS_MS",
            "TRAFFIC_REROUTE_THRESHOLD",
            "TRAFFIC_ALTERNATIVE_CUTOFF",
            "TRAFFIC_LEVEL_THRESHOLDS",
            "TRAFFIC_MAX_ALTERNATIVES",
            "TRAFFIC_FORECAST_HOURS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.engine.refresh_interval(), Duration::from_secs(10));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn engine_knobs_are_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TRAFFIC_REFRESH_INTERVAL_MS", "2500");
        env::set_var("TRAFFIC_LEVEL_THRESHOLDS", "30, 60, 90");
        env::set_var("TRAFFIC_ALTERNATIVE_CUTOFF", "45");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.refresh_interval_ms, 2500);
        assert_eq!(config.engine.level_thresholds, LevelThresholds::new(30, 60, 90).unwrap());
        assert_eq!(config.engine.alternative_cutoff, 45);
        assert_eq!(config.engine.reroute_threshold, 60, "follows the orange threshold");
        reset_env();
    }

    #[test]
    fn rejects_reroute_threshold_off_the_orange_level() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TRAFFIC_LEVEL_THRESHOLDS", "30,60,90");
        env::set_var("TRAFFIC_REROUTE_THRESHOLD", "70");
        let err = AppConfig::load().expect_err("reroute cut must match orange");
        assert!(err.to_string().contains("TRAFFIC_REROUTE_THRESHOLD"));

        env::set_var("TRAFFIC_REROUTE_THRESHOLD", "60");
        assert!(AppConfig::load().is_ok());
        reset_env();
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TRAFFIC_LEVEL_THRESHOLDS", "70,40,85");
        let err = AppConfig::load().expect_err("thresholds must increase");
        assert!(matches!(err, ConfigError::InvalidThresholds(_)));
        reset_env();
    }

    #[test]
    fn rejects_zero_alternatives() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TRAFFIC_MAX_ALTERNATIVES", "0");
        let err = AppConfig::load().expect_err("at least one alternative");
        assert!(err.to_string().contains("TRAFFIC_MAX_ALTERNATIVES"));
        reset_env();
    }

    #[test]
    fn rejects_staleness_beyond_signed_range() {
        let config = EngineConfig {
            staleness_ms: u64::MAX,
            ..EngineConfig::default()
        };
        let err = config.validate().expect_err("staleness must fit");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "TRAFFIC_STALENESS_MS",
                ..
            }
        ));

        let config = EngineConfig {
            staleness_ms: i64::MAX as u64,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unparseable_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TRAFFIC_REFRESH_INTERVAL_MS", "soon");
        let err = AppConfig::load().expect_err("interval must be numeric");
        assert!(err.to_string().contains("TRAFFIC_REFRESH_INTERVAL_MS"));
        reset_env();
    }
}
