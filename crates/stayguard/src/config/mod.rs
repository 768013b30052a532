use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::compliance::jurisdiction::DEFAULT_EXTENDED_STAY_DAYS;

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
    pub sweep: SweepConfig,
    pub rules: RulesConfig,
    pub admin: AdminConfig,
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
        let log_format = LogFormat::from_str(&env::var("APP_LOG_FORMAT").unwrap_or_default());

        let sweep = SweepConfig {
            enabled: env_bool("SWEEP_ENABLED", true)?,
            interval: Duration::from_secs(u64::from(env_u32("SWEEP_INTERVAL_SECS", 86_400)?)),
            warning_window_days: env_days("SWEEP_WARNING_WINDOW_DAYS", 5)?,
            dedupe_warnings: env_bool("SWEEP_DEDUPE_WARNINGS", true)?,
            notice_days: env_days("SWEEP_NOTICE_DAYS", 2)?,
            grace_days: env_days("SWEEP_GRACE_DAYS", 2)?,
        };
        if sweep.interval.is_zero() {
            return Err(ConfigError::InvalidNumber {
                key: "SWEEP_INTERVAL_SECS",
            });
        }

        let rules = RulesConfig {
            csv_path: env::var("RULES_CSV")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            extended_stay_days: env_u32("RESOLVER_EXTENDED_STAY_DAYS", DEFAULT_EXTENDED_STAY_DAYS)?,
        };

        let admin = AdminConfig {
            token: env::var("APP_ADMIN_TOKEN")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            sweep,
            rules,
            admin,
        })
    }
}

fn env_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

/// Sweep offsets past ten years are treated as misconfiguration.
const MAX_SWEEP_OFFSET_DAYS: u32 = 3_660;

fn env_days(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    let days = env_u32(key, default)?;
    if days > MAX_SWEEP_OFFSET_DAYS {
        return Err(ConfigError::InvalidNumber { key });
    }
    Ok(days)
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(default),
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Scheduling and window offsets for the compliance sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// When false the periodic job is never started; on-demand runs still work.
    pub enabled: bool,
    pub interval: Duration,
    pub warning_window_days: u32,
    pub dedupe_warnings: bool,
    pub notice_days: u32,
    pub grace_days: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(86_400),
            warning_window_days: 5,
            dedupe_warnings: true,
            notice_days: 2,
            grace_days: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RulesConfig {
    pub csv_path: Option<PathBuf>,
    pub extended_stay_days: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Bearer token for the on-demand sweep route; the route is closed when unset.
    pub token: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidFlag { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive whole number")
            }
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
