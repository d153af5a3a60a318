//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL is
//! redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default room lifetime in seconds (10 minutes).
pub const DEFAULT_ROOM_TTL_SECONDS: u64 = 600;

/// Upper bound on the room lifetime (1 day).
pub const MAX_ROOM_TTL_SECONDS: u64 = 86_400;

/// Default broadcast buffer per room channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on the broadcast buffer per room channel.
pub const MAX_EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Default expiry sweep period in milliseconds.
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_MS: u64 = 1000;

/// Default landing surface for admission failures.
pub const DEFAULT_LANDING_URL: &str = "/";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default wait after cancelling background tasks on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 2;

/// Which ephemeral store backs the rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Room service configuration.
#[derive(Clone)]
pub struct Config {
    /// Store implementation (default: redis).
    pub store_backend: StoreBackend,

    /// Redis connection URL. Required for the redis backend.
    pub redis_url: Option<SecretString>,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Fixed lifetime of every room.
    pub room_ttl_seconds: u64,

    /// Broadcast buffer per room; slower subscribers are told to resync.
    pub event_channel_capacity: usize,

    /// Period of the expiry sweeper.
    pub expiry_sweep_interval_ms: u64,

    /// Adds `Secure` to the participant cookie.
    pub cookie_secure: bool,

    /// Where admission failures redirect to (reason appended as `?error=`).
    pub landing_url: String,

    pub request_timeout_seconds: u64,

    pub shutdown_grace_seconds: u64,
}

impl Config {
    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_seconds)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Custom Debug implementation that redacts the Redis URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store_backend", &self.store_backend)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_address", &self.bind_address)
            .field("room_ttl_seconds", &self.room_ttl_seconds)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("expiry_sweep_interval_ms", &self.expiry_sweep_interval_ms)
            .field("cookie_secure", &self.cookie_secure)
            .field("landing_url", &self.landing_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("shutdown_grace_seconds", &self.shutdown_grace_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid store backend: {0}")]
    InvalidStoreBackend(String),

    #[error("Invalid room TTL configuration: {0}")]
    InvalidRoomTtl(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

fn parse_bounded<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    min: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{value_str}': {e}"),
    })?;

    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }

    Ok(value)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be true or false, got '{v}'"),
        }),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let store_backend = match vars.get("STORE_BACKEND").map(String::as_str) {
            None | Some("redis") => StoreBackend::Redis,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidStoreBackend(format!(
                    "STORE_BACKEND must be 'redis' or 'memory', got '{other}'"
                )))
            }
        };

        let redis_url = vars.get("REDIS_URL").map(|url| SecretString::from(url.clone()));
        if store_backend == StoreBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingEnvVar("REDIS_URL".to_string()));
        }

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        // Room TTL gets its own error variant; it is the one knob that changes
        // user-visible semantics.
        let room_ttl_seconds = if let Some(value_str) = vars.get("ROOM_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRoomTtl(format!(
                    "ROOM_TTL_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRoomTtl(
                    "ROOM_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_ROOM_TTL_SECONDS {
                return Err(ConfigError::InvalidRoomTtl(format!(
                    "ROOM_TTL_SECONDS must not exceed {MAX_ROOM_TTL_SECONDS}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_ROOM_TTL_SECONDS
        };

        let event_channel_capacity = parse_bounded(
            vars,
            "EVENT_CHANNEL_CAPACITY",
            DEFAULT_EVENT_CHANNEL_CAPACITY,
            1,
            MAX_EVENT_CHANNEL_CAPACITY,
        )?;

        let expiry_sweep_interval_ms = parse_bounded(
            vars,
            "EXPIRY_SWEEP_INTERVAL_MS",
            DEFAULT_EXPIRY_SWEEP_INTERVAL_MS,
            1,
            60_000,
        )?;

        let request_timeout_seconds = parse_bounded(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
            1,
            300,
        )?;

        let shutdown_grace_seconds = parse_bounded(
            vars,
            "SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
            0,
            60,
        )?;

        let cookie_secure = parse_bool(vars, "COOKIE_SECURE", true)?;

        let landing_url = vars
            .get("LANDING_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LANDING_URL.to_string());
        if landing_url.contains('?') {
            return Err(ConfigError::InvalidValue {
                name: "LANDING_URL".to_string(),
                reason: "must not carry a query string".to_string(),
            });
        }

        Ok(Config {
            store_backend,
            redis_url,
            bind_address,
            room_ttl_seconds,
            event_channel_capacity,
            expiry_sweep_interval_ms,
            cookie_secure,
            landing_url,
            request_timeout_seconds,
            shutdown_grace_seconds,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://:hunter2@localhost:6379".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(
            config.redis_url.as_ref().unwrap().expose_secret(),
            "redis://:hunter2@localhost:6379"
        );
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.room_ttl_seconds, 600);
        assert_eq!(config.room_ttl(), Duration::from_secs(600));
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert_eq!(config.expiry_sweep_interval_ms, DEFAULT_EXPIRY_SWEEP_INTERVAL_MS);
        assert!(config.cookie_secure);
        assert_eq!(config.landing_url, "/");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_grace_seconds, DEFAULT_SHUTDOWN_GRACE_SECONDS);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("ROOM_TTL_SECONDS".to_string(), "120".to_string());
        vars.insert("EVENT_CHANNEL_CAPACITY".to_string(), "16".to_string());
        vars.insert("EXPIRY_SWEEP_INTERVAL_MS".to_string(), "250".to_string());
        vars.insert("COOKIE_SECURE".to_string(), "false".to_string());
        vars.insert("LANDING_URL".to_string(), "https://rooms.example.com/".to_string());
        vars.insert("REQUEST_TIMEOUT_SECONDS".to_string(), "10".to_string());
        vars.insert("SHUTDOWN_GRACE_SECONDS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.room_ttl_seconds, 120);
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.expiry_sweep_interval(), Duration::from_millis(250));
        assert!(!config.cookie_secure);
        assert_eq!(config.landing_url, "https://rooms.example.com/");
        assert_eq!(config.request_timeout_seconds, 10);
        assert_eq!(config.shutdown_grace_seconds, 0);
    }

    #[test]
    fn test_memory_backend_does_not_need_redis_url() {
        let vars = HashMap::from([("STORE_BACKEND".to_string(), "memory".to_string())]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_from_vars_missing_redis_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "REDIS_URL"));
    }

    #[test]
    fn test_unknown_store_backend_rejected() {
        let mut vars = base_vars();
        vars.insert("STORE_BACKEND".to_string(), "memcached".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidStoreBackend(msg)) if msg.contains("memcached"))
        );
    }

    #[test]
    fn test_room_ttl_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ROOM_TTL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRoomTtl(msg)) if msg.contains("greater than 0"))
        );
    }

    #[test]
    fn test_room_ttl_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("ROOM_TTL_SECONDS".to_string(), "86401".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRoomTtl(msg)) if msg.contains("must not exceed 86400"))
        );
    }

    #[test]
    fn test_room_ttl_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("ROOM_TTL_SECONDS".to_string(), "ten-minutes".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRoomTtl(msg)) if msg.contains("valid positive integer"))
        );
    }

    #[test]
    fn test_channel_capacity_bounds() {
        let mut vars = base_vars();
        vars.insert("EVENT_CHANNEL_CAPACITY".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { name, .. }) if name == "EVENT_CHANNEL_CAPACITY"
        ));

        vars.insert("EVENT_CHANNEL_CAPACITY".to_string(), "5000".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { reason, .. }) if reason.contains("between 1 and 4096")
        ));
    }

    #[test]
    fn test_cookie_secure_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("COOKIE_SECURE".to_string(), "sometimes".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { name, .. }) if name == "COOKIE_SECURE"
        ));
    }

    #[test]
    fn test_landing_url_rejects_query_string() {
        let mut vars = base_vars();
        vars.insert("LANDING_URL".to_string(), "/?from=room".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { name, .. }) if name == "LANDING_URL"
        ));
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("redis://"));
    }
}
