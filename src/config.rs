//! Configuration types, loaded from the environment.

use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;

/// Full application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

/// HTTP server and middleware settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Scheme used when printing public URLs (`http` or `https`).
    pub public_scheme: String,
    /// Log every request/response through the trace layer.
    pub enable_logger: bool,
    /// Per-client fixed-window rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// CORS origins. Empty means any origin (without credentials).
    pub allowed_origins: Vec<String>,
    /// Whether CORS responses allow credentials (explicit origins only).
    pub allow_credentials: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            public_scheme: "http".to_string(),
            enable_logger: true,
            rate_limit: None,
            allowed_origins: Vec::new(),
            allow_credentials: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public base URL, e.g. `http://localhost:8080`.
    pub fn public_url(&self) -> String {
        format!("{}://{}", self.public_scheme, self.addr())
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window.
    pub max_requests: u32,
    /// Window length; also the eviction interval for stale clients.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Embedded database settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub url: String,
    /// Number of pooled connections (in-memory databases always use one).
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "data/app.db".to_string(),
            pool_size: 4,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!(error = %e, ".env not loaded");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let defaults = ServerConfig::default();

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => defaults.port,
        };

        let public_scheme = get("PUBLIC_SCHEME").unwrap_or_else(|| {
            let scheme = if port == 443 { "https" } else { "http" };
            scheme.to_string()
        });

        let rate_limit = parse_bool(get("ENABLE_RATE_LIMIT"), false).then(|| {
            let fallback = RateLimitConfig::default();
            RateLimitConfig {
                max_requests: get("RATE_LIMIT_MAX_REQUESTS")
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(fallback.max_requests),
                window: get("RATE_LIMIT_WINDOW_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(fallback.window),
            }
        });

        let server = ServerConfig {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            public_scheme,
            enable_logger: parse_bool(get("ENABLE_LOGGER"), defaults.enable_logger),
            rate_limit,
            allowed_origins: split_and_trim(get("ALLOWED_ORIGINS").as_deref().unwrap_or("")),
            allow_credentials: parse_bool(get("ALLOW_CREDENTIALS"), defaults.allow_credentials),
        };

        let db_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: get("DATABASE_URL")
                .map(|s| s.trim().to_string())
                .unwrap_or(db_defaults.url),
            pool_size: get("DATABASE_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .map(|n: usize| n.max(1))
                .unwrap_or(db_defaults.pool_size),
        };

        Ok(Self { server, database })
    }
}

/// Parse a boolean flag; unrecognised values fall back to `default`.
fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Split a comma-separated list, trimming entries and dropping empties.
fn split_and_trim(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.server.addr(), "localhost:8080");
        assert_eq!(cfg.server.public_url(), "http://localhost:8080");
        assert!(cfg.server.enable_logger);
        assert!(cfg.server.rate_limit.is_none());
        assert!(cfg.server.allowed_origins.is_empty());
        assert!(cfg.server.allow_credentials);
        assert_eq!(cfg.database.url, "data/app.db");
        assert_eq!(cfg.database.pool_size, 4);
    }

    #[test]
    fn port_443_implies_https_unless_scheme_set() {
        let cfg = config_from(&[("PORT", "443")]).unwrap();
        assert_eq!(cfg.server.public_scheme, "https");

        let cfg = config_from(&[("PORT", "443"), ("PUBLIC_SCHEME", "http")]).unwrap();
        assert_eq!(cfg.server.public_scheme, "http");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert!(parse_bool(Some("YES".into()), false));
        assert!(parse_bool(Some("On".into()), false));
        assert!(!parse_bool(Some("0".into()), true));
        assert!(!parse_bool(Some("FALSE".into()), true));
        assert!(parse_bool(Some("maybe".into()), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let cfg = config_from(&[(
            "ALLOWED_ORIGINS",
            " http://a.example , ,http://b.example",
        )])
        .unwrap();
        assert_eq!(
            cfg.server.allowed_origins,
            vec!["http://a.example", "http://b.example"]
        );
    }

    #[test]
    fn rate_limit_settings() {
        let cfg = config_from(&[
            ("ENABLE_RATE_LIMIT", "true"),
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
            ("RATE_LIMIT_WINDOW_SECS", "10"),
        ])
        .unwrap();
        assert_eq!(
            cfg.server.rate_limit,
            Some(RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(10),
            })
        );

        let cfg = config_from(&[("ENABLE_RATE_LIMIT", "1"), ("RATE_LIMIT_MAX_REQUESTS", "0")])
            .unwrap();
        assert_eq!(cfg.server.rate_limit, Some(RateLimitConfig::default()));
    }

    #[test]
    fn pool_size_has_a_floor_of_one() {
        let cfg = config_from(&[("DATABASE_POOL_SIZE", "0"), ("DATABASE_URL", ":memory:")])
            .unwrap();
        assert_eq!(cfg.database.pool_size, 1);
        assert_eq!(cfg.database.url, ":memory:");
    }
}
