//! Application state and configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use applause_core::{ApplauseService, IdentityExtractor, SqliteStore, SqliteStoreConfig};
use url::Url;

use crate::rate_limit::RateLimiter;

/// Default port, matching the widget's default endpoint.
const DEFAULT_PORT: u16 = 8787;

/// Default requests allowed per client per minute.
const DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 90;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8787").
    pub bind_addr: String,

    /// Base URL of the blogging platform (e.g., "https://blog.example").
    pub ghost_url: Url,

    /// Path to the SQLite database.
    pub db_path: PathBuf,

    /// Requests allowed per client per minute (0 disables rate limiting).
    pub rate_limit_per_minute: u64,

    /// Port for the Prometheus `/metrics` endpoint (disabled if unset).
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `GHOST_URL`: Base URL of the blogging platform
    ///
    /// Optional environment variables:
    /// - `APPLAUSE_BIND_ADDR`: Server bind address (default: "0.0.0.0:$PORT")
    /// - `PORT`: Port used when `APPLAUSE_BIND_ADDR` is unset (default: 8787)
    /// - `APPLAUSE_DB_PATH`: SQLite database path (default: "/data/applause.db")
    /// - `APPLAUSE_RATE_LIMIT_PER_MINUTE`: Per-client request budget (default: 90)
    /// - `APPLAUSE_METRICS_PORT`: Serve Prometheus metrics on this port
    pub fn from_env() -> anyhow::Result<Self> {
        let ghost_url = std::env::var("GHOST_URL")
            .map_err(|_| anyhow::anyhow!("GHOST_URL environment variable is required"))?;
        let ghost_url = Url::parse(ghost_url.trim())
            .with_context(|| format!("GHOST_URL is not an absolute URL: {ghost_url}"))?;

        let bind_addr = match std::env::var("APPLAUSE_BIND_ADDR") {
            Ok(addr) => addr,
            Err(_) => {
                let port = parse_var("PORT")?.unwrap_or(DEFAULT_PORT);
                format!("0.0.0.0:{port}")
            }
        };

        let db_path = std::env::var("APPLAUSE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| SqliteStoreConfig::default().db_path);

        let rate_limit_per_minute =
            parse_var("APPLAUSE_RATE_LIMIT_PER_MINUTE")?.unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);

        let metrics_port = parse_var("APPLAUSE_METRICS_PORT")?;

        tracing::info!(
            bind_addr = %bind_addr,
            ghost_url = %ghost_url,
            db_path = %db_path.display(),
            rate_limit_per_minute,
            metrics_port = ?metrics_port,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            ghost_url,
            db_path,
            rate_limit_per_minute,
            metrics_port,
        })
    }

    /// The platform origin allowed to call the API from the browser.
    pub fn allowed_origin(&self) -> String {
        self.ghost_url.origin().ascii_serialization()
    }
}

fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {key} value: {raw}")),
        _ => Ok(None),
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Toggle orchestrator over the SQLite store.
    pub applause: Arc<ApplauseService<SqliteStore>>,

    /// Application configuration.
    pub config: Arc<Config>,

    /// Per-client request budget.
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Open the database and build the application state.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(SqliteStoreConfig {
            db_path: config.db_path.clone(),
        })
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

        Self::with_store(config, store)
    }

    /// Build the application state around an already-open store.
    pub fn with_store(config: Config, store: SqliteStore) -> anyhow::Result<Self> {
        let identity = IdentityExtractor::for_platform(config.ghost_url.as_str())
            .context("GHOST_URL cannot be joined with the member API path")?;

        tracing::info!(
            member_api = identity.member_api_url(),
            "accepting member tokens"
        );

        Ok(Self {
            applause: Arc::new(ApplauseService::new(store, identity)),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_per_minute)),
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "GHOST_URL",
        "APPLAUSE_BIND_ADDR",
        "PORT",
        "APPLAUSE_DB_PATH",
        "APPLAUSE_RATE_LIMIT_PER_MINUTE",
        "APPLAUSE_METRICS_PORT",
    ];

    /// Run `f` with only `vars` set among the config keys.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring the saved env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn config_requires_ghost_url() {
        with_env_vars(&[], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("GHOST_URL"));
        });
    }

    #[test]
    fn config_rejects_relative_ghost_url() {
        with_env_vars(&[("GHOST_URL", "blog.example")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn config_defaults() {
        with_env_vars(&[("GHOST_URL", "https://blog.example")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.bind_addr, "0.0.0.0:8787");
            assert_eq!(config.ghost_url.as_str(), "https://blog.example/");
            assert_eq!(config.db_path, PathBuf::from("/data/applause.db"));
            assert_eq!(config.rate_limit_per_minute, 90);
            assert_eq!(config.metrics_port, None);
        });
    }

    #[test]
    fn config_port_only() {
        with_env_vars(&[("GHOST_URL", "https://blog.example"), ("PORT", "9000")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.bind_addr, "0.0.0.0:9000");
        });
    }

    #[test]
    fn config_custom_values() {
        with_env_vars(
            &[
                ("GHOST_URL", "https://blog.example/"),
                ("APPLAUSE_BIND_ADDR", "127.0.0.1:3000"),
                ("PORT", "9000"),
                ("APPLAUSE_DB_PATH", "/tmp/claps.db"),
                ("APPLAUSE_RATE_LIMIT_PER_MINUTE", "0"),
                ("APPLAUSE_METRICS_PORT", "9091"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.bind_addr, "127.0.0.1:3000");
                assert_eq!(config.db_path, PathBuf::from("/tmp/claps.db"));
                assert_eq!(config.rate_limit_per_minute, 0);
                assert_eq!(config.metrics_port, Some(9091));
            },
        );
    }

    #[test]
    fn config_invalid_number() {
        with_env_vars(
            &[
                ("GHOST_URL", "https://blog.example"),
                ("APPLAUSE_RATE_LIMIT_PER_MINUTE", "lots"),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("APPLAUSE_RATE_LIMIT_PER_MINUTE"));
            },
        );
    }

    #[test]
    fn allowed_origin_drops_path() {
        with_env_vars(&[("GHOST_URL", "https://Blog.Example:8443/ghost/")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.allowed_origin(), "https://blog.example:8443");
        });
    }

    #[test]
    fn app_state_with_in_memory_store() {
        with_env_vars(&[("GHOST_URL", "https://blog.example")], || {
            let config = Config::from_env().unwrap();
            let state =
                AppState::with_store(config, SqliteStore::open_in_memory().unwrap()).unwrap();
            assert_eq!(
                state.applause.identity().member_api_url(),
                "https://blog.example/members/api"
            );
        });
    }
}
