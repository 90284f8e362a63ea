//! Server configuration loaded from environment variables.
//!
//! - `CARBON_LEDGER_PORT` - HTTP port (default: `3000`)
//! - `CARBON_LEDGER_BIND` - bind address (default: `127.0.0.1`)
//! - `CARBON_LEDGER_DATABASE` - SQLite file (default: platform data directory)
//! - `CARBON_LEDGER_CORS_ORIGINS` - allowed origins, comma-separated (default: any)

use std::path::PathBuf;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    /// `None` uses the platform data directory.
    pub database: Option<PathBuf>,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            database: None,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = match lookup("CARBON_LEDGER_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid CARBON_LEDGER_PORT {:?}, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => defaults.port,
        };

        let bind = lookup("CARBON_LEDGER_BIND")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.bind);

        let database = lookup("CARBON_LEDGER_DATABASE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let cors_origins = lookup("CARBON_LEDGER_CORS_ORIGINS").map(|s| {
            s.split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect()
        });

        Self {
            port,
            bind,
            database,
            cors_origins,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// CORS layer for the configured origins, permissive when none are set.
    pub fn cors_layer(&self) -> CorsLayer {
        let Some(origins) = &self.cors_origins else {
            return CorsLayer::permissive();
        };

        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn reads_all_variables() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CARBON_LEDGER_PORT", "8080"),
            ("CARBON_LEDGER_BIND", "0.0.0.0"),
            ("CARBON_LEDGER_DATABASE", "/tmp/ledger.db"),
            ("CARBON_LEDGER_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]));

        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.database, Some(PathBuf::from("/tmp/ledger.db")));
        assert_eq!(
            config.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let config = ServerConfig::from_lookup(lookup(&[("CARBON_LEDGER_PORT", "http")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
