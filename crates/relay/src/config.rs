// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The web application origin doubles as the only allowed CORS
// origin and the base URL of the submission API.

use std::net::SocketAddr;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Web application origin (e.g. `https://app.example.com`).
    pub origin: String,
    /// Log filter directive (e.g. `info`, `pairsync_relay=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PAIRSYNC_RELAY_HOST` | `0.0.0.0` |
    /// | `PAIRSYNC_RELAY_PORT` | `3001` |
    /// | `PAIRSYNC_RELAY_ORIGIN` | `WEBSOCKET_SERVER_CORS`, then `http://localhost:3000` |
    /// | `PAIRSYNC_RELAY_LOG_FILTER` | `info` |
    /// | `PAIRSYNC_RELAY_LOG_FORMAT` | `text` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("PAIRSYNC_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("PAIRSYNC_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let origin = env("PAIRSYNC_RELAY_ORIGIN")
            .or_else(|_| env("WEBSOCKET_SERVER_CORS"))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ORIGIN.into());

        let log_filter = env("PAIRSYNC_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("PAIRSYNC_RELAY_LOG_FORMAT").as_deref() {
            Ok(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self { listen_addr, origin, log_filter, log_format }
    }
}
