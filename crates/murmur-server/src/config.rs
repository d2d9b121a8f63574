use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use murmur_gateway::connection::DEFAULT_SESSION_QUEUE;
use murmur_gateway::router::DEFAULT_SEND_TIMEOUT;
use murmur_types::api::MAX_HISTORY_LIMIT;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MURMUR_JWT_SECRET is unset or still a placeholder; it must match the account service's secret")]
    InsecureSecret,

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub send_timeout: Duration,
    pub session_queue: usize,
    pub history_limit: u32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MURMUR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::InsecureSecret);
        }

        let host = lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("MURMUR_PORT").unwrap_or_else(|| "3000".into());
        let addr_raw = format!("{}:{}", host, port);
        let addr = addr_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "MURMUR_HOST/MURMUR_PORT",
            value: addr_raw.clone(),
        })?;

        let db_path = lookup("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into();

        let send_timeout = match parsed::<u64, _>(&lookup, "MURMUR_SEND_TIMEOUT_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_SEND_TIMEOUT,
        };
        let session_queue = parsed(&lookup, "MURMUR_SESSION_QUEUE")?.unwrap_or(DEFAULT_SESSION_QUEUE);
        let history_limit = parsed(&lookup, "MURMUR_HISTORY_LIMIT")?
            .unwrap_or(MAX_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT);

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            send_timeout,
            session_queue,
            history_limit,
        })
    }
}

fn parsed<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
