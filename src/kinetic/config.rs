// SPDX-License-Identifier: MIT

//! Process configuration read from the environment

use std::collections::HashMap;
use std::time::Duration;

use crate::adk::error::DeployError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Settings the server needs before it can bind
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Postgres URL shared by the store and the checkpointer
    pub database_url: String,
    /// Expected `X-API-Key` value; `None` rejects every protected request
    pub api_key: Option<String>,
    /// Upper bound for draining requests and closing connections
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Read from the process environment (call `dotenv` first)
    pub fn from_env() -> Result<Self, DeployError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, DeployError> {
        let database_url = non_empty(vars, "DATABASE_URL")
            .ok_or_else(|| DeployError::config("DATABASE_URL must be set"))?;

        let api_key = non_empty(vars, "X_API_KEY");
        if api_key.is_none() {
            log::warn!("X_API_KEY is not set; every /generate request will be rejected");
        }

        let shutdown_grace = match non_empty(vars, "SHUTDOWN_GRACE_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                DeployError::config(format!(
                    "SHUTDOWN_GRACE_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_SHUTDOWN_GRACE_SECS,
        };

        Ok(Self {
            database_url,
            api_key,
            shutdown_grace: Duration::from_secs(shutdown_grace),
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_env_map_reads_all_fields() {
        let config = ServerConfig::from_env_map(&vars(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("X_API_KEY", "s3cr3t"),
            ("SHUTDOWN_GRACE_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/app");
        assert_eq!(config.api_key.as_deref(), Some("s3cr3t"));
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
    }

    #[test]
    fn test_defaults() {
        let config =
            ServerConfig::from_env_map(&vars(&[("DATABASE_URL", "postgres://db")])).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(
            config.shutdown_grace,
            Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)
        );
    }

    #[test]
    fn test_database_url_is_required() {
        let err = ServerConfig::from_env_map(&vars(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_blank_api_key_counts_as_unset() {
        let config = ServerConfig::from_env_map(&vars(&[
            ("DATABASE_URL", "postgres://db"),
            ("X_API_KEY", ""),
        ]))
        .unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_grace_period() {
        let err = ServerConfig::from_env_map(&vars(&[
            ("DATABASE_URL", "postgres://db"),
            ("SHUTDOWN_GRACE_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }
}
