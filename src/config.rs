use std::{fmt, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => anyhow::bail!("invalid working environment: {other}"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub max_idle: Duration,
    /// Upper bound for every storage call.
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub host: String,
    pub port: u16,
    pub db: DbConfig,
    pub limiter: LimiterConfig,
    pub shutdown_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            host: "0.0.0.0".into(),
            port: 8080,
            db: DbConfig {
                url: String::new(),
                max_connections: 25,
                max_idle: Duration::from_secs(15 * 60),
                query_timeout: Duration::from_secs(3),
            },
            limiter: LimiterConfig {
                enabled: true,
                max_requests: 4,
                window: Duration::from_secs(1),
            },
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(fallback)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let env = match std::env::var("APP_ENV") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.env,
        };

        let db = DbConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.db.max_connections),
            max_idle: Duration::from_secs(env_parse("DB_MAX_IDLE_SECS", 15 * 60)),
            query_timeout: Duration::from_secs(env_parse("DB_QUERY_TIMEOUT_SECS", 3)),
        };

        let limiter = LimiterConfig {
            enabled: env_parse("LIMITER_ENABLED", defaults.limiter.enabled),
            max_requests: env_parse("LIMITER_MAX_REQUESTS", defaults.limiter.max_requests),
            window: Duration::from_secs(env_parse("LIMITER_WINDOW_SECS", 1)),
        };

        Ok(Self {
            env,
            host: std::env::var("APP_HOST").unwrap_or(defaults.host),
            port: env_parse("APP_PORT", defaults.port),
            db,
            limiter,
            shutdown_grace: Duration::from_secs(env_parse("SHUTDOWN_GRACE_SECS", 5)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_values_only() {
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!(Environment::Production.to_string(), "production");
        assert!("prod".parse::<Environment>().is_err());
    }

    #[test]
    fn defaults_bound_storage_calls() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.db.query_timeout, Duration::from_secs(3));
        assert_eq!(cfg.port, 8080);
    }
}
