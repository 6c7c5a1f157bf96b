use anyhow::{bail, Result};
use std::env;

use crate::logging::LogFormat;
use crate::services::EstimationPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,
    pub log_format: LogFormat,

    // Database (unset means in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_run_migrations: bool,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Estimation
    pub default_currency: String,
    pub allow_empty_item_update: bool,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|s| parse_bool(&s))
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let log_format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::parse(&s))
            .unwrap_or_else(|| LogFormat::default_for(&env));

        // Database
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        if database_url.is_none() && env.is_prod() {
            bail!("DATABASE_URL must be set in production");
        }
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let database_run_migrations = env_bool("DATABASE_RUN_MIGRATIONS", true);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Estimation
        let default_currency =
            env::var("BOQ_DEFAULT_CURRENCY").unwrap_or_else(|_| "USD".to_string());
        let allow_empty_item_update = env_bool("BOQ_ALLOW_EMPTY_ITEM_UPDATE", false);

        Ok(Settings {
            env,
            server_addr,
            log_format,
            database_url,
            database_max_connections,
            database_run_migrations,
            cors_allow_origins,
            default_currency,
            allow_empty_item_update,
        })
    }

    pub fn estimation_policy(&self) -> EstimationPolicy {
        EstimationPolicy {
            default_currency: self.default_currency.clone(),
            allow_empty_item_update: self.allow_empty_item_update,
        }
    }
}
