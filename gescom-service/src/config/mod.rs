use anyhow::Result;
use dotenvy::dotenv;
use gescom_core::config::Config as CommonConfig;
use secrecy::Secret;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    /// Shared settings (listen port) loaded through gescom-core.
    pub common: CommonConfig,
    pub database: DatabaseConfig,
    /// When false, the gateway trust model applies and role checks pass.
    pub enforce_capabilities: bool,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let common = CommonConfig::load()?;

        let db_url = env::var("GESCOM_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("GESCOM_DATABASE_URL must be set"))?;
        let max_connections = env::var("GESCOM_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("GESCOM_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()?;

        let enforce_capabilities = env::var("GESCOM_ENFORCE_CAPABILITIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let log_level = env::var("GESCOM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            common,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            enforce_capabilities,
            service_name: "gescom-service".to_string(),
            log_level,
        })
    }
}
