use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

/// Tunable domain rules. `allow_payment_retry` decides whether a
/// reservation may accumulate further payment attempts after a
/// non-approved one, or whether payment creation is one-shot.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_allow_retry")]
    pub allow_payment_retry: bool,
}

fn default_allow_retry() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Base configuration, checked in.
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // Environment wins last: ATOLL__SERVER__PORT=9000 etc.
            .add_source(config::Environment::with_prefix("ATOLL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
