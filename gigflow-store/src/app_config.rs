use gigflow_order::EnginePolicy;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub platform_fee_bps: u32,
    pub default_list_limit: i64,
    pub supported_currencies: Vec<String>,
}

impl BusinessRules {
    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            platform_fee_bps: self.platform_fee_bps,
            supported_currencies: self.supported_currencies.clone(),
            default_list_limit: self.default_list_limit,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overlay; optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, kept out of version control
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `GIGFLOW_SERVER__PORT=9090` overrides server.port
            .add_source(config::Environment::with_prefix("GIGFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
