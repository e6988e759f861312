use std::{env, net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    /// Upper bound on any single record-store call.
    pub store_timeout: Duration,
    /// Page size used by the meme listing when the client gives none.
    pub default_page_size: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let bind_address_str = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let aws_region = env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok();

        let store_timeout_ms = parse_or_default("STORE_TIMEOUT_MS", 2_000u64)?;
        if store_timeout_ms == 0 {
            return Err(ConfigError::InvalidVar(
                "STORE_TIMEOUT_MS".into(),
                "must be greater than zero".into(),
            ));
        }

        let default_page_size = parse_or_default("DEFAULT_PAGE_SIZE", 10u32)?;
        if default_page_size == 0 {
            return Err(ConfigError::InvalidVar(
                "DEFAULT_PAGE_SIZE".into(),
                "must be greater than zero".into(),
            ));
        }

        Ok(Config {
            bind_address,
            aws_region,
            localstack_endpoint,
            store_timeout: Duration::from_millis(store_timeout_ms),
            default_page_size,
        })
    }
}

fn parse_or_default<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}
