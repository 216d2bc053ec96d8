use reqwest::Url;
use std::env;
use std::net::{AddrParseError, IpAddr, SocketAddr};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "3000";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PRICING_API_BASE_URL: &str = "http://127.0.0.1:4000";

/// Deployment stage the service is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pricing: PricingApiConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Read `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: AppEnvironment::parse(&env_or("APP_ENV", "development")),
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig {
                log_level: env_or("APP_LOG_LEVEL", DEFAULT_LOG_LEVEL),
            },
            pricing: PricingApiConfig::new(env_or(
                "PRICING_API_BASE_URL",
                DEFAULT_PRICING_API_BASE_URL,
            ))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_port = env_or("APP_PORT", DEFAULT_PORT);
        let port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort { value: raw_port })?;

        Ok(Self {
            host: env_or("APP_HOST", DEFAULT_HOST),
            port,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost {
                value: self.host.clone(),
                source,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Root of the remote program catalog, pricing programs and scenario storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingApiConfig {
    pub base_url: Url,
}

impl PricingApiConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = base_url.into();
        let invalid = || ConfigError::InvalidBaseUrl { value: raw.clone() };

        let base_url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(invalid());
        }
        Ok(Self { base_url })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16 (got '{value}')")]
    InvalidPort { value: String },
    #[error("APP_HOST must parse to an IPv4 or IPv6 address (got '{value}')")]
    InvalidHost {
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error("PRICING_API_BASE_URL must be an absolute http(s) URL (got '{value}')")]
    InvalidBaseUrl { value: String },
}
