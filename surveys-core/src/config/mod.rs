//! Configuration management for the survey service

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration (config change notifications)
    pub redis: RedisConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Calendar (event attendance) service
    pub calendar: UpstreamConfig,
    /// Notifications service
    pub notifications: UpstreamConfig,
    /// Service account used against the calendar and notifications services
    pub service_account: ServiceAccountConfig,
    /// Deadline for the user-data fan-out
    pub fanout_timeout_ms: u64,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Pub/sub channel that carries config change notifications
    pub config_channel: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret. Ignored when `public_key_pem` is set.
    pub secret: String,
    pub issuer: String,
    /// RS256 public key used to verify tokens issued by the auth service
    pub public_key_pem: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceAccountConfig {
    /// Token endpoint that exchanges the account credentials for a bearer token
    pub token_url: String,
    pub account_id: String,
    pub secret: String,
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub metrics_enabled: bool,
    pub tracing_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    /// "json" or "pretty"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            tracing_enabled: false,
            otlp_endpoint: None,
            service_name: "surveys-core".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let upstream_timeout_ms: u64 = env::var("UPSTREAM_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("Invalid UPSTREAM_TIMEOUT_MS")?;

        let public_key_pem = env::var("JWT_PUBLIC_KEY")
            .ok()
            .map(|value| value.replace("\\n", "\n"));
        let secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if public_key_pem.is_some() => String::new(),
            Err(_) => anyhow::bail!("JWT_SECRET is required when JWT_PUBLIC_KEY is not set"),
        };

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                config_channel: env::var("CONFIG_CHANNEL")
                    .unwrap_or_else(|_| "surveys:configs:changed".to_string()),
            },
            jwt: JwtConfig {
                secret,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "surveys".to_string()),
                public_key_pem,
            },
            calendar: UpstreamConfig {
                base_url: required_url("CALENDAR_BASE_URL")?,
                timeout_ms: upstream_timeout_ms,
            },
            notifications: UpstreamConfig {
                base_url: required_url("NOTIFICATIONS_BASE_URL")?,
                timeout_ms: upstream_timeout_ms,
            },
            service_account: ServiceAccountConfig {
                token_url: env::var("SERVICE_ACCOUNT_TOKEN_URL").unwrap_or_default(),
                account_id: env::var("SERVICE_ACCOUNT_ID").unwrap_or_default(),
                secret: env::var("SERVICE_ACCOUNT_SECRET").unwrap_or_default(),
            },
            fanout_timeout_ms: env::var("FANOUT_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("Invalid FANOUT_TIMEOUT_MS")?,
            telemetry: TelemetryConfig {
                metrics_enabled: env::var("METRICS_ENABLED")
                    .map(|s| s.to_lowercase() != "false")
                    .unwrap_or(true),
                tracing_enabled: env::var("OTEL_TRACING_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "surveys-core".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }
}

/// A required environment variable holding an http(s) base URL
fn required_url(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| format!("{} is required", key))?;
    check_base_url(&value).with_context(|| format!("Invalid {}", key))?;
    Ok(value)
}

fn check_base_url(value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("unsupported scheme {}", parsed.scheme());
    }
    Ok(())
}
