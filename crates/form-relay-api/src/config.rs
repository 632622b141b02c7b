//! Configuration types for the HTTP service
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `/etc/form-relay/service.yaml`
//! 2. `./config/service.yaml`
//! 3. The file named by `FORM_RELAY_CONFIG_FILE` (must exist when set)
//! 4. Environment variables prefixed `FR__`, e.g. `FR__SERVER__PORT=9090`
//! 5. `PORT`, which sets `server.port`
//!
//! Every field has a default, so an unconfigured environment yields a
//! working service.

use crate::errors::ConfigError;
use form_relay_core::adapters::crm_client::{DEFAULT_API_VERSION, DEFAULT_CRM_BASE_URL};
use form_relay_core::adapters::memory_activity_log::DEFAULT_LOG_CAPACITY;
use form_relay_core::{ConfigKeyArity, CrmClientConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "FORM_RELAY_CONFIG_FILE";

/// Prefix for per-key environment overrides
pub const ENV_PREFIX: &str = "FR";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Outbound CRM API settings
    pub crm: CrmConfig,

    /// Dispatch and activity-log settings
    pub dispatch: DispatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
            enable_compression: true,
        }
    }
}

/// CRM API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API host, without a trailing path
    pub base_url: String,

    /// Value sent in the `Version` header
    pub api_version: String,

    /// Bound on each outbound call
    pub timeout_seconds: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CRM_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl CrmConfig {
    pub fn client_config(&self) -> CrmClientConfig {
        CrmClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_api_version(self.api_version.clone())
            .with_timeout(Duration::from_secs(self.timeout_seconds))
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Whether configurations are keyed by location alone or by location
    /// and form
    pub config_key_arity: ConfigKeyArity,

    /// Entries retained by the activity log
    pub log_capacity: usize,

    /// Entries returned by `GET /api/logs`
    pub log_page_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            config_key_arity: ConfigKeyArity::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_page_size: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load from files and the environment, then validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/form-relay/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV) {
            if !explicit_path.is_empty() {
                info!(path = %explicit_path, "Loading configuration from explicit path");
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
            }
        }

        let mut service_config: ServiceConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        if let Ok(port) = std::env::var("PORT") {
            service_config.server.port =
                port.trim().parse().map_err(|_| ConfigError::Invalid {
                    message: format!("PORT must be a port number, got '{}'", port),
                })?;
        }

        service_config.validate()?;
        Ok(service_config)
    }

    /// Check value ranges and the CRM base URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be non-zero".to_string(),
            });
        }

        if !(1..=300).contains(&self.crm.timeout_seconds) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "crm.timeout_seconds must be between 1 and 300, got {}",
                    self.crm.timeout_seconds
                ),
            });
        }

        let base_url = url::Url::parse(&self.crm.base_url).map_err(|e| ConfigError::Invalid {
            message: format!("crm.base_url '{}' is not a URL: {}", self.crm.base_url, e),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                message: format!(
                    "crm.base_url must use http or https, got '{}'",
                    base_url.scheme()
                ),
            });
        }

        if self.dispatch.log_capacity == 0 || self.dispatch.log_page_size == 0 {
            return Err(ConfigError::Invalid {
                message: "dispatch.log_capacity and dispatch.log_page_size must be non-zero"
                    .to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
