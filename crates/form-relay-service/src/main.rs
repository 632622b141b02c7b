//! # Form Relay Service
//!
//! Binary entry point for the Form Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the configuration store, activity log, CRM client and dispatcher
//! - Starts the HTTP server from form-relay-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error,
//! 4 initialization failure.

use anyhow::Context;
use form_relay_api::{
    start_server, AppState, LoggingConfig, ServiceConfig, ServiceError, ServiceMetrics,
};
use form_relay_core::{
    ActivityLog, ConfigurationStore, CrmClient, InMemoryActivityLog, InMemoryConfigurationStore,
    KeyGenerator,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging settings come from the configuration, so load it first and
    // report any failure once logging is up.
    let loaded = ServiceConfig::load();
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Form Relay Service");

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    let state = match build_state(service_config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize service; aborting");
            std::process::exit(4);
        }
    };

    info!(
        host = %state.config.server.host,
        port = state.config.server.port,
        crm_base_url = %state.config.crm.base_url,
        arity = ?state.config.dispatch.config_key_arity,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(state).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
            ServiceError::Initialization { .. } => 4,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn default_directives(level: &str) -> String {
    format!(
        "form_relay_service={level},form_relay_api={level},form_relay_core={level},tower_http=debug"
    )
}

/// Wire the in-memory stores, CRM client and metrics into application state
fn build_state(config: ServiceConfig) -> anyhow::Result<AppState> {
    let activity_log: Arc<dyn ActivityLog> = Arc::new(InMemoryActivityLog::with_capacity(
        config.dispatch.log_capacity,
    ));
    let store: Arc<dyn ConfigurationStore> = Arc::new(InMemoryConfigurationStore::new());

    let crm_client = Arc::new(
        CrmClient::new(config.crm.client_config(), activity_log.clone())
            .context("Failed to create CRM client")?,
    );
    let metrics = ServiceMetrics::new().context("Failed to initialize metrics")?;

    Ok(AppState::new(
        config,
        store,
        activity_log,
        crm_client.clone(),
        crm_client,
        KeyGenerator::system(),
        metrics,
    ))
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
