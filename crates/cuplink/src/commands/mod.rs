//! Subcommand handlers and the wiring they share.

pub mod config_cmd;
pub mod publish;
pub mod read;
pub mod run;

use std::sync::Arc;
use std::time::Duration;

use cuplink_api::MqttSession;
use cuplink_config::Config;
use cuplink_core::{
    ConnectionState, CupContext, CupService, MemoryPool, RegistryOwnershipValidator,
    TracingAnalyticsSink, TransportConnector,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Upper bound on waiting for a clean disconnect before shutting down.
const DISCONNECT_GRACE: Duration = Duration::from_secs(10);

/// Load config from `--config` or the default location.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(cuplink_config::load_config(global.config.as_deref())?)
}

/// A connector over an MQTT session built from `config`. Not connected.
pub fn build_connector(config: &Config) -> Result<TransportConnector, CliError> {
    let session = MqttSession::new(config.broker_config()?)?;
    Ok(TransportConnector::new(
        config.connector_config()?,
        Arc::new(session),
    ))
}

/// The request-handling service over a fresh connector, with configured
/// devices bound and their owners known to the ownership validator.
pub fn build_service(config: &Config) -> Result<CupService, CliError> {
    let connector = build_connector(config)?;

    let owners = RegistryOwnershipValidator::new();
    for device in &config.devices {
        owners.insert(&device.id, &device.owner);
    }

    let ctx = CupContext::new(
        connector,
        Arc::new(MemoryPool::new(config.persistence.max_connections)),
        Arc::new(owners),
        Arc::new(TracingAnalyticsSink),
    );
    let service = CupService::new(Arc::new(ctx));
    for device in &config.devices {
        service.register_device(&device.id, &device.address);
    }
    Ok(service)
}

/// Start connecting and wait up to `seconds` for the session to come up.
/// On timeout every background task is stopped before returning.
pub async fn connect_within(
    connector: &TransportConnector,
    config: &Config,
    seconds: u64,
) -> Result<(), CliError> {
    connector.connect();
    let connected = tokio::time::timeout(
        Duration::from_secs(seconds),
        connector.wait_for(ConnectionState::Connected),
    )
    .await;
    if connected.is_err() {
        connector.shutdown().await;
        return Err(CliError::Timeout {
            endpoint: config.broker.url.clone(),
            seconds,
        });
    }
    Ok(())
}

/// Disconnect, wait a bounded time for the session to close, then stop
/// every background task.
pub async fn close(connector: &TransportConnector) {
    connector.disconnect();
    if tokio::time::timeout(
        DISCONNECT_GRACE,
        connector.wait_for(ConnectionState::Disconnected),
    )
    .await
    .is_err()
    {
        tracing::warn!("broker did not confirm disconnect, shutting down anyway");
    }
    connector.shutdown().await;
}
