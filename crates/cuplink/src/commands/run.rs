//! `cuplink run`: hold the broker session open until Ctrl-C.

use tracing::info;

use cuplink_config::Config;

use crate::error::CliError;

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let connector = super::build_connector(config)?;

    connector.connect();
    info!(
        devices = config.devices.len(),
        "cuplink running, press Ctrl-C to stop"
    );

    let mut states = connector.subscribe_state();
    let interrupted = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal,
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                info!(?state, "connection state changed");
            }
        }
    };

    info!("shutting down");
    super::close(&connector).await;
    interrupted?;
    Ok(())
}
