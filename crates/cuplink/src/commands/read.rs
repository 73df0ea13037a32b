//! `cuplink read`: trigger a device's sensor report and print the latest
//! known reading.

use cuplink_config::Config;

use crate::cli::ReadArgs;
use crate::error::CliError;

pub async fn handle(args: ReadArgs, config: &Config) -> Result<(), CliError> {
    let service = super::build_service(config)?;
    let connector = service.context().connector().clone();
    super::connect_within(&connector, config, args.timeout_secs).await?;

    let response = service
        .read_sensor(&args.owner, &args.device, args.sensor)
        .await;
    super::close(&connector).await;

    if !response.status.is_success() {
        return Err(CliError::OperationFailed {
            message: format!(
                "reading {} from {} failed: {}",
                args.sensor, args.device, response.status
            ),
        });
    }

    match response.record {
        Some(record) => println!(
            "{} {} = {} (observed at {} ms)",
            record.device_id, record.sensor_kind, record.value, record.observed_at_epoch_millis
        ),
        None => println!("{} {}: no reading yet", args.device, args.sensor),
    }
    Ok(())
}
