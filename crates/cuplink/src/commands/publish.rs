//! `cuplink publish`: send one `{resource}:{state}` command to a device.

use cuplink_api::PublishRequest;
use cuplink_config::Config;

use crate::cli::PublishArgs;
use crate::error::CliError;

pub async fn handle(args: PublishArgs, config: &Config) -> Result<(), CliError> {
    // Reject malformed arguments before touching the network.
    let request = PublishRequest::new(&args.owner, &args.device, &args.resource, &args.state)?;

    let connector = super::build_connector(config)?;
    super::connect_within(&connector, config, args.timeout_secs).await?;

    let topic = connector
        .topic_scheme()
        .publish_topic(&request.owner, &request.device_id);
    let result = connector
        .publish(
            &request.owner,
            &request.device_id,
            &request.payload.resource,
            &request.payload.state,
        )
        .await;

    super::close(&connector).await;
    result?;

    println!("{} -> {topic}", request.payload);
    Ok(())
}
