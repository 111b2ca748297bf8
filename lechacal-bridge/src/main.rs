//! LeChacal RPICT serial telemetry to MQTT bridge.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lechacal_bridge::config::BridgeConfig;
use lechacal_bridge::decoder::{FieldDecoder, LineDecoder};
use lechacal_bridge::discovery::{DeviceIdentity, DiscoveryPublisher};
use lechacal_bridge::pipeline::{Pipeline, PipelineError};
use lechacal_bridge::readings::ReadingPublisher;
use lechacal_bridge::schema::DeviceSchema;
use lechacal_bridge::serial;
use lechacal_bridge_framework::{
    ArrivalTracker, AvailabilityMonitor, BridgeRunner, PAYLOAD_OFFLINE,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::parse();
    config.validate().context("Invalid configuration")?;

    let topics = config.topics();
    let mut runner =
        BridgeRunner::new_with_args("lechacal", &config.bridge, &config.default_client_id())?
            .with_shutdown_message(topics.availability_topic(), PAYLOAD_OFFLINE);

    let mapping_path = config.mapping_path();
    let schema = Arc::new(
        DeviceSchema::load(&mapping_path)
            .with_context(|| format!("Failed to load device mapping from {:?}", mapping_path))?,
    );
    info!(
        model = %schema.model(),
        fields = schema.len(),
        "Loaded device mapping"
    );

    let reader = serial::open_line_source(&config.serial, config.baud_rate)?;

    let publisher = runner.publisher();
    let arrivals = Arc::new(ArrivalTracker::new());

    let availability = AvailabilityMonitor::new(
        arrivals.clone(),
        publisher.clone(),
        topics.availability_topic(),
        config.availability(),
    );
    runner.spawn(availability.clone().run());

    let discovery = DiscoveryPublisher::new(
        publisher.clone(),
        DeviceIdentity::new(topics.clone(), schema.model()),
    );
    let connections = runner.connections();
    runner.spawn(discovery.run(
        schema.clone(),
        connections,
        availability,
        config.discovery_refresh(),
    ));

    let pipeline = Pipeline::new(
        LineDecoder::new(schema, FieldDecoder::new(config.normalization())),
        ReadingPublisher::new(publisher, topics),
        arrivals,
    )
    .with_connection(runner.connections());

    runner
        .run_until(async move {
            let stats = pipeline.run(reader).await?;
            Err::<(), _>(PipelineError::SourceClosed { lines: stats.lines })
        })
        .await?;

    Ok(())
}
