//! Home Assistant discovery announcements.
//!
//! Every schema field is announced as a sensor with a retained config
//! message. Announcements are republished on every broker connection and on
//! a slow refresh timer, so a restarted Home Assistant always finds them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use lechacal_bridge_framework::{
    AvailabilityMonitor, ConnectionWatcher, PAYLOAD_OFFLINE, PAYLOAD_ONLINE, PublishStats,
    Publisher, Result, TopicBuilder,
};

use crate::schema::{DeviceSchema, FieldSpec};

/// Name shown for the device in Home Assistant.
pub const DEVICE_NAME: &str = "LeChacal Energy Monitor";
/// Device manufacturer.
pub const MANUFACTURER: &str = "LeChacal";
/// Reported as the device's `via_device`.
pub const VIA_DEVICE: &str = "lechacal-mqtt-bridge";

const MDI_PREFIX: &str = "mdi:";

/// Identity of the bridged device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub topics: TopicBuilder,
    /// Device model, the name of the mapping in use.
    pub model: String,
    pub sw_version: String,
}

impl DeviceIdentity {
    pub fn new(topics: TopicBuilder, model: impl Into<String>) -> Self {
        Self {
            topics,
            model: model.into(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Sensor config message. Field order is the serialized key order.
#[derive(Debug, Serialize)]
struct DiscoveryPayload<'a> {
    name: &'a str,
    unit_of_measurement: &'a str,
    state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    unique_id: String,
    device: DeviceBlock<'a>,
    availability: AvailabilityBlock,
}

#[derive(Debug, Serialize)]
struct DeviceBlock<'a> {
    name: &'static str,
    identifiers: [&'static str; 3],
    manufacturer: &'static str,
    model: &'a str,
    sw_version: &'a str,
    via_device: &'static str,
}

#[derive(Debug, Serialize)]
struct AvailabilityBlock {
    topic: String,
    payload_available: &'static str,
    payload_not_available: &'static str,
}

fn mdi_icon(icon: &str) -> Option<String> {
    if icon.is_empty() {
        None
    } else if icon.starts_with(MDI_PREFIX) {
        Some(icon.to_string())
    } else {
        Some(format!("{}{}", MDI_PREFIX, icon))
    }
}

/// Publishes discovery config messages for schema fields.
#[derive(Debug, Clone)]
pub struct DiscoveryPublisher {
    publisher: Publisher,
    identity: DeviceIdentity,
}

impl DiscoveryPublisher {
    pub fn new(publisher: Publisher, identity: DeviceIdentity) -> Self {
        Self {
            publisher,
            identity,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Config message for one field.
    pub fn payload(&self, field: &FieldSpec) -> Result<Vec<u8>> {
        let topics = &self.identity.topics;
        let payload = DiscoveryPayload {
            name: &field.name,
            unit_of_measurement: &field.unit_of_measurement,
            state_topic: topics.state_topic(&field.name),
            icon: mdi_icon(&field.icon),
            unique_id: topics.unique_id(&field.name),
            device: DeviceBlock {
                name: DEVICE_NAME,
                identifiers: ["LeChacal", "Energy", "Monitor"],
                manufacturer: MANUFACTURER,
                model: &self.identity.model,
                sw_version: &self.identity.sw_version,
                via_device: VIA_DEVICE,
            },
            availability: AvailabilityBlock {
                topic: topics.availability_topic(),
                payload_available: PAYLOAD_ONLINE,
                payload_not_available: PAYLOAD_OFFLINE,
            },
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Publish the retained config message of one field.
    pub async fn publish_one(&self, field: &FieldSpec) -> Result<()> {
        let topic = self.identity.topics.config_topic(&field.name);
        let payload = self.payload(field)?;
        self.publisher.publish_retained(&topic, payload).await?;
        tracing::debug!(topic = %topic, field = %field.name, "Published discovery config");
        Ok(())
    }

    /// Publish config messages for every field, in schema order.
    ///
    /// A failing field is logged and does not stop the others.
    pub async fn publish_all(&self, schema: &DeviceSchema) -> PublishStats {
        let mut stats = PublishStats::default();

        for field in schema.fields() {
            match self.publish_one(field).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(field = %field.name, error = %e, "Failed to publish discovery config");
                }
            }
        }

        tracing::info!(
            model = %schema.model(),
            published = stats.success,
            failed = stats.failed,
            "Published discovery configs"
        );
        stats
    }

    /// Announce the schema on every broker connection and every
    /// `refresh_interval`, followed on connect by the current availability.
    ///
    /// Returns when the connection driver goes away.
    pub async fn run(
        self,
        schema: Arc<DeviceSchema>,
        mut connections: ConnectionWatcher,
        availability: AvailabilityMonitor,
        refresh_interval: Duration,
    ) {
        let mut refresh = tokio::time::interval_at(Instant::now() + refresh_interval, refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                session = connections.next_connection() => {
                    let Some(session) = session else {
                        tracing::debug!("Connection driver stopped, ending discovery");
                        return;
                    };
                    tracing::info!(session, "Connected to broker, announcing device");
                    self.publish_all(&schema).await;
                    if let Err(e) = availability.publish_current().await {
                        tracing::warn!(error = %e, "Failed to publish availability");
                    }
                }
                _ = refresh.tick() => {
                    if connections.state().is_connected() {
                        tracing::debug!("Refreshing discovery configs");
                        self.publish_all(&schema).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use lechacal_bridge_framework::{
        ArrivalTracker, AvailabilityConfig, LinkState, MemoryTransport, link_channel,
    };

    fn schema() -> DeviceSchema {
        DeviceSchema::new(
            "RPICT7V1",
            vec![
                FieldSpec::new("NodeID", FieldType::Integer),
                FieldSpec::new("RP1", FieldType::Float)
                    .with_unit("W")
                    .with_icon("flash"),
                FieldSpec::new("Vrms", FieldType::Float)
                    .with_unit("V")
                    .with_icon("mdi:sine-wave"),
            ],
        )
        .unwrap()
    }

    fn discovery(transport: Arc<MemoryTransport>) -> DiscoveryPublisher {
        DiscoveryPublisher::new(
            Publisher::new(transport),
            DeviceIdentity::new(TopicBuilder::new("homeassistant", "lechacal"), "RPICT7V1"),
        )
    }

    #[test]
    fn test_payload_layout() {
        let discovery = discovery(Arc::new(MemoryTransport::new()));
        let schema = schema();
        let field = &schema.fields()[1];
        let payload = String::from_utf8(discovery.payload(field).unwrap()).unwrap();

        let expected = format!(
            concat!(
                r#"{{"name":"RP1","unit_of_measurement":"W","#,
                r#""state_topic":"homeassistant/sensor/lechacal_RP1","#,
                r#""icon":"mdi:flash","unique_id":"lechacal_RP1","#,
                r#""device":{{"name":"LeChacal Energy Monitor","#,
                r#""identifiers":["LeChacal","Energy","Monitor"],"#,
                r#""manufacturer":"LeChacal","model":"RPICT7V1","#,
                r#""sw_version":"{}","via_device":"lechacal-mqtt-bridge"}},"#,
                r#""availability":{{"topic":"lechacal/lechacal/availability","#,
                r#""payload_available":"online","payload_not_available":"offline"}}}}"#,
            ),
            env!("CARGO_PKG_VERSION")
        );
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_icon_prefix() {
        assert_eq!(mdi_icon("flash").as_deref(), Some("mdi:flash"));
        assert_eq!(mdi_icon("mdi:flash").as_deref(), Some("mdi:flash"));
        assert_eq!(mdi_icon(""), None);

        let discovery = discovery(Arc::new(MemoryTransport::new()));
        let value: serde_json::Value =
            serde_json::from_slice(&discovery.payload(&schema().fields()[0]).unwrap()).unwrap();
        assert!(value.get("icon").is_none());
        assert_eq!(value["unit_of_measurement"], "");
    }

    #[tokio::test]
    async fn test_publish_all_is_retained_and_ordered() {
        let transport = Arc::new(MemoryTransport::new());
        let stats = discovery(transport.clone()).publish_all(&schema()).await;

        assert_eq!(stats, PublishStats { success: 3, failed: 0 });
        assert_eq!(
            transport.topics(),
            vec![
                "homeassistant/sensor/lechacal_NodeID/config",
                "homeassistant/sensor/lechacal_RP1/config",
                "homeassistant/sensor/lechacal_Vrms/config",
            ]
        );
        assert!(transport.messages().iter().all(|m| m.retain));
    }

    #[tokio::test]
    async fn test_republish_is_byte_identical() {
        let transport = Arc::new(MemoryTransport::new());
        let discovery = discovery(transport.clone());
        let schema = schema();

        discovery.publish_all(&schema).await;
        let first = transport.messages();
        transport.clear();
        discovery.publish_all(&schema).await;

        assert_eq!(first, transport.messages());
    }

    #[tokio::test]
    async fn test_failed_field_does_not_stop_others() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_topic("homeassistant/sensor/lechacal_RP1/config");

        let stats = discovery(transport.clone()).publish_all(&schema()).await;

        assert_eq!(stats, PublishStats { success: 2, failed: 1 });
        assert_eq!(transport.messages().len(), 2);
    }

    fn availability(transport: Arc<MemoryTransport>) -> AvailabilityMonitor {
        AvailabilityMonitor::new(
            Arc::new(ArrivalTracker::new()),
            Publisher::new(transport),
            "lechacal/lechacal/availability",
            AvailabilityConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_announces_on_connection() {
        let transport = Arc::new(MemoryTransport::new());
        let availability = availability(transport.clone());
        let (link_tx, link) = link_channel();

        let task = tokio::spawn(discovery(transport.clone()).run(
            Arc::new(schema()),
            ConnectionWatcher::new(link),
            availability,
            Duration::from_secs(3600),
        ));

        link_tx.send(LinkState::Connected { session: 1 }).unwrap();
        drop(link_tx);
        task.await.unwrap();

        let topics = transport.topics();
        assert_eq!(topics.len(), 4);
        assert_eq!(topics[3], "lechacal/lechacal/availability");
        assert_eq!(
            transport.last_payload("lechacal/lechacal/availability").as_deref(),
            Some("offline")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_only_while_connected() {
        let transport = Arc::new(MemoryTransport::new());
        let (link_tx, link) = link_channel();
        link_tx.send_replace(LinkState::Connected { session: 1 });

        let task = tokio::spawn(discovery(transport.clone()).run(
            Arc::new(schema()),
            ConnectionWatcher::new(link),
            availability(transport.clone()),
            Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let announced = transport.messages();
        assert_eq!(announced.len(), 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let messages = transport.messages();
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[4..], announced[..3]);
        assert!(messages[4..].iter().all(|m| m.retain));

        link_tx.send_replace(LinkState::Disconnected);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.messages().len(), 7);

        drop(link_tx);
        task.await.unwrap();
    }
}
