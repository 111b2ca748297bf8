/// Root of the availability topic shared by every field of a bridge.
pub const AVAILABILITY_ROOT: &str = "lechacal";

/// Builder for the MQTT topics of one bridged device.
///
/// Topics follow the Home Assistant discovery layout:
/// `<discovery_prefix>/sensor/<identifier>_<field>[/config]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    discovery_prefix: String,
    identifier: String,
}

impl TopicBuilder {
    /// Create a topic builder for a device identifier.
    pub fn new(discovery_prefix: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
            identifier: identifier.into(),
        }
    }

    pub fn discovery_prefix(&self) -> &str {
        &self.discovery_prefix
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Stable unique id of a field's sensor.
    ///
    /// # Example
    /// ```
    /// use lechacal_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("homeassistant", "lechacal");
    /// assert_eq!(topics.unique_id("Vrms"), "lechacal_Vrms");
    /// ```
    pub fn unique_id(&self, field: &str) -> String {
        format!("{}_{}", self.identifier, field)
    }

    /// Topic carrying a field's live value.
    ///
    /// # Example
    /// ```
    /// use lechacal_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("homeassistant", "lechacal");
    /// assert_eq!(topics.state_topic("RP1"), "homeassistant/sensor/lechacal_RP1");
    /// ```
    pub fn state_topic(&self, field: &str) -> String {
        format!(
            "{}/sensor/{}",
            self.discovery_prefix,
            self.unique_id(field)
        )
    }

    /// Retained discovery topic of a field.
    ///
    /// # Example
    /// ```
    /// use lechacal_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("homeassistant", "lechacal");
    /// assert_eq!(
    ///     topics.config_topic("RP1"),
    ///     "homeassistant/sensor/lechacal_RP1/config"
    /// );
    /// ```
    pub fn config_topic(&self, field: &str) -> String {
        format!("{}/config", self.state_topic(field))
    }

    /// Availability topic shared by all sensors of the device.
    ///
    /// # Example
    /// ```
    /// use lechacal_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("homeassistant", "garage");
    /// assert_eq!(topics.availability_topic(), "lechacal/garage/availability");
    /// ```
    pub fn availability_topic(&self) -> String {
        format!("{}/{}/availability", AVAILABILITY_ROOT, self.identifier)
    }
}
