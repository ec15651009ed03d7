use super::constants::{ANNOUNCE, COMMAND, NAMESPACE};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Announce,
    Update,
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Announce => super::constants::CMD_ANNOUNCE,
            Command::Update => super::constants::CMD_UPDATE,
        }
    }
}

/// The topic a command is published on.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandTopic {
    pub topic: String,
    pub mqtt_id: Option<String>,
}

impl CommandTopic {
    /// Command topic addressed to every device in the namespace
    pub fn all() -> Self {
        Self {
            topic: format!("{}/{}", NAMESPACE, COMMAND),
            mqtt_id: None,
        }
    }

    /// Command topic addressed to a single device
    pub fn device(mqtt_id: &str) -> Self {
        Self {
            topic: format!("{}/{}/{}", NAMESPACE, mqtt_id, COMMAND),
            mqtt_id: Some(mqtt_id.to_string()),
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        (QoS::AtMostOnce, false)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Topic {
    /// Every topic below the namespace root
    Namespace,
    /// Every topic of one device
    Device { mqtt_id: String },
    /// Announcements of all devices
    Announce,
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        match value {
            Topic::Namespace => format!("{}/#", NAMESPACE),
            Topic::Device { mqtt_id } => format!("{}/{}/#", NAMESPACE, mqtt_id),
            Topic::Announce => format!("{}/+/{}", NAMESPACE, ANNOUNCE),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: Topic,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(topic: Topic) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos(topic: Topic, qos: QoS) -> Self {
        Self { topic, qos }
    }
}

/// Build the state topic of a device property path, e.g. `shellies/<id>/relay/0`
pub fn device_topic(mqtt_id: &str, path: &str) -> String {
    format!("{}/{}/{}", NAMESPACE, mqtt_id, path)
}

pub fn announce_topic(mqtt_id: &str) -> String {
    device_topic(mqtt_id, ANNOUNCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_topics() {
        assert_eq!(CommandTopic::all().topic, "shellies/command");
        let t = CommandTopic::device("shelly1-ABC123");
        assert_eq!(t.topic, "shellies/shelly1-ABC123/command");
        assert_eq!(t.mqtt_id.as_deref(), Some("shelly1-ABC123"));
    }

    #[test]
    fn filters() {
        assert_eq!(String::from(Topic::Namespace), "shellies/#");
        assert_eq!(String::from(Topic::Announce), "shellies/+/announce");
        assert_eq!(
            String::from(Topic::Device { mqtt_id: "abc".into() }),
            "shellies/abc/#"
        );
        assert_eq!(announce_topic("abc"), "shellies/abc/announce");
        assert_eq!(device_topic("abc", "relay/0/power"), "shellies/abc/relay/0/power");
    }
}
