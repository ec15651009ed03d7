use crate::{Event, MessageError, MessageKind, MqttMessage, Payload, TopicPath};

use relaynet_types::constants::{ANNOUNCE, COMMAND, NAMESPACE};

/// Split a raw topic and classify the message it carries.
pub fn parse_message(topic: &[u8], payload: &[u8]) -> Result<MqttMessage, MessageError> {
    let mut iter = topic.split(|c| *c == b'/');

    match iter.next() {
        Some(root) if root == NAMESPACE.as_bytes() => (),
        _ => return Err(MessageError::NotInNamespace),
    }

    let mut segments = Vec::new();
    for part in iter {
        segments.push(String::from_utf8(part.to_vec())?);
    }

    let (mqtt_id, kind) = match segments.as_slice() {
        [] => return Err(MessageError::MissingDevice),
        [single] if single == ANNOUNCE => (None, MessageKind::Announce),
        [single] if single == COMMAND => (None, MessageKind::Command),
        [_] => return Err(MessageError::MissingDevice),
        [device, ..] if device.is_empty() => return Err(MessageError::MissingDevice),
        [device, rest @ ..] => {
            let kind = match rest {
                [last] if last == ANNOUNCE => MessageKind::Announce,
                [.., last] if last == COMMAND => MessageKind::Command,
                _ => MessageKind::Property { path: rest.join("/") },
            };
            (Some(device.clone()), kind)
        }
    };

    Ok(MqttMessage {
        mqtt_id,
        topic: TopicPath { segments },
        kind,
        payload: Payload::parse(payload),
    })
}

/// Convert a received publish into an [Event]
pub fn topic_and_payload_to_event(topic: Vec<u8>, payload: Vec<u8>) -> Event {
    match parse_message(&topic, &payload) {
        Ok(message) => Event::Mqtt(message),
        Err(reason) => Event::InvalidPublish {
            reason,
            topic,
            payload,
        },
    }
}

#[cfg(test)]
mod tests {
    use relaynet_types::Value;
    use serde_json::json;

    use super::*;

    #[test]
    fn property_message() {
        let msg = parse_message(b"shellies/abc/relay/0/power", b"12.3").unwrap();
        assert_eq!(msg.mqtt_id.as_deref(), Some("abc"));
        assert_eq!(
            msg.kind,
            MessageKind::Property {
                path: "relay/0/power".into()
            }
        );
        assert_eq!(msg.topic.segments, vec!["abc", "relay", "0", "power"]);
        assert_eq!(msg.payload, Payload::Json(json!(12.3)));
    }

    #[test]
    fn raw_payloads_are_kept() {
        let msg = parse_message(b"shellies/abc/relay/0", b"on").unwrap();
        assert_eq!(msg.payload, Payload::Raw("on".into()));
        assert_eq!(msg.payload.into_value(), Value::String("on".into()));
    }

    #[test]
    fn announce_and_command() {
        let msg = parse_message(b"shellies/abc/announce", br#"{"id":"abc"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Announce);
        assert_eq!(msg.mqtt_id.as_deref(), Some("abc"));

        let msg = parse_message(b"shellies/announce", br#"{"id":"abc"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Announce);
        assert_eq!(msg.mqtt_id, None);

        let msg = parse_message(b"shellies/command", b"update").unwrap();
        assert_eq!(msg.kind, MessageKind::Command);
        assert_eq!(msg.mqtt_id, None);

        let msg = parse_message(b"shellies/abc/command", b"announce").unwrap();
        assert_eq!(msg.kind, MessageKind::Command);
    }

    #[test]
    fn invalid_topics() {
        assert_eq!(parse_message(b"other/abc/relay/0", b""), Err(MessageError::NotInNamespace));
        assert_eq!(parse_message(b"shellies", b""), Err(MessageError::MissingDevice));
        assert_eq!(parse_message(b"shellies/abc", b""), Err(MessageError::MissingDevice));
        assert_eq!(parse_message(b"shellies//relay", b""), Err(MessageError::MissingDevice));
        assert!(matches!(
            parse_message(b"shellies/\xff/relay", b""),
            Err(MessageError::TopicUtf8Error(_))
        ));
    }

    #[test]
    fn invalid_topic_to_event() {
        let event = topic_and_payload_to_event(b"other/x".to_vec(), b"1".to_vec());
        assert!(matches!(
            event,
            Event::InvalidPublish {
                reason: MessageError::NotInNamespace,
                ..
            }
        ));
    }
}
