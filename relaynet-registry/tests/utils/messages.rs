use bytes::Bytes;
use relaynet_client::{parse_message, Event};
use relaynet_types::{
    coap::{Code, CoapMessage, CoapOption, CoapPacket},
    constants::{OPTION_GLOBAL_DEVID, OPTION_STATUS_SERIAL, OPTION_STATUS_VALIDITY, STATUS_PATH},
    Value,
};
use serde_json::json;

/// Build a status push as it would arrive from `host`
pub fn status(identity: &str, validity: Option<u16>, serial: Option<u16>, props: Value) -> CoapMessage {
    status_from("10.0.0.5", identity, validity, serial, json!({ "G": props }))
}

pub fn status_from(
    host: &str,
    identity: &str,
    validity: Option<u16>,
    serial: Option<u16>,
    payload: Value,
) -> CoapMessage {
    let mut packet = CoapPacket::get(STATUS_PATH, 1);
    packet.code = Code::STATUS_PUSH;
    packet
        .options
        .push(CoapOption::new(OPTION_GLOBAL_DEVID, identity.as_bytes().to_vec()));
    if let Some(validity) = validity {
        packet
            .options
            .push(CoapOption::new(OPTION_STATUS_VALIDITY, validity.to_be_bytes().to_vec()));
    }
    if let Some(serial) = serial {
        packet
            .options
            .push(CoapOption::new(OPTION_STATUS_SERIAL, serial.to_be_bytes().to_vec()));
    }
    packet.payload = Bytes::from(payload.to_string());
    CoapMessage::from_packet(&packet, host).unwrap()
}

pub fn announcement(mqtt_id: &str, model: &str, mac: &str, ip: &str) -> Value {
    json!({
        "id": mqtt_id,
        "model": model,
        "mac": mac,
        "ip": ip,
        "new_fw": false,
        "fw_ver": "20230913-112003/v1.14.0-gcb84623"
    })
}

pub fn mqtt_event(topic: &str, payload: &str) -> Event {
    Event::Mqtt(parse_message(topic.as_bytes(), payload.as_bytes()).unwrap())
}
