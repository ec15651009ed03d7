//! A small set of built in device schemas.

use log::error;
use relaynet_types::Value;

use crate::{
    device::Device,
    factory::Catalog,
    property::PropertyDefinition as Prop,
    schema::{DeviceSchema, Protocol, UpdateContext, MODE, SETTINGS},
};

pub const RELAY_MODE: &str = "relay";
pub const ROLLER_MODE: &str = "roller";

/// Whether the update is a CoAP update of protocol revision 1, which lacks mode and roller
/// state identifiers
fn legacy_coap(context: &UpdateContext<'_>) -> bool {
    context.protocol == Protocol::Coap && context.protocol_revision == Some("1")
}

/// Infer the mode of a dual mode device from the identifiers present in a legacy status
pub fn mode_from_legacy_status(device: &mut Device, context: &UpdateContext<'_>) {
    if !legacy_coap(context) {
        return;
    }
    let mode = match context.contains_coap_id(113) {
        true => ROLLER_MODE,
        false => RELAY_MODE,
    };
    _ = device.set(MODE, Value::from(mode));
}

/// Derive the roller state from the relay states of a legacy status, honouring the
/// direction swap setting
pub fn roller_state_from_relays(device: &mut Device, context: &UpdateContext<'_>) {
    if !legacy_coap(context) || device.mode() != Some(ROLLER_MODE) {
        return;
    }
    let swap = device
        .get(SETTINGS)
        .and_then(|s| s.get("rollers"))
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("swap"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let is_on = |name: &str| device.get(name).and_then(Value::as_bool).unwrap_or(false);

    let state = if is_on("relay0") {
        if swap { "close" } else { "open" }
    } else if is_on("relay1") {
        if swap { "open" } else { "close" }
    } else {
        "stop"
    };
    _ = device.set("rollerState", Value::from(state));
}

/// Copy the mode found in the device settings into the `mode` property
pub fn mode_from_settings(device: &mut Device, _context: &UpdateContext<'_>) {
    let mode = device
        .get(SETTINGS)
        .and_then(|s| s.get(MODE))
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(mode) = mode {
        _ = device.set(MODE, Value::String(mode));
    }
}

pub fn shelly_1() -> DeviceSchema {
    DeviceSchema::new("SHSW-1", "Shelly 1")
        .property(Prop::boolean("relay0", false).coap([112, 1101]).mqtt(["relay/0"]))
        .property(Prop::number("input0", 0.0).coap([118, 2101]).mqtt(["input/0"]))
        .property(Prop::string("inputEvent0", "").coap([2102]).mqtt(["input_event/0.event"]))
        .property(
            Prop::number("inputEventCounter0", 0.0)
                .coap([2103])
                .mqtt(["input_event/0.event_cnt"]),
        )
        .property(
            Prop::new("externalTemperature0", Value::Null)
                .coerce(crate::coerce::number)
                .coap([119, 3101])
                .mqtt(["ext_temperature/0"]),
        )
}

/// Dual mode relay / roller shutter actuator
pub fn shelly_25() -> DeviceSchema {
    DeviceSchema::new("SHSW-25", "Shelly 2.5")
        .property(Prop::string(MODE, RELAY_MODE).coap([9101]).mqtt(["info.mode"]))
        .property(Prop::boolean("relay0", false).coap([112, 1101]).mqtt(["relay/0"]))
        .property(Prop::boolean("relay1", false).coap([122, 1201]).mqtt(["relay/1"]))
        .property(Prop::number("input0", 0.0).coap([118, 2101]).mqtt(["input/0"]))
        .property(Prop::number("input1", 0.0).coap([128, 2201]).mqtt(["input/1"]))
        .property(Prop::number("power0", 0.0).coap([111, 4101, 4102]).mqtt(["relay/0/power"]))
        .property(Prop::number("energyCounter0", 0.0).coap([4103, 4104]).mqtt(["relay/0/energy"]))
        .property(Prop::number("deviceTemperature", 0.0).coap([115, 3104]).mqtt(["temperature"]))
        .property(Prop::boolean("overTemperature", false).coap([117, 6101]).mqtt(["overtemperature"]))
        .property(
            Prop::number("power1", 0.0)
                .mode(RELAY_MODE)
                .coap([121, 4201])
                .mqtt(["relay/1/power"]),
        )
        .property(
            Prop::number("energyCounter1", 0.0)
                .mode(RELAY_MODE)
                .coap([4203])
                .mqtt(["relay/1/energy"]),
        )
        .property(Prop::boolean("overPower0", false).mode(RELAY_MODE).coap([6102]))
        .property(Prop::boolean("overPower1", false).mode(RELAY_MODE).coap([6202]))
        .property(
            Prop::number("rollerPower", 0.0)
                .mode(ROLLER_MODE)
                .coap([4102])
                .mqtt(["roller/0/power"]),
        )
        .property(
            Prop::string("rollerState", "stop")
                .mode(ROLLER_MODE)
                .coap([1102])
                .mqtt(["roller/0"]),
        )
        .property(
            Prop::number("rollerPosition", 0.0)
                .mode(ROLLER_MODE)
                .coap([113, 1103])
                .mqtt(["roller/0/pos"]),
        )
        .property(
            Prop::string("rollerStopReason", "")
                .mode(ROLLER_MODE)
                .coap([6103])
                .mqtt(["roller/0/stop_reason"]),
        )
        .before_update(mode_from_legacy_status)
        .after_update(mode_from_settings)
        .after_update(roller_state_from_relays)
}

/// Battery powered temperature and humidity sensor
pub fn shelly_ht() -> DeviceSchema {
    DeviceSchema::new("SHHT-1", "Shelly H&T")
        .property(
            Prop::number("temperature", 0.0)
                .coap([33, 3101])
                .mqtt(["sensor/temperature"]),
        )
        .property(Prop::number("humidity", 0.0).coap([44, 3103]).mqtt(["sensor/humidity"]))
        .property(Prop::boolean("sensorError", false).coap([3115]).mqtt(["sensor/error"]))
        .property(Prop::number("battery", 0.0).coap([77, 3111]).mqtt(["sensor/battery"]))
        .property(Prop::string("wakeUpEvent", "unknown").coap([9102]))
}

/// Metering plug
pub fn shelly_plug_s() -> DeviceSchema {
    DeviceSchema::new("SHPLG-S", "Shelly Plug S")
        .property(Prop::boolean("relay0", false).coap([112, 1101]).mqtt(["relay/0"]))
        .property(Prop::number("power0", 0.0).coap([111, 4101]).mqtt(["relay/0/power"]))
        .property(Prop::number("energyCounter0", 0.0).coap([4103]).mqtt(["relay/0/energy"]))
        .property(Prop::boolean("overPower", false).coap([6102]))
        .property(
            Prop::number("overPowerValue", 0.0)
                .coap([6109])
                .mqtt(["relay/0/overpower_value"]),
        )
        .property(Prop::number("deviceTemperature", 0.0).coap([113, 3104]).mqtt(["temperature"]))
        .property(Prop::boolean("overTemperature", false).coap([115, 6101]).mqtt(["overtemperature"]))
}

pub fn builtin_schemas() -> Vec<DeviceSchema> {
    vec![shelly_1(), shelly_25(), shelly_ht(), shelly_plug_s()]
}

impl Catalog {
    /// A catalog holding the built in schemas
    pub fn builtin() -> Self {
        let mut catalog = Catalog::empty();
        for schema in builtin_schemas() {
            let device_type = schema.device_type.clone();
            if let Err(e) = catalog.register(schema) {
                error!("Built in schema {device_type} is invalid: {e}");
            }
        }
        catalog
    }
}
