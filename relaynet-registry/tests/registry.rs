mod utils;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use relaynet_registry::{
    Catalog, MqttDeviceInfo, MqttUpdate, Registry, RegistryConfig, RegistryEvent, UpdateError,
};
use relaynet_types::{coap::DecodeError, DeviceIdentity};
use serde_json::json;
use tokio::time::{advance, timeout, Instant};
use utils::messages::{announcement, status};

fn registry(config: RegistryConfig) -> Registry {
    Registry::new(Catalog::builtin(), config)
}

fn drain(registry: &mut Registry) -> Vec<RegistryEvent> {
    std::iter::from_fn(|| registry.next_event()).collect()
}

#[tokio::test]
async fn unknown_device_is_discovered() {
    let mut registry = registry(RegistryConfig::default());
    let message = status("X#1#2", Some(370), None, json!([[0, 1101, 1]]));
    assert_eq!(message.valid_for, Some(37));

    registry.handle_coap_message(&message).unwrap();

    let identity = DeviceIdentity::new("X", "1");
    let events = drain(&mut registry);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        RegistryEvent::Discover { identity: id, unknown: true } if *id == identity
    ));
    assert!(matches!(&events[1], RegistryEvent::Add(id) if *id == identity));

    let device = registry.get(&identity).unwrap();
    assert!(device.online());
    assert_eq!(device.host(), "10.0.0.5");
    assert_eq!(device.ttl(), Duration::from_secs(37));
    assert_eq!(device.get("payload"), Some(&json!("[[0,1101,1]]")));
}

#[tokio::test]
async fn odd_validity_counts_four_second_units() {
    let mut registry = registry(RegistryConfig::default());
    let message = status("SHPLG-S#A1#2", Some(5), None, json!([]));
    assert_eq!(message.valid_for, Some(20));
    registry.handle_coap_message(&message).unwrap();
    let device = registry.get(&DeviceIdentity::new("SHPLG-S", "A1")).unwrap();
    assert_eq!(device.ttl(), Duration::from_secs(20));
    assert_eq!(device.model_name(), "Shelly Plug S");
}

#[tokio::test]
async fn known_device_is_discovered_as_known() {
    let mut registry = registry(RegistryConfig::default());
    registry
        .handle_coap_message(&status("SHSW-1#B929CC#2", Some(370), None, json!([[0, 1101, 1]])))
        .unwrap();
    match registry.next_event() {
        Some(RegistryEvent::Discover { unknown, .. }) => assert!(!unknown),
        other => panic!("unexpected event {other:?}"),
    }
    let device = registry.get(&DeviceIdentity::new("SHSW-1", "B929CC")).unwrap();
    assert_eq!(device.get("relay0"), Some(&json!(true)));
}

#[tokio::test]
async fn reapplying_a_status_changes_nothing() {
    let mut registry = registry(RegistryConfig::default());
    let message = status(
        "SHPLG-S#A1#2",
        Some(370),
        None,
        json!([[0, 1101, 1], [0, 4101, 12.5], [0, 3104, 41]]),
    );
    registry.handle_coap_message(&message).unwrap();

    let changes = Arc::new(AtomicUsize::new(0));
    let c = changes.clone();
    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    registry
        .get_mut(&identity)
        .unwrap()
        .on_change(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

    let report = registry.handle_coap_message(&message).unwrap();
    assert!(report.changed.is_empty());
    assert!(report.is_clean());
    assert_eq!(changes.load(Ordering::SeqCst), 0);

    let message = status("SHPLG-S#A1#2", Some(370), None, json!([[0, 4101, 13]]));
    let report = registry.handle_coap_message(&message).unwrap();
    assert_eq!(report.changed, vec!["power0"]);
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_property_list_is_rejected_whole() {
    let mut registry = registry(RegistryConfig::default());
    let message = status("SHPLG-S#A1#2", Some(370), None, json!({"relay": 1}));
    assert!(matches!(
        registry.handle_coap_message(&message),
        Err(UpdateError::Decode(DecodeError::InvalidStatusPayload(_)))
    ));
    assert!(registry.is_empty());
    assert!(registry.next_event().is_none());

    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), None, json!([[0, 4101, 3]])))
        .unwrap();
    drain(&mut registry);
    let before = registry.get(&DeviceIdentity::new("SHPLG-S", "A1")).unwrap().last_seen();

    let message = status("SHPLG-S#A1#2", Some(5), None, json!("oops"));
    assert!(registry.handle_coap_message(&message).is_err());
    let device = registry.get(&DeviceIdentity::new("SHPLG-S", "A1")).unwrap();
    assert_eq!(device.ttl(), Duration::from_secs(37));
    assert_eq!(device.last_seen(), before);
    assert_eq!(device.get("power0"), Some(&json!(3.0)));
}

#[tokio::test]
async fn incomplete_identity_is_dropped() {
    let mut registry = registry(RegistryConfig::default());
    let message = status("SHPLG-S", Some(370), None, json!([]));
    assert_eq!(
        registry.handle_coap_message(&message),
        Err(UpdateError::MissingIdentity)
    );
    assert!(registry.is_empty());
}

#[tokio::test]
async fn rejected_values_do_not_abort_the_update() {
    let mut registry = registry(RegistryConfig::default());
    let message = status(
        "SHPLG-S#A1#2",
        Some(370),
        None,
        json!([[0, 4101, "n/a"], [0, 1101, 1]]),
    );
    let report = registry.handle_coap_message(&message).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, "power0");

    let device = registry.get(&DeviceIdentity::new("SHPLG-S", "A1")).unwrap();
    assert_eq!(device.get("relay0"), Some(&json!(true)));
    assert_eq!(device.get("power0"), Some(&json!(0.0)));
}

#[tokio::test]
async fn repeated_serial_only_refreshes() {
    let mut registry = registry(RegistryConfig::default().with_dedupe_serial(true));
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), Some(9), json!([[0, 4101, 1]])))
        .unwrap();
    let report = registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), Some(9), json!([[0, 4101, 2]])))
        .unwrap();
    assert!(report.changed.is_empty());

    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    assert_eq!(registry.get(&identity).unwrap().get("power0"), Some(&json!(1.0)));

    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), Some(10), json!([[0, 4101, 2]])))
        .unwrap();
    assert_eq!(registry.get(&identity).unwrap().get("power0"), Some(&json!(2.0)));
}

#[tokio::test]
async fn identifiers_resolve_in_the_current_mode() {
    let mut registry = registry(RegistryConfig::default());
    let identity = DeviceIdentity::new("SHSW-25", "C2D");

    registry
        .handle_coap_message(&status("SHSW-25#C2D#2", Some(370), None, json!([[0, 9101, "roller"]])))
        .unwrap();
    registry
        .handle_coap_message(&status("SHSW-25#C2D#2", Some(370), None, json!([[0, 4102, 55]])))
        .unwrap();
    let device = registry.get(&identity).unwrap();
    assert_eq!(device.mode(), Some("roller"));
    assert_eq!(device.get("rollerPower"), Some(&json!(55.0)));
    assert_eq!(device.get("power0"), Some(&json!(0.0)));
    let names: Vec<&str> = device.properties().map(|(name, _)| name).collect();
    assert!(names.contains(&"rollerPower"));
    assert!(!names.contains(&"power1"));

    registry
        .handle_coap_message(&status(
            "SHSW-25#C2D#2",
            Some(370),
            None,
            json!([[0, 9101, "relay"]]),
        ))
        .unwrap();
    registry
        .handle_coap_message(&status("SHSW-25#C2D#2", Some(370), None, json!([[0, 4102, 7]])))
        .unwrap();
    let device = registry.get(&identity).unwrap();
    assert_eq!(device.get("power0"), Some(&json!(7.0)));
    assert_eq!(device.get("rollerPower"), Some(&json!(55.0)));
    let names: Vec<&str> = device.properties().map(|(name, _)| name).collect();
    assert!(!names.contains(&"rollerPower"));
    assert!(names.contains(&"power1"));
}

#[tokio::test]
async fn legacy_status_derives_mode_and_roller_state() {
    let mut registry = registry(RegistryConfig::default());
    registry
        .handle_coap_message(&status(
            "SHSW-25#C2D#1",
            Some(370),
            None,
            json!([[0, 112, 0], [0, 122, 1], [0, 113, 40]]),
        ))
        .unwrap();
    let device = registry.get(&DeviceIdentity::new("SHSW-25", "C2D")).unwrap();
    assert_eq!(device.mode(), Some("roller"));
    assert_eq!(device.get("rollerPosition"), Some(&json!(40.0)));
    assert_eq!(device.get("rollerState"), Some(&json!("close")));
}

#[tokio::test(start_paused = true)]
async fn each_status_extends_liveness() {
    let mut registry = registry(RegistryConfig::default());
    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    let start = Instant::now();
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), None, json!([])))
        .unwrap();
    drain(&mut registry);

    advance(Duration::from_secs(30)).await;
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), None, json!([])))
        .unwrap();

    // past the first window, still online
    assert!(timeout(Duration::from_secs(10), registry.poll()).await.is_err());
    assert!(registry.get(&identity).unwrap().online());

    match registry.poll().await {
        RegistryEvent::Offline(id) => assert_eq!(id, identity),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_secs(67));
    assert!(!registry.get(&identity).unwrap().online());
    assert!(registry.contains(&identity));
}

#[tokio::test(start_paused = true)]
async fn returning_online_cancels_stale_eviction() {
    let config = RegistryConfig::default().with_stale_timeout(Some(Duration::from_secs(60)));
    let mut registry = registry(config);
    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    let start = Instant::now();
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), None, json!([])))
        .unwrap();
    drain(&mut registry);

    let stale = Arc::new(AtomicUsize::new(0));
    let s = stale.clone();
    registry.get_mut(&identity).unwrap().on_stale(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    assert!(matches!(registry.poll().await, RegistryEvent::Offline(_)));
    assert!(start.elapsed() >= Duration::from_secs(37));

    advance(Duration::from_secs(13)).await;
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(370), None, json!([])))
        .unwrap();
    assert!(matches!(registry.next_event(), Some(RegistryEvent::Online(_))));

    assert!(matches!(registry.poll().await, RegistryEvent::Offline(_)));
    assert!(start.elapsed() >= Duration::from_secs(87));

    match registry.poll().await {
        RegistryEvent::Stale(id) => assert_eq!(id, identity),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_secs(147));
    assert_eq!(stale.load(Ordering::SeqCst), 1);

    match registry.poll().await {
        RegistryEvent::Remove(device) => assert_eq!(device.identity(), &identity),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn removal_cancels_stale_eviction() {
    let config = RegistryConfig::default().with_stale_timeout(Some(Duration::from_secs(5)));
    let mut registry = registry(config);
    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", Some(5), None, json!([])))
        .unwrap();
    drain(&mut registry);

    assert!(matches!(registry.poll().await, RegistryEvent::Offline(_)));
    assert!(registry.remove(&identity));
    assert!(matches!(registry.poll().await, RegistryEvent::Remove(_)));

    assert!(timeout(Duration::from_secs(60), registry.poll()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn explicit_offline_arms_stale_timer() {
    let config = RegistryConfig::default().with_stale_timeout(Some(Duration::from_secs(5)));
    let mut registry = registry(config);
    let identity = DeviceIdentity::new("SHPLG-S", "A1");
    registry
        .handle_coap_message(&status("SHPLG-S#A1#2", None, None, json!([])))
        .unwrap();
    drain(&mut registry);

    registry.get_mut(&identity).unwrap().set_online(false);
    assert!(matches!(registry.poll().await, RegistryEvent::Offline(_)));
    assert!(matches!(registry.poll().await, RegistryEvent::Stale(_)));
    assert!(matches!(registry.poll().await, RegistryEvent::Remove(_)));
}

#[tokio::test]
async fn mqtt_announcement_then_update() {
    let mut registry = registry(RegistryConfig::default());
    let info = MqttDeviceInfo::from_announcement(&announcement(
        "shellyplug-s-7AE3F1",
        "SHPLG-S",
        "C45BBE7AE3F1",
        "10.0.0.7",
    ))
    .unwrap();
    registry.handle_mqtt_announcement(info).unwrap();

    let identity = DeviceIdentity::new("SHPLG-S", "7AE3F1");
    let events = drain(&mut registry);
    assert!(matches!(&events[0], RegistryEvent::Discover { unknown: false, .. }));
    assert!(matches!(&events[1], RegistryEvent::Add(id) if *id == identity));

    let mut update = MqttUpdate::new("shellyplug-s-7AE3F1");
    update.values.insert("relay/0/power".into(), json!(48.2));
    update.values.insert("relay/0".into(), json!("on"));
    let report = registry.handle_mqtt_update(&update).unwrap();
    assert_eq!(report.changed.len(), 2);

    let device = registry.get_by_mqtt_id("shellyplug-s-7AE3F1").unwrap();
    assert_eq!(device.identity(), &identity);
    assert_eq!(device.host(), "10.0.0.7");
    assert_eq!(device.get("power0"), Some(&json!(48.2)));
    assert_eq!(device.get("relay0"), Some(&json!(true)));
}

#[tokio::test]
async fn mqtt_and_coap_reach_the_same_device() {
    let mut registry = registry(RegistryConfig::default());
    registry
        .handle_coap_message(&status("SHSW-1#B929CC#2", Some(370), None, json!([])))
        .unwrap();
    let info = MqttDeviceInfo::from_announcement(&announcement(
        "shelly1-B929CC",
        "SHSW-1",
        "A4CF12B929CC",
        "10.0.0.5",
    ))
    .unwrap();
    registry.handle_mqtt_announcement(info).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get_by_mqtt_id("shelly1-B929CC").unwrap().mqtt_id(),
        Some("shelly1-B929CC")
    );
}

#[tokio::test(start_paused = true)]
async fn mqtt_disconnect_takes_mqtt_only_devices_offline() {
    let config = RegistryConfig::default().with_stale_timeout(Some(Duration::from_secs(5)));
    let mut registry = registry(config);
    let announce = |mqtt_id: &str, mac: &str| {
        MqttDeviceInfo::from_announcement(&announcement(mqtt_id, "SHSW-1", mac, "10.0.0.2")).unwrap()
    };
    registry
        .handle_mqtt_announcement(announce("shelly1-B929CC", "A4CF12B929CC"))
        .unwrap();
    registry
        .handle_coap_message(&status("SHSW-1#7AE3F1#2", Some(370), None, json!([])))
        .unwrap();
    registry
        .handle_mqtt_announcement(announce("shelly1-7AE3F1", "A4CF127AE3F1"))
        .unwrap();
    drain(&mut registry);

    let mqtt_only = DeviceIdentity::new("SHSW-1", "B929CC");
    let both = DeviceIdentity::new("SHSW-1", "7AE3F1");
    assert_eq!(registry.mqtt_disconnected(), 1);
    assert!(!registry.get(&mqtt_only).unwrap().online());
    assert!(registry.get(&both).unwrap().online());
    assert!(matches!(
        drain(&mut registry).as_slice(),
        [RegistryEvent::Offline(id)] if *id == mqtt_only
    ));

    assert!(matches!(registry.poll().await, RegistryEvent::Stale(id) if id == mqtt_only));
    assert!(matches!(registry.poll().await, RegistryEvent::Remove(_)));
    assert_eq!(registry.mqtt_disconnected(), 0);
}
