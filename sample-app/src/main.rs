use std::{env, str::FromStr, time::Duration};

use log::{info, warn, LevelFilter};
use relaynet::client::{coap, mqtt_client::rumqtt, JoinedEventLoop};
use relaynet::registry::{Application, Catalog, RegistryConfig};

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, String> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| format!("Ignoring invalid {key}={value}")),
        Err(_) => Ok(None),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env_parse(key) {
        Ok(value) => value.unwrap_or(default),
        Err(e) => {
            warn!("{e}");
            default
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // the logger is not up yet, so a bad level is reported once it is
    let (level, rejected) = match env_parse("RELAYNET_LOG") {
        Ok(level) => (level.unwrap_or(LevelFilter::Info), None),
        Err(e) => (LevelFilter::Info, Some(e)),
    };
    env_logger::Builder::new().filter_level(level).init();
    if let Some(e) = rejected {
        warn!("{e}");
    }

    let host: String = env_or("RELAYNET_MQTT_HOST", "localhost".to_string());
    let port: u16 = env_or("RELAYNET_MQTT_PORT", 1883);
    let stale_secs: u64 = env_or("RELAYNET_STALE_SECS", 0);

    let opts = rumqtt::MqttOptions::new("relaynet-sample", host, port);
    let (mqtt_eventloop, client) = rumqtt::EventLoop::new(opts, 64);
    let coap_eventloop = coap::EventLoop::new(coap::CoapOptions::default());
    let eventloop = JoinedEventLoop::new(coap_eventloop, mqtt_eventloop);

    let config = RegistryConfig::default()
        .with_stale_timeout(Some(Duration::from_secs(stale_secs)).filter(|d| !d.is_zero()));
    let (application, client) = Application::new(eventloop, client, Catalog::builtin(), config);

    let application = application
        .on_online(|| info!("Transport online"))
        .on_offline(|| info!("Transport offline"))
        .on_discover(|device, unknown| {
            info!(
                "Discovered {} ({}) at {}, unknown = {unknown}",
                device.identity(),
                device.model_name(),
                device.host()
            )
        })
        .on_add(|device| {
            device.on_change(|change, device| {
                info!("{} {} = {} (was {})", device.identity(), change.name, change.new, change.old)
            });
            device.on_online(|device| info!("{} online", device.identity()));
            device.on_offline(|device| info!("{} offline", device.identity()));
        })
        .on_stale(|identity| info!("{identity} went stale"))
        .on_remove(|device| info!("{} removed", device.identity()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            client.cancel().await;
        }
    });

    application.run().await;
}
