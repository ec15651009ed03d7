use std::{sync::Arc, time::Duration};

use log::{debug, info, trace, warn};
use relaynet_client::{
    Client, DynClient, DynEventLoop, Event, EventLoop, MessageKind, MqttMessage, Transport,
};
use relaynet_types::{
    topic::{Topic, TopicFilter},
    DeviceIdentity,
};
use tokio::{
    select,
    sync::mpsc::{self, Receiver},
    task,
    time::timeout,
};

use crate::{
    debounce::Debouncer,
    device::Device,
    factory::DeviceFactory,
    mqtt::{MqttDeviceInfo, MqttUpdate},
    Registry, RegistryConfig, RegistryEvent, UpdateError,
};

struct Shutdown;

/// The client to interact with a running [Application] from.
#[derive(Clone)]
pub struct AppClient {
    client: Arc<DynClient>,
    sender: mpsc::Sender<Shutdown>,
}

impl AppClient {
    /// Stop the application and disconnect the transport.
    ///
    /// Produces an [AppEvent::Cancelled] from [Application::poll].
    pub async fn cancel(&self) {
        info!("App Stopping");
        _ = self.sender.send(Shutdown).await;
        _ = self.client.disconnect().await;
    }

    /// Ask one device, or all devices when `mqtt_id` is `None`, to announce itself
    pub async fn request_announcement(&self, mqtt_id: Option<&str>) -> Result<(), ()> {
        self.client.request_announcement(mqtt_id).await
    }

    /// Ask one device, or all devices when `mqtt_id` is `None`, to publish its full state
    pub async fn request_update(&self, mqtt_id: Option<&str>) -> Result<(), ()> {
        self.client.request_update(mqtt_id).await
    }
}

/// An event produced by [Application::poll]
#[derive(Debug)]
pub enum AppEvent {
    /// The first transport connected
    Online,
    /// The last connected transport disconnected
    Offline,
    Registry(RegistryEvent),
    Cancelled,
}

pub type OnlineCallback = Box<dyn Fn() + Send>;
pub type OfflineCallback = Box<dyn Fn() + Send>;
pub type DiscoverCallback = Box<dyn Fn(&Device, bool) + Send>;
pub type AddCallback = Box<dyn Fn(&mut Device) + Send>;
pub type RemoveCallback = Box<dyn Fn(&Device) + Send>;
pub type StaleCallback = Box<dyn Fn(&DeviceIdentity) + Send>;

#[derive(Default)]
struct AppCallbacks {
    online: Option<OnlineCallback>,
    offline: Option<OfflineCallback>,
    discover: Option<DiscoverCallback>,
    add: Option<AddCallback>,
    remove: Option<RemoveCallback>,
    stale: Option<StaleCallback>,
}

/// Drives a [Registry] from a transport [EventLoop].
///
/// CoAP status messages are applied to the registry as they arrive. MQTT messages go through
/// a [Debouncer] first and are applied once per burst. When the MQTT transport comes online
/// the application subscribes to the device namespace and asks every device to announce
/// itself and publish its state. When it goes offline pending MQTT updates are discarded and
/// devices only known over MQTT are marked offline.
///
/// Each transport is tracked separately, so a CoAP listener dropping does not touch MQTT
/// state and the other way round.
pub struct Application {
    mqtt_online: bool,
    coap_online: bool,
    registry: Registry,
    debouncer: Debouncer,
    eventloop: Box<DynEventLoop>,
    client: AppClient,
    shutdown_rx: Receiver<Shutdown>,
    cbs: AppCallbacks,
}

impl Application {
    /// Create a new [Application] instance.
    pub fn new<E, C, F>(eventloop: E, client: C, factory: F, config: RegistryConfig) -> (Self, AppClient)
    where
        E: EventLoop + Send + 'static,
        C: Client + Send + Sync + 'static,
        F: DeviceFactory + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let client = AppClient {
            client: Arc::new(client),
            sender: tx,
        };
        let app = Self {
            mqtt_online: false,
            coap_online: false,
            debouncer: Debouncer::new(config.pooling_window),
            registry: Registry::new(factory, config),
            eventloop: Box::new(eventloop),
            client: client.clone(),
            shutdown_rx: rx,
            cbs: AppCallbacks::default(),
        };
        (app, client)
    }

    /// Register a callback to be notified the transport is online.
    ///
    /// *Note*: This callback is blocking and is called directly from the event loop. Blocking will prevent progression.
    pub fn on_online<F>(mut self, cb: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        self.cbs.online = Some(Box::new(cb));
        self
    }

    /// Register a callback to be notified the transport is offline.
    ///
    /// *Note*: This callback is blocking and is called directly from the event loop. Blocking will prevent progression.
    pub fn on_offline<F>(mut self, cb: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        self.cbs.offline = Some(Box::new(cb));
        self
    }

    /// Register a callback for newly discovered devices. The flag is set for devices of an unknown type.
    pub fn on_discover<F>(mut self, cb: F) -> Self
    where
        F: Fn(&Device, bool) + Send + 'static,
    {
        self.cbs.discover = Some(Box::new(cb));
        self
    }

    /// Register a callback for devices added to the registry.
    ///
    /// Typical use involves registering change and lifecycle callbacks with the device.
    pub fn on_add<F>(mut self, cb: F) -> Self
    where
        F: Fn(&mut Device) + Send + 'static,
    {
        self.cbs.add = Some(Box::new(cb));
        self
    }

    pub fn on_remove<F>(mut self, cb: F) -> Self
    where
        F: Fn(&Device) + Send + 'static,
    {
        self.cbs.remove = Some(Box::new(cb));
        self
    }

    pub fn on_stale<F>(mut self, cb: F) -> Self
    where
        F: Fn(&DeviceIdentity) + Send + 'static,
    {
        self.cbs.stale = Some(Box::new(cb));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Whether any transport is connected
    pub fn online(&self) -> bool {
        self.mqtt_online || self.coap_online
    }

    fn transport_online(&mut self, transport: Transport) -> &mut bool {
        match transport {
            Transport::Mqtt => &mut self.mqtt_online,
            Transport::Coap => &mut self.coap_online,
        }
    }

    fn handle_online(&mut self, transport: Transport) -> Option<AppEvent> {
        let was_online = self.online();
        let flag = self.transport_online(transport);
        if *flag {
            return None;
        }
        *flag = true;
        info!("Transport {transport} online");
        if transport == Transport::Mqtt && self.registry.config().mqtt {
            let client = self.client.client.clone();
            task::spawn(async move {
                _ = client
                    .subscribe_many(vec![TopicFilter::new(Topic::Namespace)])
                    .await;
                _ = client.request_announcement(None).await;
                _ = client.request_update(None).await;
            });
        }
        match was_online {
            true => None,
            false => {
                info!("App Online");
                Some(AppEvent::Online)
            }
        }
    }

    fn handle_offline(&mut self, transport: Transport) -> Option<AppEvent> {
        let flag = self.transport_online(transport);
        if !*flag {
            return None;
        }
        *flag = false;
        info!("Transport {transport} offline");
        if transport == Transport::Mqtt {
            self.debouncer.cancel_all();
            self.registry.mqtt_disconnected();
        }
        match self.online() {
            true => None,
            false => {
                info!("App Offline");
                Some(AppEvent::Offline)
            }
        }
    }

    fn handle_mqtt_message(&mut self, message: MqttMessage) {
        match message.kind {
            MessageKind::Announce => {
                match MqttDeviceInfo::from_announcement(&message.payload.into_value()) {
                    Ok(info) => self.debouncer.announce(info),
                    Err(e) => debug!("Ignoring announcement: {e}"),
                }
            }
            MessageKind::Property { path } => {
                if let Some(mqtt_id) = message.mqtt_id {
                    self.debouncer
                        .push(&mqtt_id, path, message.payload.into_value());
                }
            }
            MessageKind::Command => trace!("Ignoring command echo"),
        }
    }

    fn handle_event(&mut self, event: Event) -> Option<AppEvent> {
        match event {
            Event::Online(transport) => self.handle_online(transport),
            Event::Offline(transport) => self.handle_offline(transport),
            Event::Mqtt(message) => {
                if self.registry.config().mqtt {
                    self.handle_mqtt_message(message);
                }
                None
            }
            Event::Coap(message) => {
                if self.registry.config().coap {
                    if let Err(e) = self.registry.handle_coap_message(&message) {
                        debug!("Dropping status from {}: {e}", message.host);
                    }
                }
                None
            }
            Event::InvalidPublish { reason, topic, .. } => {
                debug!(
                    "Invalid publish on {}: {reason}",
                    String::from_utf8_lossy(&topic)
                );
                None
            }
            Event::InvalidDatagram { reason, host } => {
                debug!("Invalid datagram from {host}: {reason}");
                None
            }
        }
    }

    fn handle_flush(&mut self, update: MqttUpdate) {
        match self.registry.handle_mqtt_update(&update) {
            Ok(_) => (),
            Err(UpdateError::UnknownMqttDevice(mqtt_id)) => {
                debug!("mqtt id = {mqtt_id} unknown, requesting announcement");
                let client = self.client.client.clone();
                task::spawn(async move {
                    _ = client.request_announcement(Some(&mqtt_id)).await;
                });
            }
            Err(e) => warn!("Unable to apply update for mqtt id = {}: {e}", update.mqtt_id),
        }
    }

    async fn poll_until_offline(&mut self) {
        while self.online() {
            if let Event::Offline(transport) = self.eventloop.poll().await {
                self.handle_offline(transport);
            }
        }
    }

    async fn poll_until_offline_with_timeout(&mut self) {
        _ = timeout(Duration::from_secs(1), self.poll_until_offline()).await;
    }

    /// Progress the application.
    ///
    /// **NOTE** Don't block while iterating. Timers, debouncing and reconnection only make
    /// progress while this is being awaited.
    pub async fn poll(&mut self) -> AppEvent {
        loop {
            if let Some(event) = self.registry.next_event() {
                return AppEvent::Registry(event);
            }
            select! {
                event = self.eventloop.poll() => {
                    if let Some(app_event) = self.handle_event(event) {
                        return app_event
                    }
                }
                event = self.registry.poll() => return AppEvent::Registry(event),
                update = self.debouncer.next_flush() => self.handle_flush(update),
                Some(_) = self.shutdown_rx.recv() => {
                    self.poll_until_offline_with_timeout().await;
                    self.debouncer.cancel_all();
                    return AppEvent::Cancelled
                },
            }
        }
    }

    fn dispatch(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Online => {
                if let Some(cb) = &self.cbs.online {
                    cb()
                }
            }
            AppEvent::Offline => {
                if let Some(cb) = &self.cbs.offline {
                    cb()
                }
            }
            AppEvent::Registry(RegistryEvent::Discover { identity, unknown }) => {
                if let (Some(cb), Some(device)) = (&self.cbs.discover, self.registry.get(identity)) {
                    cb(device, *unknown)
                }
            }
            AppEvent::Registry(RegistryEvent::Add(identity)) => {
                if let (Some(cb), Some(device)) = (&self.cbs.add, self.registry.get_mut(identity)) {
                    cb(device)
                }
            }
            AppEvent::Registry(RegistryEvent::Remove(device)) => {
                if let Some(cb) = &self.cbs.remove {
                    cb(device)
                }
            }
            AppEvent::Registry(RegistryEvent::Stale(identity)) => {
                if let Some(cb) = &self.cbs.stale {
                    cb(identity)
                }
            }
            AppEvent::Registry(_) | AppEvent::Cancelled => (),
        }
    }

    /// Run the Application
    ///
    /// Runs the Application until [AppClient::cancel()] is called
    pub async fn run(mut self) {
        loop {
            let event = self.poll().await;
            trace!("Application event = ({event:?})");
            if let AppEvent::Cancelled = event {
                break;
            }
            self.dispatch(&event);
        }
    }
}
