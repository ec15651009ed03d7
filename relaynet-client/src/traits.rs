use async_trait::async_trait;
use relaynet_types::topic::{Command, CommandTopic, TopicFilter};

use crate::Event;

#[async_trait]
pub trait Client {
    /// Disconnects the client.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the disconnection was successful
    /// - `Err(())` if the disconnection failed
    async fn disconnect(&self) -> Result<(), ()>;

    /// Publishes a command on the given command topic.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the message was successfully published
    /// - `Err(())` if the publication failed
    async fn publish_command(&self, topic: CommandTopic, command: Command) -> Result<(), ()>;

    /// Attempts to publish a command on the given command topic.
    ///
    /// Unlike `publish_command`, this method may return early if the client cannot process the message
    /// e.g the message queue is full.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the message was queued for publication
    /// - `Err(())` if the message couldn't be queued
    async fn try_publish_command(&self, topic: CommandTopic, command: Command) -> Result<(), ()>;

    /// Subscribes to a single topic.
    ///
    /// This is a convenience method that calls `subscribe_many` with a single topic.
    async fn subscribe(&self, topic: TopicFilter) -> Result<(), ()> {
        self.subscribe_many(vec![topic]).await
    }

    /// Subscribes to multiple topics in a single operation.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if all subscriptions were successful
    /// - `Err(())` if any subscription failed
    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ()>;

    /// Ask one device, or every device when `mqtt_id` is `None`, to announce itself.
    async fn request_announcement(&self, mqtt_id: Option<&str>) -> Result<(), ()> {
        self.publish_command(command_topic(mqtt_id)?, Command::Announce)
            .await
    }

    /// Ask one device, or every device when `mqtt_id` is `None`, to publish its full state.
    async fn request_update(&self, mqtt_id: Option<&str>) -> Result<(), ()> {
        self.publish_command(command_topic(mqtt_id)?, Command::Update)
            .await
    }
}

fn command_topic(mqtt_id: Option<&str>) -> Result<CommandTopic, ()> {
    match mqtt_id {
        Some(id) => {
            relaynet_types::utils::validate_segment(id).map_err(|_| ())?;
            Ok(CommandTopic::device(id))
        }
        None => Ok(CommandTopic::all()),
    }
}

pub type DynClient = dyn Client + Send + Sync;

#[async_trait]
pub trait EventLoop {
    async fn poll(&mut self) -> Event;
}

pub type DynEventLoop = dyn EventLoop + Send;

/// Polls two event loops concurrently, yielding events from whichever is ready first.
///
/// Used to drive a CoAP and an MQTT transport from a single consumer. Connection events are
/// passed through as they are; each carries the [Transport](crate::Transport) it belongs to, so
/// the consumer tracks every side separately.
pub struct JoinedEventLoop<A, B> {
    first: A,
    second: B,
}

impl<A, B> JoinedEventLoop<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<A, B> EventLoop for JoinedEventLoop<A, B>
where
    A: EventLoop + Send,
    B: EventLoop + Send,
{
    async fn poll(&mut self) -> Event {
        tokio::select! {
            event = self.first.poll() => event,
            event = self.second.poll() => event,
        }
    }
}
