use async_trait::async_trait;
use log::{error, info, trace};
use relaynet_types::topic::{Command, CommandTopic, TopicFilter};
use rumqttc::{
    v5::{
        mqttbytes::{
            v5::{Filter, Packet},
            QoS,
        },
        AsyncClient as RuClient, EventLoop as RuEventLoop,
    },
    Outgoing,
};

use relaynet_client::{topic_and_payload_to_event, Event, Transport};

use crate::MqttOptions;

fn qos_to_mqtt_qos(qos: relaynet_types::topic::QoS) -> QoS {
    match qos {
        relaynet_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
        relaynet_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
        relaynet_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
    Filter::new(String::from(topic_filter.topic), qos_to_mqtt_qos(topic_filter.qos))
}

/// A [relaynet_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
    client: RuClient,
}

impl Client {
    async fn publish(&self, topic: String, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ()> {
        match self.client.publish(topic, qos, retain, payload).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Publish failed: {e}");
                Err(())
            }
        }
    }

    fn try_publish(&self, topic: String, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ()> {
        match self.client.try_publish(topic, qos, retain, payload) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }
}

#[async_trait]
impl relaynet_client::Client for Client {
    async fn disconnect(&self) -> Result<(), ()> {
        match self.client.disconnect().await {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }

    async fn publish_command(&self, topic: CommandTopic, command: Command) -> Result<(), ()> {
        let (qos, retain) = topic.get_publish_quality_retain();
        self.publish(topic.topic, qos_to_mqtt_qos(qos), retain, command.as_str().into())
            .await
    }

    async fn try_publish_command(&self, topic: CommandTopic, command: Command) -> Result<(), ()> {
        let (qos, retain) = topic.get_publish_quality_retain();
        self.try_publish(topic.topic, qos_to_mqtt_qos(qos), retain, command.as_str().into())
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ()> {
        let filters: Vec<Filter> = topics.into_iter().map(topic_filter_to_mqtt_filter).collect();
        match self.client.subscribe_many(filters).await {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }
}

enum ConnectionState {
    Disconnected,
    ManualDisconnected,
    Connected,
}

/// An [relaynet_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
    state: ConnectionState,
    el: RuEventLoop,
}

impl EventLoop {
    /// Create a new `Eventloop`.
    ///
    /// `cap` specifies the capacity of the bounded async channel for the client handle.
    pub fn new(options: MqttOptions, cap: usize) -> (Self, Client) {
        let (client, eventloop) = RuClient::new(options.into(), cap);
        (
            EventLoop {
                el: eventloop,
                state: ConnectionState::Disconnected,
            },
            Client { client },
        )
    }

    async fn poll_rumqtt(&mut self) -> Option<Event> {
        let event = self.el.poll().await;
        match event {
            Ok(event) => {
                trace!("{event:?}");
                match event {
                    rumqttc::v5::Event::Incoming(Packet::ConnAck(_)) => {
                        info!("Connected to broker");
                        self.state = ConnectionState::Connected;
                        Some(Event::Online(Transport::Mqtt))
                    }
                    rumqttc::v5::Event::Incoming(Packet::Disconnect(_)) => {
                        self.state = ConnectionState::Disconnected;
                        Some(Event::Offline(Transport::Mqtt))
                    }
                    rumqttc::v5::Event::Incoming(Packet::Publish(publish)) => Some(
                        topic_and_payload_to_event(publish.topic.to_vec(), publish.payload.to_vec()),
                    ),
                    rumqttc::v5::Event::Outgoing(Outgoing::Disconnect) => {
                        self.state = ConnectionState::ManualDisconnected;
                        Some(Event::Offline(Transport::Mqtt))
                    }
                    _ => None,
                }
            }
            Err(e) => match self.state {
                ConnectionState::Connected => {
                    error!("Client error: {e}");
                    self.state = ConnectionState::Disconnected;
                    Some(Event::Offline(Transport::Mqtt))
                }
                ConnectionState::Disconnected => {
                    error!("Client error on reconnect attempt: {e}");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    None
                }
                ConnectionState::ManualDisconnected => {
                    // stay quiet until dropped
                    std::future::pending::<()>().await;
                    None
                }
            },
        }
    }
}

#[async_trait]
impl relaynet_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Event {
        loop {
            if let Some(event) = self.poll_rumqtt().await {
                return event;
            }
        }
    }
}
