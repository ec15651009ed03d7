use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, error, info, trace};
use relaynet_client::{Event, Transport};
use relaynet_types::{
    coap::{CoapMessage, CoapPacket, DecodeError},
    constants::{COAP_PORT, DESCRIPTION_PATH, STATUS_PATH},
};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::{net::UdpSocket, time::timeout};

use crate::CoapOptions;

/// Largest datagram a device sends
const MAX_DATAGRAM: usize = 2048;

#[derive(Error, Debug)]
pub enum CoapError {
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid response: {0}")]
    Decode(#[from] DecodeError),
    #[error("No response received")]
    Timeout,
}

fn bind_multicast(options: &CoapOptions) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, options.port);
    socket.bind(&SocketAddr::V4(addr).into())?;
    socket.join_multicast_v4(&options.multicast_addr, &options.interface)?;
    UdpSocket::from_std(socket.into())
}

async fn send_request(socket: &UdpSocket, path: &str, message_id: u16, target: SocketAddr) -> io::Result<()> {
    let packet = CoapPacket::get(path, message_id);
    trace!("Sending GET {path} to {target}");
    socket.send_to(&packet.encode(), target).await?;
    Ok(())
}

fn datagram_to_event(datagram: &[u8], from: SocketAddr) -> Option<Event> {
    let host = from.ip().to_string();
    match CoapMessage::decode(datagram, host.clone()) {
        Ok(message) => {
            if !message.is_status() {
                trace!("Ignoring {} {} from {host}", message.code, message.path);
                return None;
            }
            Some(Event::Coap(message))
        }
        Err(reason) => Some(Event::InvalidDatagram { reason, host }),
    }
}

enum State {
    Unbound,
    Bound(UdpSocket),
}

/// An [relaynet_client::EventLoop] receiving CoAP status pushes.
///
/// The socket is bound lazily on the first poll. [Event::Online] is produced once the
/// multicast group has been joined.
pub struct EventLoop {
    options: CoapOptions,
    state: State,
    message_id: u16,
    buf: Vec<u8>,
}

impl EventLoop {
    pub fn new(options: CoapOptions) -> Self {
        Self {
            options,
            state: State::Unbound,
            message_id: 0,
            buf: vec![0; MAX_DATAGRAM],
        }
    }

    fn next_message_id(&mut self) -> u16 {
        self.message_id = self.message_id.wrapping_add(1);
        self.message_id
    }

    fn multicast_target(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.options.multicast_addr), self.options.port)
    }

    /// Multicast a status request. Replies are delivered through [EventLoop::poll] like any
    /// other status message.
    pub async fn request_status(&mut self) -> Result<(), CoapError> {
        let message_id = self.next_message_id();
        let target = self.multicast_target();
        match &self.state {
            State::Bound(socket) => Ok(send_request(socket, STATUS_PATH, message_id, target).await?),
            State::Unbound => Err(CoapError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket not bound",
            ))),
        }
    }

    async fn bind(&mut self) -> Option<Event> {
        match bind_multicast(&self.options) {
            Ok(socket) => {
                info!(
                    "Listening for status messages on {}:{}",
                    self.options.multicast_addr, self.options.port
                );
                self.state = State::Bound(socket);
                if self.options.request_on_start {
                    if let Err(e) = self.request_status().await {
                        error!("Status request failed: {e}");
                    }
                }
                Some(Event::Online(Transport::Coap))
            }
            Err(e) => {
                error!("Unable to bind CoAP socket: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                None
            }
        }
    }

    async fn poll_socket(&mut self) -> Option<Event> {
        let socket = match &self.state {
            State::Bound(socket) => socket,
            State::Unbound => return self.bind().await,
        };
        match socket.recv_from(&mut self.buf).await {
            Ok((len, from)) => datagram_to_event(&self.buf[..len], from),
            Err(e) => {
                error!("CoAP socket error: {e}");
                self.state = State::Unbound;
                Some(Event::Offline(Transport::Coap))
            }
        }
    }
}

#[async_trait]
impl relaynet_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Event {
        loop {
            if let Some(event) = self.poll_socket().await {
                return event;
            }
        }
    }
}

/// Multicast a single status request and collect every status reply received within the
/// configured request timeout.
pub async fn discover(options: &CoapOptions) -> Result<Vec<CoapMessage>, CoapError> {
    let socket = UdpSocket::bind((options.interface, 0)).await?;
    let target = SocketAddr::new(IpAddr::V4(options.multicast_addr), options.port);
    send_request(&socket, STATUS_PATH, 1, target).await?;

    let mut messages = Vec::new();
    let mut buf = vec![0; MAX_DATAGRAM];
    let deadline = tokio::time::Instant::now() + options.request_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let (len, from) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => break,
        };
        match datagram_to_event(&buf[..len], from) {
            Some(Event::Coap(message)) => messages.push(message),
            Some(Event::InvalidDatagram { reason, host }) => {
                debug!("Discarding invalid reply from {host}: {reason}")
            }
            _ => (),
        }
    }
    Ok(messages)
}

/// Request the description document of the device at `host`.
pub async fn describe(host: IpAddr, request_timeout: Duration) -> Result<CoapPacket, CoapError> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
    send_request(&socket, DESCRIPTION_PATH, 1, SocketAddr::new(host, COAP_PORT)).await?;

    let mut buf = vec![0; MAX_DATAGRAM];
    let (len, _) = timeout(request_timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| CoapError::Timeout)??;
    Ok(CoapPacket::decode(&buf[..len])?)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use relaynet_types::{
        coap::{Code, CoapOption, MessageType},
        constants::{OPTION_GLOBAL_DEVID, OPTION_URI_PATH},
    };

    use super::*;

    fn from() -> SocketAddr {
        "10.0.0.5:5683".parse().unwrap()
    }

    fn packet(code: Code, path: &[&str]) -> CoapPacket {
        let mut options: Vec<CoapOption> = path
            .iter()
            .map(|s| CoapOption::new(OPTION_URI_PATH, s.as_bytes().to_vec()))
            .collect();
        options.push(CoapOption::new(OPTION_GLOBAL_DEVID, b"SHSW-1#ABC123#2".to_vec()));
        CoapPacket {
            message_type: MessageType::NonConfirmable,
            code,
            message_id: 7,
            token: Bytes::new(),
            options,
            payload: Bytes::from_static(br#"{"G":[[0,112,1]]}"#),
        }
    }

    #[test]
    fn status_push_becomes_event() {
        let datagram = packet(Code::STATUS_PUSH, &["cit", "s"]).encode();
        match datagram_to_event(&datagram, from()) {
            Some(Event::Coap(message)) => {
                assert_eq!(message.host, "10.0.0.5");
                assert_eq!(message.device_type.as_deref(), Some("SHSW-1"));
            }
            other => panic!("got {other:?}"),
        }
    }

    #[test]
    fn other_paths_are_ignored() {
        let datagram = packet(Code::CONTENT, &["cit", "d"]).encode();
        assert!(datagram_to_event(&datagram, from()).is_none());
    }

    #[test]
    fn garbage_is_reported() {
        match datagram_to_event(&[0x00, 0x01], from()) {
            Some(Event::InvalidDatagram { reason, host }) => {
                assert_eq!(reason, DecodeError::Truncated);
                assert_eq!(host, "10.0.0.5");
            }
            other => panic!("got {other:?}"),
        }
    }
}
