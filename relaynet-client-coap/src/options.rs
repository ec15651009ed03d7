use std::{net::Ipv4Addr, time::Duration};

use relaynet_types::constants::{COAP_MULTICAST_ADDR, COAP_PORT};

/// Options for the CoAP transport
#[derive(Debug, Clone)]
pub struct CoapOptions {
    /// Multicast group status pushes are sent to
    pub multicast_addr: Ipv4Addr,
    pub port: u16,
    /// Local interface used to join the multicast group
    pub interface: Ipv4Addr,
    /// How long to gather replies after a status request
    pub request_timeout: Duration,
    /// Send a multicast status request once the socket is bound
    pub request_on_start: bool,
}

impl CoapOptions {
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_request_on_start(mut self, request: bool) -> Self {
        self.request_on_start = request;
        self
    }
}

impl Default for CoapOptions {
    fn default() -> Self {
        Self {
            multicast_addr: COAP_MULTICAST_ADDR
                .parse()
                .unwrap_or(Ipv4Addr::new(224, 0, 1, 187)),
            port: COAP_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            request_timeout: Duration::from_millis(500),
            request_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CoapOptions::default();
        assert_eq!(options.multicast_addr, Ipv4Addr::new(224, 0, 1, 187));
        assert_eq!(options.port, 5683);
        assert_eq!(options.request_timeout, Duration::from_millis(500));
        assert!(options.request_on_start);
    }
}
