//! p2pfaas-net: HTTP collaborators of a scheduler node.
//!
//! Every outbound call is a single HTTP/1.1 exchange over a fresh TCP
//! connection, bounded by a timeout:
//!
//! ```text
//! HttpClient
//!   ├── HttpFaasBackend   POST /function/{name}        → FaaS gateway
//!   ├── HttpPeerForwarder POST /peer/function/{name}   → peer node
//!   ├── HttpLoadSource    GET  /monitoring/load        → peer node
//!   └── DiscoveryClient   GET  /list, /configuration   → discovery service
//! ```

pub mod client;
pub mod discovery;
pub mod error;
pub mod faas;
pub mod forwarder;
pub mod load;

pub use client::{HttpClient, HttpReply};
pub use discovery::{DiscoveryClient, MachineConfiguration};
pub use error::{NetError, NetResult};
pub use faas::HttpFaasBackend;
pub use forwarder::HttpPeerForwarder;
pub use load::{HttpLoadSource, parse_load};

/// Address of a peer's scheduler, adding `port` when the machine entry is a
/// bare host.
pub fn peer_address(machine: &str, port: u16) -> String {
    if machine.contains(':') {
        machine.to_string()
    } else {
        format!("{machine}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_address_adds_default_port() {
        assert_eq!(peer_address("10.0.0.2", 18080), "10.0.0.2:18080");
        assert_eq!(peer_address("10.0.0.2:9000", 18080), "10.0.0.2:9000");
    }
}
