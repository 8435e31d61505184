//! p2pfaas-core: types shared by every P2PFaaS crate.

pub mod collaborators;
pub mod config;
pub mod headers;
pub mod payload;
pub mod types;

pub use collaborators::{
    ActOutput, DiscoveryError, FaasBackend, Learner, LoadSource, PeerDirectory, PeerForwarder,
};
pub use config::{ConfigError, DynamicConfig, NodeConfig};
pub use types::*;
