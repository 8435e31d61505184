//! Interfaces to the services the scheduler depends on.
//!
//! The daemon wires HTTP and socket implementations from `p2pfaas-net`
//! and `p2pfaas-learner`; tests substitute in-memory fakes.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::types::{ApiResponse, PeerJobRequest, PeerJobResponse, PeerLoad};

/// Errors returned by the discovery collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no peers known")]
    NoPeers,

    #[error("peer index {index} out of range ({len} known)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("discovery service unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the alive peers, by address.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// All alive peer addresses. `cached` skips a round-trip to the
    /// discovery service when a previous list is known.
    async fn machines(&self, cached: bool) -> Result<Vec<String>, DiscoveryError>;

    /// `n` distinct peers chosen uniformly at random.
    async fn random_machines(&self, n: usize, cached: bool) -> Result<Vec<String>, DiscoveryError> {
        let machines = self.machines(cached).await?;
        sample_machines(machines, n)
    }

    /// The peer at `index` in the known list.
    async fn machine_at(&self, index: usize, cached: bool) -> Result<String, DiscoveryError> {
        let machines = self.machines(cached).await?;
        let len = machines.len();
        machines
            .into_iter()
            .nth(index)
            .ok_or(DiscoveryError::IndexOutOfRange { index, len })
    }
}

/// Sample `n` distinct entries without replacement.
///
/// Returns the whole list when `n` is at least its length.
pub fn sample_machines(mut machines: Vec<String>, n: usize) -> Result<Vec<String>, DiscoveryError> {
    if machines.is_empty() {
        return Err(DiscoveryError::NoPeers);
    }
    if n >= machines.len() {
        return Ok(machines);
    }
    let mut rng = rand::thread_rng();
    machines.shuffle(&mut rng);
    machines.truncate(n);
    Ok(machines)
}

/// Queries one peer's monitoring endpoint.
#[async_trait]
pub trait LoadSource: Send + Sync {
    async fn load(&self, machine: &str) -> anyhow::Result<PeerLoad>;
}

/// Sends a job envelope to a peer.
#[async_trait]
pub trait PeerForwarder: Send + Sync {
    /// `Ok(None)` means the peer answered without a usable envelope.
    async fn forward(
        &self,
        machine: &str,
        request: &PeerJobRequest,
    ) -> anyhow::Result<Option<PeerJobResponse>>;
}

/// Executes a function on the FaaS backend.
#[async_trait]
pub trait FaasBackend: Send + Sync {
    async fn execute(
        &self,
        function: &str,
        payload: &[u8],
        content_type: &str,
    ) -> anyhow::Result<ApiResponse>;
}

/// Action chosen by the learning service for a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActOutput {
    pub action: f64,
    pub eps: f64,
}

/// Asks the learning service for an action.
#[async_trait]
pub trait Learner: Send + Sync {
    async fn act(&self, state: &[f64]) -> anyhow::Result<ActOutput>;
}
