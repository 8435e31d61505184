//! Scheduling context: everything a policy may consult or act through.
//!
//! Built once at startup and shared by reference; tests build it over
//! in-memory fakes.

use std::sync::Arc;

use p2pfaas_core::{Learner, PeerDirectory, PeerForwarder, PeersListMember, Timings};

use crate::load_table::LoadTable;
use crate::prober::LoadProber;
use crate::queue::AdmissionQueue;

/// Identity this node reports in peers lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIdentity {
    pub machine_id: String,
    pub machine_ip: String,
}

impl NodeIdentity {
    pub fn new(machine_id: impl Into<String>, machine_ip: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            machine_ip: machine_ip.into(),
        }
    }

    /// Peers-list entry for this node carrying its own timings.
    pub fn peers_list_member(&self, timings: Timings) -> PeersListMember {
        PeersListMember {
            machine_id: self.machine_id.clone(),
            machine_ip: self.machine_ip.clone(),
            timings,
        }
    }
}

/// Shared collaborators and state used by the policies.
#[derive(Clone)]
pub struct SchedulerContext {
    pub queue: AdmissionQueue,
    pub load: Arc<LoadTable>,
    pub directory: Arc<dyn PeerDirectory>,
    pub prober: LoadProber,
    pub forwarder: Arc<dyn PeerForwarder>,
    /// Present only when the learning service is configured.
    pub learner: Option<Arc<dyn Learner>>,
    pub identity: NodeIdentity,
}

impl SchedulerContext {
    /// Running jobs plus jobs waiting in the admission queue.
    pub fn current_load(&self) -> u32 {
        self.load.total_running() + self.queue.len() as u32
    }

    /// Execution slots not taken by running jobs.
    pub fn free_slots(&self) -> usize {
        self.queue.free_slots()
    }
}
