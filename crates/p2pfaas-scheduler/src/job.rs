//! Job results returned by the policies.

use std::collections::HashMap;

use p2pfaas_core::{ApiResponse, PeersListMember, Timings, TimingsStart};

/// Where a forwarded job went and the path it took.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalExecutionInfo {
    /// Address of the first peer the job was sent to.
    pub peer: String,
    /// Path reported back by the peers, executing node first.
    pub peers_list: Vec<PeersListMember>,
}

/// Final outcome of a scheduled job.
///
/// For forwarded jobs the response body is still the base64 text taken
/// from the peer envelope, so a relaying node can pass it on unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobResult {
    pub response: Option<ApiResponse>,
    pub probing_messages: u32,
    pub external_execution: bool,
    pub external_info: Option<ExternalExecutionInfo>,
    pub error_execution: bool,
    pub timings_start: TimingsStart,
    pub timings: Timings,
    /// Policy-specific headers for the client.
    pub response_headers: HashMap<String, String>,
    /// Full name of the policy that handled the job.
    pub scheduler: String,
}

impl JobResult {
    pub fn new(scheduler: impl Into<String>, timings_start: TimingsStart) -> Self {
        Self {
            scheduler: scheduler.into(),
            timings_start,
            ..Default::default()
        }
    }

    /// Derive durations from the recorded timestamps.
    pub fn compute_timings(&mut self) {
        self.timings.compute(&self.timings_start);
    }

    /// Path of the job, executing node first. Empty for local jobs.
    pub fn peers_list(&self) -> &[PeersListMember] {
        self.external_info
            .as_ref()
            .map(|i| i.peers_list.as_slice())
            .unwrap_or(&[])
    }
}
