//! Shared types used across P2PFaaS crates.
//!
//! The peer envelope types (`PeerJobRequest`, `PeerJobResponse`,
//! `PeersListMember`, `Timings`) are the bit-exact JSON contract between
//! nodes; field names must not change.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────

/// A function invocation as seen by the scheduler.
///
/// For external requests (`external == true`) the payload holds the
/// base64 text taken from the peer envelope, not the raw bytes.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequest {
    /// Node-local request id.
    pub id: u64,
    pub tracing_id: String,
    pub function_name: String,
    /// Task type used for per-type load accounting.
    pub task_type: i64,
    pub payload: Vec<u8>,
    pub content_type: String,
    /// `X-*` headers received with the request.
    pub headers: HashMap<String, String>,
    /// The request arrived from a peer rather than an end client.
    pub external: bool,
    pub peer_request: Option<PeerJobRequest>,
}

impl ServiceRequest {
    /// Hops already travelled by this job (0 for locally originated jobs).
    pub fn hops(&self) -> u32 {
        self.peer_request.as_ref().map(|p| p.hops).unwrap_or(0)
    }
}

// ── Peer protocol ──────────────────────────────────────────────────

/// Envelope posted to `/peer/function/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerJobRequest {
    pub service_id_request: u64,
    pub service_id_tracing: String,
    pub function_name: String,
    /// Number of times the job has been forwarded.
    pub hops: u32,
    #[serde(default)]
    pub peers_list: Vec<PeersListMember>,
    /// Base64 payload.
    pub payload: String,
    pub content_type: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Reply to a `PeerJobRequest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerJobResponse {
    #[serde(default)]
    pub peers_list: Vec<PeersListMember>,
    /// Base64 body.
    pub body: String,
    pub status_code: u16,
}

/// One node on the path of a forwarded job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeersListMember {
    pub machine_id: String,
    pub machine_ip: String,
    pub timings: Timings,
}

// ── Timings ────────────────────────────────────────────────────────

/// Raw lifecycle timestamps of a job on one node.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingsStart {
    pub arrived_at: Option<Instant>,
    pub probing_started_at: Option<Instant>,
    pub probing_ended_at: Option<Instant>,
    pub scheduled_at: Option<Instant>,
}

impl TimingsStart {
    /// Start tracking a job that arrived now.
    pub fn arrived_now() -> Self {
        Self {
            arrived_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn mark_probing_started(&mut self) {
        self.probing_started_at = Some(Instant::now());
    }

    pub fn mark_probing_ended(&mut self) {
        self.probing_ended_at = Some(Instant::now());
    }

    pub fn mark_scheduled(&mut self) {
        self.scheduled_at = Some(Instant::now());
    }
}

/// Durations in seconds derived from a `TimingsStart`.
///
/// `None` means the measure does not apply to the path the job took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probing_time: Option<f64>,
}

impl Timings {
    /// Fill total, scheduling and probing durations relative to now.
    ///
    /// The execution time is left untouched since only the executor knows it.
    pub fn compute(&mut self, start: &TimingsStart) {
        self.compute_at(start, Instant::now());
    }

    pub fn compute_at(&mut self, start: &TimingsStart, now: Instant) {
        if let Some(arrived) = start.arrived_at {
            self.total_time = Some(now.saturating_duration_since(arrived).as_secs_f64());
            if let Some(scheduled) = start.scheduled_at {
                self.scheduling_time =
                    Some(scheduled.saturating_duration_since(arrived).as_secs_f64());
            }
        }
        if let (Some(started), Some(ended)) = (start.probing_started_at, start.probing_ended_at) {
            self.probing_time = Some(ended.saturating_duration_since(started).as_secs_f64());
        }
    }
}

// ── Responses ──────────────────────────────────────────────────────

/// Response of a function execution, local or remote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub status_code: u16,
}

impl ApiResponse {
    /// Headers whose name starts with `X`, which are relayed to clients.
    pub fn x_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter(|(k, _)| crate::headers::is_x_header(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Serializable form of the active scheduling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl SchedulerDescriptor {
    pub fn new(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// Load reported by a peer's monitoring endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerLoad {
    pub running: u32,
    pub queue_length: u32,
    pub max_running: Option<u32>,
}

impl PeerLoad {
    /// Running jobs plus queued jobs.
    pub fn total(&self) -> u32 {
        self.running + self.queue_length
    }
}
