//! HTTP header names used on the client, peer and monitoring surfaces.

pub const VERSION: &str = "X-P2pfaas-Version";
pub const SCHEDULER: &str = "X-P2pfaas-Scheduler";
pub const EXTERNALLY_EXECUTED: &str = "X-P2pfaas-Externally-Executed";
pub const HOPS: &str = "X-P2pfaas-Hops";
pub const PEERS_LIST_IP: &str = "X-P2pfaas-Peers-List-Ip";
pub const PEERS_LIST_ID: &str = "X-P2pfaas-Peers-List-Id";

pub const TIMING_EXECUTION_TIME: &str = "X-P2pfaas-Timing-Execution-Time-Seconds";
pub const TIMING_TOTAL_LIST: &str = "X-P2pfaas-Timing-Total-Seconds-List";
pub const TIMING_PROBING_LIST: &str = "X-P2pfaas-Timing-Probing-Seconds-List";
pub const TIMING_SCHEDULING_LIST: &str = "X-P2pfaas-Timing-Scheduling-Seconds-List";

// Per-request scheduler overrides sent by clients.
pub const SCHEDULER_BYPASS: &str = "X-P2pfaas-Scheduler-Bypass";
pub const SCHEDULER_FORWARD: &str = "X-P2pfaas-Scheduler-Forward";
pub const SCHEDULER_REJECT: &str = "X-P2pfaas-Scheduler-Reject";
pub const SCHEDULER_TRACING_ID: &str = "X-P2pfaas-Scheduler-Task-Tracing-Id";

pub const LEARNING_TASK_TYPE: &str = "X-P2pfaas-Scheduler-Learning-Task-Type";
pub const LEARNING_EID: &str = "X-P2pfaas-Scheduler-Learning-Eid";
pub const LEARNING_STATE: &str = "X-P2pfaas-Scheduler-Learning-State";
pub const LEARNING_ACTION: &str = "X-P2pfaas-Scheduler-Learning-Action";
pub const LEARNING_EPS: &str = "X-P2pfaas-Scheduler-Learning-Eps";

// Monitoring endpoint.
pub const MONITORING_LOAD: &str = "X-P2PFaaS-Load";
pub const MONITORING_MAX_LOAD: &str = "X-P2PFaaS-MaxLoad";
pub const MONITORING_QUEUE_LENGTH: &str = "X-P2PFog-Queue-Length";

/// User agent peers identify themselves with on node-to-node calls.
pub const USER_AGENT_MACHINE: &str = "Machine";

/// Canonical form of a header name: `x-p2pfaas-load` becomes
/// `X-P2pfaas-Load`. Lookups in request and response header maps use it.
pub fn canonical(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Headers relayed between clients, peers and functions start with `X`.
pub fn is_x_header(name: &str) -> bool {
    name.starts_with('X') || name.starts_with('x')
}
