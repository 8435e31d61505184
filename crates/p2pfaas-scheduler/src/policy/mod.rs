//! Scheduling policies.
//!
//! A `Policy` decides, per request, whether the job runs here or on a
//! peer, then enacts the decision through the `SchedulerContext`. Every
//! variant converts to and from a `SchedulerDescriptor` (name plus string
//! parameters), which is the only form persisted or exposed on the API.
//!
//! ```text
//!                     ┌── Reject
//!                     ├── NoScheduling(loss)
//! ServiceRequest ──►  ├── Forward(max_hops)            ──► execute_locally
//!    Policy::schedule ├── PowerOfN(F, T, loss, hops, τ)     or
//!                     ├── RoundRobinWithMaster         ──► execute_externally
//!                     └── Learning(task_types)
//! ```

mod basic;
mod learning;
mod master;
mod power_of_n;

use std::time::Duration;

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest};

use crate::context::SchedulerContext;
use crate::error::{ScheduleResult, SchedulerError, SchedulerResult};
use crate::job::JobResult;

pub use basic::{Forward, NoScheduling, Reject};
pub use learning::Learning;
pub use master::RoundRobinWithMaster;
pub use power_of_n::PowerOfN;

pub const REJECT_NAME: &str = "RejectScheduler";
pub const NO_SCHEDULING_NAME: &str = "NoScheduler";
pub const FORWARD_NAME: &str = "ForwardScheduler";
pub const POWER_OF_N_NAME: &str = "PowerOfNScheduler";
pub const POWER_OF_N_TAU_NAME: &str = "PowerOfNSchedulerTau";
pub const ROUND_ROBIN_MASTER_NAME: &str = "RoundRobinWithMasterScheduler";
pub const LEARNING_NAME: &str = "LearningScheduler";

/// The active scheduling policy.
#[derive(Debug)]
pub enum Policy {
    Reject(Reject),
    NoScheduling(NoScheduling),
    Forward(Forward),
    PowerOfN(PowerOfN),
    RoundRobinWithMaster(RoundRobinWithMaster),
    Learning(Learning),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::PowerOfN(PowerOfN {
            f: 1,
            t: 2,
            loss: true,
            max_hops: 1,
            tau: None,
        })
    }
}

impl Policy {
    /// Build a policy from its descriptor, validating every parameter.
    pub fn from_descriptor(descriptor: &SchedulerDescriptor) -> SchedulerResult<Self> {
        let p = &descriptor.parameters;
        let policy = match descriptor.name.as_str() {
            REJECT_NAME => Policy::Reject(Reject),
            NO_SCHEDULING_NAME => Policy::NoScheduling(NoScheduling {
                loss: param_bool(p, 0)?,
            }),
            FORWARD_NAME => Policy::Forward(Forward {
                max_hops: param_u32(p, 0)?,
            }),
            POWER_OF_N_NAME | POWER_OF_N_TAU_NAME => {
                let tau = if descriptor.name == POWER_OF_N_TAU_NAME {
                    Some(param_duration(p, 4)?)
                } else {
                    None
                };
                Policy::PowerOfN(PowerOfN {
                    f: param_u32(p, 0)?,
                    t: param_u32(p, 1)?,
                    loss: param_bool(p, 2)?,
                    max_hops: param_u32(p, 3)?,
                    tau,
                })
            }
            ROUND_ROBIN_MASTER_NAME => Policy::RoundRobinWithMaster(RoundRobinWithMaster::new(
                param_bool(p, 0)?,
                param_str(p, 1)?,
                param_bool(p, 2)?,
            )),
            LEARNING_NAME => Policy::Learning(Learning {
                task_types: param_u32(p, 0)? as usize,
            }),
            other => {
                return Err(SchedulerError::BadSchedulerParameters(format!(
                    "unknown scheduler {other}"
                )));
            }
        };
        Ok(policy)
    }

    /// Human-readable name with parameters, sent in `X-P2pfaas-Scheduler`.
    pub fn full_name(&self) -> String {
        match self {
            Policy::Reject(p) => p.full_name(),
            Policy::NoScheduling(p) => p.full_name(),
            Policy::Forward(p) => p.full_name(),
            Policy::PowerOfN(p) => p.full_name(),
            Policy::RoundRobinWithMaster(p) => p.full_name(),
            Policy::Learning(p) => p.full_name(),
        }
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        match self {
            Policy::Reject(p) => p.descriptor(),
            Policy::NoScheduling(p) => p.descriptor(),
            Policy::Forward(p) => p.descriptor(),
            Policy::PowerOfN(p) => p.descriptor(),
            Policy::RoundRobinWithMaster(p) => p.descriptor(),
            Policy::Learning(p) => p.descriptor(),
        }
    }

    /// Decide and enact; returns once the job has concluded.
    pub async fn schedule(&self, ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        match self {
            Policy::Reject(p) => p.schedule(ctx, request).await,
            Policy::NoScheduling(p) => p.schedule(ctx, request).await,
            Policy::Forward(p) => p.schedule(ctx, request).await,
            Policy::PowerOfN(p) => p.schedule(ctx, request).await,
            Policy::RoundRobinWithMaster(p) => p.schedule(ctx, request).await,
            Policy::Learning(p) => p.schedule(ctx, request).await,
        }
    }
}

/// Apply `f` to the job result whether the schedule succeeded or not.
pub(crate) fn annotate(result: ScheduleResult, f: impl FnOnce(&mut JobResult)) -> ScheduleResult {
    match result {
        Ok(mut r) => {
            f(&mut r);
            Ok(r)
        }
        Err(mut failure) => {
            f(&mut failure.result);
            Err(failure)
        }
    }
}

// ── Parameter parsing ──────────────────────────────────────────────

fn param_str(params: &[String], index: usize) -> SchedulerResult<String> {
    params.get(index).cloned().ok_or_else(|| {
        SchedulerError::BadSchedulerParameters(format!(
            "expected at least {} parameters, got {}",
            index + 1,
            params.len()
        ))
    })
}

fn param_u32(params: &[String], index: usize) -> SchedulerResult<u32> {
    let raw = param_str(params, index)?;
    raw.trim().parse().map_err(|_| {
        SchedulerError::BadSchedulerParameters(format!("parameter {index}: {raw:?} is not an unsigned integer"))
    })
}

fn param_bool(params: &[String], index: usize) -> SchedulerResult<bool> {
    let raw = param_str(params, index)?;
    parse_bool(raw.trim()).ok_or_else(|| {
        SchedulerError::BadSchedulerParameters(format!("parameter {index}: {raw:?} is not a boolean"))
    })
}

fn param_duration(params: &[String], index: usize) -> SchedulerResult<Duration> {
    let raw = param_str(params, index)?;
    parse_duration(raw.trim()).ok_or_else(|| {
        SchedulerError::BadSchedulerParameters(format!("parameter {index}: {raw:?} is not a duration"))
    })
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse durations like `200ms`, `1.5s`, `2m`, `500us`.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (value, unit) = s.split_at(split);
    let value: f64 = value.parse().ok()?;
    let secs = match unit {
        "ns" => value / 1e9,
        "us" | "µs" => value / 1e6,
        "ms" => value / 1e3,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(secs).ok()
}
