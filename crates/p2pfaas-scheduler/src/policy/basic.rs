//! Policies that take no load into account.

use tracing::debug;

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest, TimingsStart};

use super::{FORWARD_NAME, NO_SCHEDULING_NAME, REJECT_NAME};
use crate::context::SchedulerContext;
use crate::error::{JobFailure, ScheduleResult, SchedulerError};
use crate::job::JobResult;

/// Refuses every job.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reject;

impl Reject {
    pub fn full_name(&self) -> String {
        REJECT_NAME.to_string()
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        SchedulerDescriptor::new(REJECT_NAME, vec![])
    }

    pub async fn schedule(&self, _ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        debug!(request_id = request.id, function = %request.function_name, "job rejected");
        let mut timings = TimingsStart::arrived_now();
        timings.mark_scheduled();
        Err(JobFailure::new(
            SchedulerError::JobDeliberatelyRejected,
            JobResult::new(self.full_name(), timings),
        ))
    }
}

/// Always executes locally.
///
/// With `loss` set, a job that finds no free execution slot is dropped
/// instead of queued.
#[derive(Debug, Clone, Copy)]
pub struct NoScheduling {
    pub loss: bool,
}

impl NoScheduling {
    pub fn full_name(&self) -> String {
        NO_SCHEDULING_NAME.to_string()
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        SchedulerDescriptor::new(NO_SCHEDULING_NAME, vec![self.loss.to_string()])
    }

    pub async fn schedule(&self, ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        let timings = TimingsStart::arrived_now();

        if self.loss && ctx.free_slots() == 0 {
            debug!(
                request_id = request.id,
                function = %request.function_name,
                "no free slot, job dropped"
            );
            return Err(JobFailure::new(
                SchedulerError::JobCannotBeScheduled("no free execution slot".into()),
                JobResult::new(self.full_name(), timings),
            ));
        }

        ctx.execute_locally(request, timings, &self.full_name()).await
    }
}

/// Forwards every job to one random peer until `max_hops` is reached.
#[derive(Debug, Clone, Copy)]
pub struct Forward {
    pub max_hops: u32,
}

impl Forward {
    pub fn full_name(&self) -> String {
        format!("{FORWARD_NAME}({})", self.max_hops)
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        SchedulerDescriptor::new(FORWARD_NAME, vec![self.max_hops.to_string()])
    }

    pub async fn schedule(&self, ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        let mut timings = TimingsStart::arrived_now();
        let name = self.full_name();

        let must_execute_here = request.external && request.hops() >= self.max_hops;
        if must_execute_here {
            return ctx.execute_locally(request, timings, &name).await;
        }

        timings.mark_probing_started();
        let picked = ctx.directory.random_machines(1, true).await;
        timings.mark_probing_ended();

        match picked.ok().and_then(|m| m.into_iter().next()) {
            Some(peer) => {
                debug!(request_id = request.id, %peer, "forwarding to random peer");
                ctx.execute_externally(request, &peer, timings, &name).await
            }
            None => {
                debug!(request_id = request.id, "no peer available, running locally");
                ctx.execute_locally(request, timings, &name).await
            }
        }
    }
}
