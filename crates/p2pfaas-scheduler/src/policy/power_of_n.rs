//! Power-of-N choices, with an optional fixed decision delay.

use std::time::Duration;

use tracing::debug;

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest, TimingsStart};

use super::{POWER_OF_N_NAME, POWER_OF_N_TAU_NAME, annotate};
use crate::context::SchedulerContext;
use crate::error::ScheduleResult;

/// Probe `f` random peers once local load reaches `t`, and forward to a
/// peer that is less loaded than this node.
///
/// With `tau` set, a probed decision is not enacted before `tau` has
/// elapsed since the job arrived, so local and probed jobs take the same
/// time to schedule.
#[derive(Debug, Clone, Copy)]
pub struct PowerOfN {
    pub f: u32,
    pub t: u32,
    pub loss: bool,
    pub max_hops: u32,
    pub tau: Option<Duration>,
}

impl PowerOfN {
    pub fn full_name(&self) -> String {
        match self.tau {
            None => format!(
                "{POWER_OF_N_NAME}({}, {}, {}, {})",
                self.f, self.t, self.loss, self.max_hops
            ),
            Some(tau) => format!(
                "{POWER_OF_N_TAU_NAME}({}, {}, {}, {}, {}ms)",
                self.f,
                self.t,
                self.loss,
                self.max_hops,
                tau.as_millis()
            ),
        }
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        let mut parameters = vec![
            self.f.to_string(),
            self.t.to_string(),
            self.loss.to_string(),
            self.max_hops.to_string(),
        ];
        let name = match self.tau {
            None => POWER_OF_N_NAME,
            Some(tau) => {
                parameters.push(format!("{}ms", tau.as_millis()));
                POWER_OF_N_TAU_NAME
            }
        };
        SchedulerDescriptor::new(name, parameters)
    }

    pub async fn schedule(&self, ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        let mut timings = TimingsStart::arrived_now();
        let name = self.full_name();

        let current_load = ctx.current_load();
        let balancing_hit = current_load >= self.t;
        let must_execute_here = request.external && request.hops() >= self.max_hops;
        debug!(
            request_id = request.id,
            current_load,
            balancing_hit,
            must_execute_here,
            "power-of-n decision"
        );

        if !balancing_hit || must_execute_here {
            return ctx.execute_locally(request, timings, &name).await;
        }

        timings.mark_probing_started();
        let report = ctx.prober.probe_random(self.f as usize, true).await;
        timings.mark_probing_ended();

        if let (Some(tau), Some(arrived)) = (self.tau, timings.arrived_at) {
            let remaining = tau.saturating_sub(arrived.elapsed());
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
        }

        let (target, messages) = match report {
            Ok(report) => (report.pick_target(current_load), report.messages()),
            Err(e) => {
                debug!(request_id = request.id, error = %e, "cannot retrieve peers");
                (None, 0)
            }
        };

        let result = match target {
            Some(peer) => ctx.execute_externally(request, &peer, timings, &name).await,
            None => ctx.execute_locally(request, timings, &name).await,
        };
        annotate(result, |r| r.probing_messages = messages)
    }
}
