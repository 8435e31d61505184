//! Decisions delegated to the external learning service.
//!
//! Actions: `0` reject, `1` run here, `2` probe one random peer and forward
//! if it is strictly less loaded, `k >= 3` forward to the cached peer at
//! index `k - 3`. Only the first hop is learned; jobs from peers always run
//! here.

use std::collections::HashMap;

use tracing::{debug, warn};

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest, TimingsStart, headers};

use super::{LEARNING_NAME, annotate};
use crate::context::SchedulerContext;
use crate::error::{JobFailure, ScheduleResult, SchedulerError};
use crate::job::JobResult;

#[derive(Debug, Clone, Copy)]
pub struct Learning {
    pub task_types: usize,
}

impl Learning {
    pub fn full_name(&self) -> String {
        format!("{LEARNING_NAME}({})", self.task_types)
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        SchedulerDescriptor::new(LEARNING_NAME, vec![self.task_types.to_string()])
    }

    /// `[task_type] ++ running per type ++ queued per type`.
    pub fn state(&self, ctx: &SchedulerContext, task_type: f64) -> Vec<f64> {
        let mut state = Vec::with_capacity(1 + 2 * self.task_types);
        state.push(task_type);
        state.extend(ctx.load.running_by_type(self.task_types).into_iter().map(f64::from));
        state.extend(ctx.load.queued_by_type(self.task_types).into_iter().map(f64::from));
        state
    }

    pub async fn schedule(&self, ctx: &SchedulerContext, mut request: ServiceRequest) -> ScheduleResult {
        let mut timings = TimingsStart::arrived_now();
        let name = self.full_name();

        if request.external {
            return ctx.execute_locally(request, timings, &name).await;
        }

        let task_type = task_type_of(&request);
        request.task_type = task_type as i64;

        let state = self.state(ctx, task_type);
        let total_load = state[1..].iter().sum::<f64>() as u32;

        let act = match &ctx.learner {
            Some(learner) => learner.act(&state).await,
            None => Err(anyhow::anyhow!("learning service not configured")),
        };
        let out = match act {
            Ok(out) => out,
            Err(e) => {
                warn!(request_id = request.id, error = %e, "cannot retrieve action");
                return Err(JobFailure::new(
                    SchedulerError::CannotRetrieveAction(e.to_string()),
                    JobResult::new(name, timings),
                ));
            }
        };
        let response_headers = learning_headers(request.id, &state, out.action, out.eps);
        debug!(request_id = request.id, ?state, action = out.action, eps = out.eps, "learner action");

        let action = out.action as i64;
        let result = match action {
            0 => {
                timings.mark_scheduled();
                Err(JobFailure::new(
                    SchedulerError::JobDeliberatelyRejected,
                    JobResult::new(name, timings),
                ))
            }
            1 => ctx.execute_locally(request, timings, &name).await,
            2 => {
                timings.mark_probing_started();
                let report = ctx.prober.probe_random(1, true).await;
                timings.mark_probing_ended();

                let (target, messages) = match report {
                    Ok(r) => (r.pick_target(total_load), r.messages()),
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
            a => {
                let peer = match usize::try_from(a - 3) {
                    Ok(index) => ctx
                        .directory
                        .machine_at(index, true)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(_) => Err(format!("invalid action {a}")),
                };
                match peer {
                    Ok(peer) => ctx.execute_externally(request, &peer, timings, &name).await,
                    Err(reason) => {
                        warn!(request_id = request.id, action = a, %reason, "cannot retrieve recipient node");
                        Err(JobFailure::new(
                            SchedulerError::CannotRetrieveRecipientNode(reason),
                            JobResult::new(name, timings),
                        ))
                    }
                }
            }
        };

        annotate(result, |r| r.response_headers.extend(response_headers))
    }
}

/// Task type from the request headers, 0 when absent or malformed.
fn task_type_of(request: &ServiceRequest) -> f64 {
    let Some(raw) = request.headers.get(headers::LEARNING_TASK_TYPE) else {
        return 0.0;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            warn!(request_id = request.id, value = %raw, "cannot parse task type");
            0.0
        }
    }
}

/// Headers that let the action be audited and rewarded later.
pub fn learning_headers(request_id: u64, state: &[f64], action: f64, eps: f64) -> HashMap<String, String> {
    let state = state
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",");
    HashMap::from([
        (headers::LEARNING_EID.to_string(), request_id.to_string()),
        (headers::LEARNING_STATE.to_string(), state),
        (headers::LEARNING_ACTION.to_string(), format!("{action:.6}")),
        (headers::LEARNING_EPS.to_string(), format!("{eps:.6}")),
    ])
}
