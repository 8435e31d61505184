//! Centralised round robin through a master node.

use tracing::debug;

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest, TimingsStart};

use super::ROUND_ROBIN_MASTER_NAME;
use crate::context::SchedulerContext;
use crate::error::{JobFailure, ScheduleResult, SchedulerError};
use crate::job::JobResult;
use crate::round_robin::RoundRobinCursor;

/// Slaves send every client job to the master and run what the master
/// sends them; the master spreads jobs over all known peers in turn and
/// never runs one itself.
#[derive(Debug)]
pub struct RoundRobinWithMaster {
    pub master: bool,
    pub master_ip: String,
    pub loss: bool,
    cursor: RoundRobinCursor,
}

impl RoundRobinWithMaster {
    pub fn new(master: bool, master_ip: impl Into<String>, loss: bool) -> Self {
        Self {
            master,
            master_ip: master_ip.into(),
            loss,
            cursor: RoundRobinCursor::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!(
            "{ROUND_ROBIN_MASTER_NAME}({}, {}, {})",
            self.master, self.master_ip, self.loss
        )
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        SchedulerDescriptor::new(
            ROUND_ROBIN_MASTER_NAME,
            vec![
                self.master.to_string(),
                self.master_ip.clone(),
                self.loss.to_string(),
            ],
        )
    }

    pub async fn schedule(&self, ctx: &SchedulerContext, request: ServiceRequest) -> ScheduleResult {
        let timings = TimingsStart::arrived_now();
        let name = self.full_name();

        if !self.master {
            if request.external {
                return ctx.execute_locally(request, timings, &name).await;
            }
            return ctx
                .execute_externally(request, &self.master_ip, timings, &name)
                .await;
        }

        let fail = |reason: String| -> ScheduleResult {
            Err(JobFailure::new(
                SchedulerError::JobCannotBeScheduled(reason),
                JobResult::new(name.clone(), timings),
            ))
        };

        if !request.external {
            return fail("master only accepts jobs from peers".into());
        }

        let machines = match ctx.directory.machines(true).await {
            Ok(m) => m,
            Err(e) => return fail(e.to_string()),
        };
        let Some(index) = self.cursor.next(machines.len()) else {
            return fail("no machine known".into());
        };
        let peer = &machines[index];
        debug!(request_id = request.id, %peer, index, "round robin pick");

        ctx.execute_externally(request, peer, timings, &name).await
    }
}
