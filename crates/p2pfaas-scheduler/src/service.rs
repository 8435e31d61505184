//! Scheduler service: owns the active policy and the fixed override policies.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use p2pfaas_core::{SchedulerDescriptor, ServiceRequest};

use crate::context::SchedulerContext;
use crate::error::{ScheduleResult, SchedulerError, SchedulerResult};
use crate::policy::{Forward, NoScheduling, Policy, Reject};

/// Entry point used by the HTTP layer.
///
/// The active policy is swapped only while no job is running, so a
/// scheduled job never outlives the policy instance that handled it.
pub struct SchedulerService {
    ctx: SchedulerContext,
    current: RwLock<Arc<Policy>>,
    bypass: Policy,
    forward: Policy,
    reject: Policy,
}

impl SchedulerService {
    pub fn new(ctx: SchedulerContext, policy: Policy) -> Self {
        info!(scheduler = %policy.full_name(), "scheduler initialised");
        Self {
            ctx,
            current: RwLock::new(Arc::new(policy)),
            bypass: Policy::NoScheduling(NoScheduling { loss: true }),
            forward: Policy::Forward(Forward { max_hops: 1 }),
            reject: Policy::Reject(Reject),
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    fn current(&self) -> Arc<Policy> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Schedule with the active policy.
    pub async fn schedule(&self, request: ServiceRequest) -> ScheduleResult {
        let policy = self.current();
        policy.schedule(&self.ctx, request).await
    }

    /// Always run locally, dropping the job if no slot is free.
    pub async fn schedule_bypass(&self, request: ServiceRequest) -> ScheduleResult {
        self.bypass.schedule(&self.ctx, request).await
    }

    /// Always forward to one random peer.
    pub async fn schedule_forward(&self, request: ServiceRequest) -> ScheduleResult {
        self.forward.schedule(&self.ctx, request).await
    }

    pub async fn schedule_reject(&self, request: ServiceRequest) -> ScheduleResult {
        self.reject.schedule(&self.ctx, request).await
    }

    pub fn full_name(&self) -> String {
        self.current().full_name()
    }

    pub fn descriptor(&self) -> SchedulerDescriptor {
        self.current().descriptor()
    }

    /// Replace the active policy.
    ///
    /// Fails with `CannotChangeScheduler` while any job is running and with
    /// `BadSchedulerParameters` for an invalid descriptor; the active policy
    /// is left unchanged in both cases.
    pub fn set_scheduler(&self, descriptor: &SchedulerDescriptor) -> SchedulerResult<()> {
        debug!(?descriptor, "changing scheduler");
        let running = self.ctx.load.total_running();
        if running > 0 {
            return Err(SchedulerError::CannotChangeScheduler { running });
        }

        let policy = Policy::from_descriptor(descriptor)?;
        let name = policy.full_name();
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(policy);
        info!(scheduler = %name, "scheduler changed");
        Ok(())
    }
}
