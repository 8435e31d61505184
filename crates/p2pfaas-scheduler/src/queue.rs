//! Admission queue: bounded FIFO in front of the FaaS backend.
//!
//! Two limits apply independently:
//! - `queue_length_max` caps how many jobs may wait to start
//! - `running_max` caps how many jobs run on the backend at once
//!
//! A single dispatcher task waits for a free execution slot, then for a
//! queued job, pops the oldest and runs it on its own task. The slot is
//! released when the backend call returns.
//!
//! ```text
//! enqueue ──► pending (FIFO, ≤ queue_length_max)
//!                │  ready permits
//!                ▼
//!            dispatcher ──(execution slot)──► spawn execute ──► backend
//!                                                   │
//!                                   completion ◄────┘
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot, watch};
use tracing::{debug, info, warn};

use p2pfaas_core::{ApiResponse, DynamicConfig, FaasBackend, ServiceRequest};

use crate::load_table::LoadTable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full ({max} jobs waiting)")]
    Full { max: usize },

    #[error("queue stopped before the job completed")]
    Closed,
}

/// Limits of an admission queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub running_max: usize,
    pub queue_length_max: usize,
    pub queue_enabled: bool,
}

impl From<DynamicConfig> for QueueConfig {
    fn from(c: DynamicConfig) -> Self {
        Self {
            running_max: c.parallel_running_functions_max,
            queue_length_max: c.queue_length_max,
            queue_enabled: c.queue_enabled,
        }
    }
}

/// What the executor hands back to the enqueuing caller.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub response: Option<ApiResponse>,
    /// The backend call failed.
    pub error_execution: bool,
    /// Seconds spent in the backend call.
    pub execution_time: f64,
    /// Seconds spent waiting in the queue.
    pub queue_time: f64,
}

struct QueuedJob {
    request: ServiceRequest,
    enqueued_at: Instant,
    done: oneshot::Sender<CompletedJob>,
}

struct Inner {
    pending: Mutex<VecDeque<QueuedJob>>,
    /// One permit per job in `pending`.
    ready: Semaphore,
    /// Execution slots.
    slots: Arc<Semaphore>,
    running_max: usize,
    length_max: AtomicUsize,
    enabled: AtomicBool,
    closed: AtomicBool,
    backend: Arc<dyn FaasBackend>,
    load: Arc<LoadTable>,
}

impl Inner {
    fn pending(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedJob>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a running admission queue. Cheap to clone.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

impl AdmissionQueue {
    /// Create the queue and spawn its dispatcher.
    ///
    /// The dispatcher stops when `shutdown` flips to `true` or its sender
    /// is dropped; jobs still waiting then fail with `QueueError::Closed`.
    pub fn start(
        config: QueueConfig,
        backend: Arc<dyn FaasBackend>,
        load: Arc<LoadTable>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let inner = Arc::new(Inner {
            pending: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            slots: Arc::new(Semaphore::new(config.running_max)),
            running_max: config.running_max,
            length_max: AtomicUsize::new(config.queue_length_max),
            enabled: AtomicBool::new(config.queue_enabled),
            closed: AtomicBool::new(false),
            backend,
            load,
        });

        tokio::spawn(dispatch_loop(inner.clone(), shutdown));
        info!(
            running_max = config.running_max,
            queue_length_max = config.queue_length_max,
            "admission queue started"
        );

        Self { inner }
    }

    /// Queue a job and wait for it to finish.
    ///
    /// Fails immediately with `QueueError::Full` when `queue_length_max`
    /// jobs are already waiting.
    pub async fn enqueue(&self, request: ServiceRequest) -> Result<CompletedJob, QueueError> {
        let (done, completed) = oneshot::channel();
        {
            // `closed` is flipped under this lock before the final drain.
            let mut pending = self.inner.pending();
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }
            let max = self.inner.length_max.load(Ordering::Relaxed);
            if pending.len() >= max {
                debug!(request_id = request.id, max, "queue full, job discarded");
                return Err(QueueError::Full { max });
            }
            self.inner.load.set_queued(request.task_type);
            pending.push_back(QueuedJob {
                request,
                enqueued_at: Instant::now(),
                done,
            });
        }
        self.inner.ready.add_permits(1);

        completed.await.map_err(|_| QueueError::Closed)
    }

    /// Jobs currently waiting to start.
    pub fn len(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execution slots not taken by a running job.
    pub fn free_slots(&self) -> usize {
        self.inner
            .running_max
            .saturating_sub(self.inner.load.total_running() as usize)
    }

    pub fn running_max(&self) -> usize {
        self.inner.running_max
    }

    pub fn length_max(&self) -> usize {
        self.inner.length_max.load(Ordering::Relaxed)
    }

    pub fn set_length_max(&self, max: usize) {
        self.inner.length_max.store(max, Ordering::Relaxed);
    }

    /// When disabled, local execution fails fast instead of waiting for a slot.
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }
}

async fn dispatch_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    debug!("admission queue dispatcher running");

    loop {
        let slot = tokio::select! {
            permit = inner.slots.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        let ready = tokio::select! {
            permit = inner.ready.acquire() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };
        ready.forget();

        let Some(job) = inner.pending().pop_front() else {
            continue;
        };

        let request = &job.request;
        inner.load.set_dequeued(request.task_type);
        inner
            .load
            .set_function_running(&request.function_name, request.task_type);
        debug!(
            request_id = request.id,
            function = %request.function_name,
            instances = inner.load.running_instances(&request.function_name),
            "job dispatched"
        );

        tokio::spawn(execute(inner.clone(), job, slot));
    }

    let dropped = {
        let mut pending = inner.pending();
        inner.closed.store(true, Ordering::Release);
        let n = pending.len();
        for job in pending.drain(..) {
            inner.load.set_dequeued(job.request.task_type);
        }
        n
    };
    info!(dropped, "admission queue dispatcher stopped");
}

async fn execute(inner: Arc<Inner>, job: QueuedJob, slot: OwnedSemaphorePermit) {
    let QueuedJob {
        request,
        enqueued_at,
        done,
    } = job;
    let queue_time = enqueued_at.elapsed().as_secs_f64();

    let started = Instant::now();
    let result = inner
        .backend
        .execute(&request.function_name, &request.payload, &request.content_type)
        .await;
    let execution_time = started.elapsed().as_secs_f64();

    inner
        .load
        .set_function_stopped(&request.function_name, request.task_type);
    drop(slot);

    let completed = match result {
        Ok(response) => CompletedJob {
            response: Some(response),
            error_execution: false,
            execution_time,
            queue_time,
        },
        Err(e) => {
            warn!(
                request_id = request.id,
                function = %request.function_name,
                error = %e,
                "backend execution failed"
            );
            CompletedJob {
                response: None,
                error_execution: true,
                execution_time,
                queue_time,
            }
        }
    };

    if done.send(completed).is_err() {
        debug!(request_id = request.id, "job caller went away before completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    /// Backend that blocks every call on a gate and records call order.
    struct GatedBackend {
        gate: Semaphore,
        running: AtomicUsize,
        max_seen: AtomicUsize,
        order: Mutex<Vec<String>>,
        fail: bool,
    }

    impl GatedBackend {
        fn new(fail: bool) -> Self {
            Self {
                gate: Semaphore::new(0),
                running: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl FaasBackend for GatedBackend {
        async fn execute(
            &self,
            function: &str,
            payload: &[u8],
            _content_type: &str,
        ) -> anyhow::Result<ApiResponse> {
            self.order.lock().unwrap().push(function.to_string());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);

            let permit = self.gate.acquire().await?;
            permit.forget();

            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("backend down");
            }
            Ok(ApiResponse {
                headers: Default::default(),
                body: payload.to_vec(),
                status_code: 200,
            })
        }
    }

    fn request(name: &str) -> ServiceRequest {
        ServiceRequest {
            function_name: name.to_string(),
            payload: name.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    fn start(
        backend: Arc<GatedBackend>,
        running_max: usize,
        queue_length_max: usize,
    ) -> (AdmissionQueue, Arc<LoadTable>, watch::Sender<bool>) {
        let load = Arc::new(LoadTable::new());
        let (tx, rx) = watch::channel(false);
        let queue = AdmissionQueue::start(
            QueueConfig {
                running_max,
                queue_length_max,
                queue_enabled: true,
            },
            backend,
            load.clone(),
            rx,
        );
        (queue, load, tx)
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn executes_job_and_reports_timings() {
        let backend = Arc::new(GatedBackend::new(false));
        backend.gate.add_permits(10);
        let (queue, load, _tx) = start(backend, 2, 2);

        let done = queue.enqueue(request("echo")).await.unwrap();
        let response = done.response.unwrap();
        assert_eq!(response.body, b"echo");
        assert!(!done.error_execution);
        assert!(done.execution_time >= 0.0);
        assert_eq!(load.total_running(), 0);
        assert_eq!(queue.free_slots(), 2);
    }

    #[tokio::test]
    async fn idle_queue_reports_every_slot_free() {
        let backend = Arc::new(GatedBackend::new(false));
        let (queue, _load, _tx) = start(backend, 1, 1);

        // Let the dispatcher park on an empty queue holding its slot permit.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.free_slots(), 1);
    }

    #[tokio::test]
    async fn slot_is_free_once_caller_sees_completion() {
        let backend = Arc::new(GatedBackend::new(false));
        backend.gate.add_permits(100);
        let (queue, load, _tx) = start(backend, 1, 1);

        for i in 0..50 {
            queue.enqueue(request(&format!("seq-{i}"))).await.unwrap();
            assert_eq!(load.total_running(), 0);
            assert_eq!(queue.free_slots(), 1);
        }
    }

    #[tokio::test]
    async fn admission_bounds_hold_and_overflow_is_full() {
        let backend = Arc::new(GatedBackend::new(false));
        let (queue, load, _tx) = start(backend.clone(), 2, 2);

        let mut handles = Vec::new();
        for i in 0..2 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move { q.enqueue(request(&format!("r{i}"))).await }));
        }
        wait_until(|| load.total_running() == 2).await;
        assert_eq!(queue.free_slots(), 0);

        for i in 2..4 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move { q.enqueue(request(&format!("r{i}"))).await }));
        }
        wait_until(|| queue.len() == 2).await;
        assert_eq!(load.queued_by_type(1), vec![2]);

        let overflow = queue.enqueue(request("overflow")).await;
        assert_eq!(overflow.unwrap_err(), QueueError::Full { max: 2 });

        backend.gate.add_permits(10);
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        assert!(backend.max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(load.total_running(), 0);
        assert_eq!(queue.free_slots(), 2);
    }

    #[tokio::test]
    async fn dispatch_order_matches_enqueue_order() {
        let backend = Arc::new(GatedBackend::new(false));
        let (queue, load, _tx) = start(backend.clone(), 1, 8);

        let mut handles = Vec::new();
        for i in 0..5 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move { q.enqueue(request(&format!("job-{i}"))).await }));
            if i == 0 {
                wait_until(|| load.total_running() == 1).await;
            } else {
                wait_until(|| queue.len() == i).await;
            }
        }

        backend.gate.add_permits(10);
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let order = backend.order.lock().unwrap().clone();
        assert_eq!(order, vec!["job-0", "job-1", "job-2", "job-3", "job-4"]);
    }

    #[tokio::test]
    async fn backend_failure_sets_error_flag() {
        let backend = Arc::new(GatedBackend::new(true));
        backend.gate.add_permits(1);
        let (queue, load, _tx) = start(backend, 1, 1);

        let done = queue.enqueue(request("broken")).await.unwrap();
        assert!(done.error_execution);
        assert!(done.response.is_none());
        assert_eq!(load.total_running(), 0);
        assert_eq!(load.running_by_type(1), vec![0]);
    }

    #[tokio::test]
    async fn shutdown_fails_waiting_jobs() {
        let backend = Arc::new(GatedBackend::new(false));
        let (queue, load, tx) = start(backend.clone(), 1, 4);

        let q = queue.clone();
        let running = tokio::spawn(async move { q.enqueue(request("running")).await });
        wait_until(|| load.total_running() == 1).await;

        let q = queue.clone();
        let waiting = tokio::spawn(async move { q.enqueue(request("waiting")).await });
        wait_until(|| queue.len() == 1).await;

        tx.send(true).unwrap();
        assert_eq!(waiting.await.unwrap().unwrap_err(), QueueError::Closed);

        // Already dispatched work still completes.
        backend.gate.add_permits(1);
        assert!(running.await.unwrap().is_ok());

        assert_eq!(
            queue.enqueue(request("late")).await.unwrap_err(),
            QueueError::Closed
        );
        assert_eq!(load.queued_by_type(1), vec![0]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn enqueue_racing_shutdown_never_strands_a_job() {
        for _ in 0..20 {
            let backend = Arc::new(GatedBackend::new(false));
            let (queue, load, tx) = start(backend.clone(), 1, 64);

            let q = queue.clone();
            let running = tokio::spawn(async move { q.enqueue(request("running")).await });
            wait_until(|| load.total_running() == 1).await;

            let mut callers = Vec::new();
            for i in 0..16 {
                let q = queue.clone();
                callers.push(tokio::spawn(async move { q.enqueue(request(&format!("c{i}"))).await }));
            }
            tx.send(true).unwrap();

            for c in callers {
                let outcome = tokio::time::timeout(Duration::from_secs(5), c)
                    .await
                    .expect("enqueue left waiting after shutdown")
                    .unwrap();
                assert_eq!(outcome.unwrap_err(), QueueError::Closed);
            }
            backend.gate.add_permits(1);
            assert!(running.await.unwrap().is_ok());
            assert_eq!(load.queued_by_type(1), vec![0]);
        }
    }

    #[tokio::test]
    async fn length_limit_is_adjustable() {
        let backend = Arc::new(GatedBackend::new(false));
        let (queue, _load, _tx) = start(backend, 1, 4);
        queue.set_length_max(0);
        assert_eq!(
            queue.enqueue(request("x")).await.unwrap_err(),
            QueueError::Full { max: 0 }
        );
        assert_eq!(queue.length_max(), 0);
    }
}
