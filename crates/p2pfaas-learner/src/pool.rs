//! Socket pool: many concurrent act requests over a few connections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tracing::{debug, info, warn};

use p2pfaas_core::{ActOutput, Learner};

use crate::connection::{Connector, LearnerConnection};
use crate::error::{LearnerError, LearnerResult};

/// Pending requests allowed per connection.
const PENDING_PER_CONNECTION: usize = 3;

struct PendingAct {
    state: Vec<f64>,
    done: oneshot::Sender<LearnerResult<ActOutput>>,
}

#[derive(Default)]
struct Slot {
    conn: Option<Box<dyn LearnerConnection>>,
    busy: bool,
}

struct Inner {
    connector: Arc<dyn Connector>,
    slots: Mutex<Vec<Slot>>,
    pending: Mutex<VecDeque<PendingAct>>,
    /// Room left in `pending`.
    free: Semaphore,
    /// One permit per request in `pending`.
    filled: Semaphore,
    /// One permit per connection not serving a request.
    consumers: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Inner {
    fn slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingAct>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a free slot, taking its connection if one is open.
    ///
    /// A consumer permit is held by the caller, so a free slot exists.
    fn book(&self) -> Option<(usize, Option<Box<dyn LearnerConnection>>)> {
        let mut slots = self.slots();
        let index = slots.iter().position(|s| !s.busy)?;
        slots[index].busy = true;
        Some((index, slots[index].conn.take()))
    }

    /// Hand the slot back; its connection is closed instead if the pool
    /// was shut down meanwhile.
    async fn release(&self, index: usize, conn: Option<Box<dyn LearnerConnection>>) {
        let leftover = {
            let mut slots = self.slots();
            slots[index].busy = false;
            if self.closed.load(Ordering::Acquire) {
                conn
            } else {
                slots[index].conn = conn;
                None
            }
        };
        if let Some(mut conn) = leftover {
            conn.close().await;
        }
    }
}

/// Fixed pool of connections to the learning service. Cheap to clone.
///
/// Connections are opened on first use, or all at once by
/// [`SocketPool::connect_all`].
#[derive(Clone)]
pub struct SocketPool {
    inner: Arc<Inner>,
    size: usize,
}

impl SocketPool {
    /// Create the pool and spawn its dispatcher.
    pub fn start(connector: Arc<dyn Connector>, size: usize) -> Self {
        let size = size.max(1);
        let inner = Arc::new(Inner {
            connector,
            slots: Mutex::new((0..size).map(|_| Slot::default()).collect()),
            pending: Mutex::new(VecDeque::new()),
            free: Semaphore::new(PENDING_PER_CONNECTION * size),
            filled: Semaphore::new(0),
            consumers: Arc::new(Semaphore::new(size)),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(dispatch_loop(inner.clone()));
        info!(size, "learner socket pool started");

        Self { inner, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Requests waiting for a connection.
    pub fn pending_len(&self) -> usize {
        self.inner.pending().len()
    }

    /// Requests that can still be queued without waiting.
    pub fn free_capacity(&self) -> usize {
        self.inner.free.available_permits()
    }

    /// Open every idle slot's connection. Returns how many are open.
    pub async fn connect_all(&self) -> usize {
        let mut open = 0;
        for index in 0..self.size {
            let needs_conn = {
                let slots = self.inner.slots();
                !slots[index].busy && slots[index].conn.is_none()
            };
            if !needs_conn {
                open += 1;
                continue;
            }
            match self.inner.connector.connect().await {
                Ok(conn) => {
                    let mut slots = self.inner.slots();
                    if slots[index].conn.is_none() && !slots[index].busy {
                        slots[index].conn = Some(conn);
                    }
                    open += 1;
                }
                Err(e) => warn!(slot = index, error = %e, "cannot open learner connection"),
            }
        }
        info!(open, size = self.size, "learner connections opened");
        open
    }

    /// Ask the learner for an action, waiting for room in the pending queue
    /// and then for the reply.
    pub async fn act(&self, state: &[f64]) -> LearnerResult<ActOutput> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LearnerError::PoolClosed);
        }
        let room = self
            .inner
            .free
            .acquire()
            .await
            .map_err(|_| LearnerError::PoolClosed)?;
        // Given back by the dispatcher once the request leaves the queue.
        room.forget();

        let (done, reply) = oneshot::channel();
        self.inner.pending().push_back(PendingAct {
            state: state.to_vec(),
            done,
        });
        self.inner.filled.add_permits(1);

        reply.await.map_err(|_| LearnerError::PoolClosed)?
    }

    /// Close every idle connection and stop the dispatcher. Waiting
    /// requests fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.free.close();

        let conns: Vec<_> = self
            .inner
            .slots()
            .iter_mut()
            .filter_map(|s| s.conn.take())
            .collect();
        let closing = conns.len();
        for mut conn in conns {
            conn.close().await;
        }

        // Wake the dispatcher so it sees the flag.
        self.inner.filled.add_permits(1);
        info!(closed = closing, "learner socket pool shut down");
    }
}

#[async_trait]
impl Learner for SocketPool {
    async fn act(&self, state: &[f64]) -> anyhow::Result<ActOutput> {
        Ok(SocketPool::act(self, state).await?)
    }
}

async fn dispatch_loop(inner: Arc<Inner>) {
    debug!("learner dispatcher running");

    loop {
        let Ok(consumer) = inner.consumers.clone().acquire_owned().await else {
            break;
        };
        let Ok(filled) = inner.filled.acquire().await else {
            break;
        };
        filled.forget();

        if inner.closed.load(Ordering::Acquire) {
            break;
        }
        let Some(request) = inner.pending().pop_front() else {
            continue;
        };
        inner.free.add_permits(1);

        tokio::spawn(serve(inner.clone(), request, consumer));
    }

    let dropped: Vec<_> = inner.pending().drain(..).collect();
    let n = dropped.len();
    for request in dropped {
        let _ = request.done.send(Err(LearnerError::PoolClosed));
    }
    info!(dropped = n, "learner dispatcher stopped");
}

async fn serve(inner: Arc<Inner>, request: PendingAct, _consumer: OwnedSemaphorePermit) {
    let Some((index, mut conn)) = inner.book() else {
        let _ = request.done.send(Err(LearnerError::PoolClosed));
        return;
    };

    let mut result = attempt(&inner, &mut conn, &request.state).await;
    if let Err(e) = &result {
        warn!(slot = index, error = %e, "learner request failed, reconnecting");
        if let Some(mut old) = conn.take() {
            old.close().await;
        }
        result = attempt(&inner, &mut conn, &request.state).await;
        if let Err(e) = &result {
            warn!(slot = index, error = %e, "learner request failed after reconnect");
            if let Some(mut old) = conn.take() {
                old.close().await;
            }
        }
    }

    inner.release(index, conn).await;
    let _ = request.done.send(result);
}

async fn attempt(
    inner: &Inner,
    conn: &mut Option<Box<dyn LearnerConnection>>,
    state: &[f64],
) -> LearnerResult<ActOutput> {
    if conn.is_none() {
        *conn = Some(inner.connector.connect().await?);
    }
    match conn.as_mut() {
        Some(c) => c.act(state).await,
        None => Err(LearnerError::Disconnected),
    }
}
