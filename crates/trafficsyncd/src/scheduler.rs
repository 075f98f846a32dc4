//! Work queue that dispatches reconciles.
//!
//! Names are deduplicated while queued. A name is never handed to two workers
//! at once: a trigger that arrives while its reconcile is running marks the
//! name dirty, and it is queued again as soon as the running reconcile
//! finishes. Worker slots are bounded by a semaphore.
//!
//! After a reconcile:
//!
//! - `Done` clears the name's backoff
//! - `RequeueAfter(d)` clears the backoff and queues the name after `d`
//! - an error queues the name after the next exponential backoff delay
//!
//! Each name has at most one pending delayed requeue. A new delay that ends
//! later than the pending one is dropped; one that ends sooner replaces it.

use crate::backoff::Backoff;
use crate::config_file::SchedulerConfig;
use crate::controller::{Reconcile, ReconcileOutcome};
use crate::types::ResourceName;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// A change reported by the resource framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Created,
    /// Metadata or spec changed. Only spec changes bump the generation.
    Updated {
        old_generation: i64,
        new_generation: i64,
    },
    Deleted,
}

impl ResourceEvent {
    /// Returns true if the event should trigger a reconcile.
    ///
    /// Status and finalizer writes do not change the generation, so the
    /// controller's own updates never retrigger it.
    pub fn should_enqueue(&self) -> bool {
        match self {
            ResourceEvent::Created | ResourceEvent::Deleted => true,
            ResourceEvent::Updated {
                old_generation,
                new_generation,
            } => old_generation != new_generation,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queued: HashSet<ResourceName>,
    in_flight: HashSet<ResourceName>,
    dirty: HashSet<ResourceName>,
    delayed: HashMap<ResourceName, Instant>,
}

struct Shared {
    state: Mutex<QueueState>,
    backoff: Mutex<Backoff<ResourceName>>,
    tx: mpsc::UnboundedSender<ResourceName>,
    cancel: CancellationToken,
}

impl Shared {
    fn enqueue(&self, name: ResourceName) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut state = self.state.lock();
        if state.in_flight.contains(&name) {
            state.dirty.insert(name);
            return;
        }
        if state.queued.insert(name.clone()) && self.tx.send(name).is_err() {
            debug!("Scheduler stopped, dropping trigger");
        }
    }
}

/// Cloneable handle for feeding names into a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl SchedulerHandle {
    /// Queues a reconcile for `name`.
    pub fn enqueue(&self, name: ResourceName) {
        self.shared.enqueue(name);
    }

    /// Queues a reconcile for `name` after `delay`, unless one is already
    /// pending that fires no later.
    pub fn enqueue_after(&self, name: ResourceName, delay: Duration) {
        if delay.is_zero() {
            self.shared.enqueue(name);
            return;
        }
        if self.shared.cancel.is_cancelled() {
            return;
        }

        let deadline = Instant::now() + delay;
        {
            let mut state = self.shared.state.lock();
            if state.delayed.get(&name).is_some_and(|pending| *pending <= deadline) {
                debug!(resource = %name, "Earlier requeue already pending");
                return;
            }
            state.delayed.insert(name.clone(), deadline);
        }

        let shared = self.shared.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    // Superseded sleepers find a different deadline and do nothing
                    let current = {
                        let mut state = shared.state.lock();
                        if state.delayed.get(&name) == Some(&deadline) {
                            state.delayed.remove(&name);
                            true
                        } else {
                            false
                        }
                    };
                    if current {
                        shared.enqueue(name);
                    }
                }
            }
        });
    }

    /// Queues a reconcile if the event calls for one.
    pub fn handle_event(&self, name: ResourceName, event: ResourceEvent) {
        if event.should_enqueue() {
            self.enqueue(name);
        } else {
            debug!(resource = %name, ?event, "Ignoring event");
        }
    }

    /// Stops dispatching. Running reconciles finish; pending delays are dropped.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    /// Number of names waiting to be dispatched.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queued.len()
    }

    /// Number of names with a delayed requeue pending.
    pub fn delayed(&self) -> usize {
        self.shared.state.lock().delayed.len()
    }

    /// Number of reconciles currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Consecutive failures recorded for `name`.
    pub fn failures(&self, name: &ResourceName) -> u32 {
        self.shared.backoff.lock().failures(name)
    }
}

/// Bounded-concurrency reconcile dispatcher.
pub struct SyncScheduler {
    reconciler: Arc<dyn Reconcile>,
    semaphore: Arc<Semaphore>,
    rx: mpsc::UnboundedReceiver<ResourceName>,
    handle: SchedulerHandle,
}

impl SyncScheduler {
    /// Creates a scheduler for `reconciler` with the configured limits.
    pub fn new(reconciler: Arc<dyn Reconcile>, config: &SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            backoff: Mutex::new(Backoff::new(config.base_backoff(), config.max_backoff())),
            tx,
            cancel: CancellationToken::new(),
        });
        Self {
            reconciler,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_reconciles.max(1))),
            rx,
            handle: SchedulerHandle {
                shared,
                tracker: TaskTracker::new(),
            },
        }
    }

    /// Returns a handle for enqueueing work.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Dispatches queued names until shut down, then waits for running
    /// reconciles to finish.
    pub async fn run(mut self) {
        let cancel = self.handle.shared.cancel.clone();
        info!(
            max_concurrent = self.semaphore.available_permits(),
            "Scheduler started"
        );

        loop {
            let name = tokio::select! {
                _ = cancel.cancelled() => break,
                name = self.rx.recv() => match name {
                    Some(name) => name,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            {
                let mut state = self.handle.shared.state.lock();
                state.queued.remove(&name);
                state.in_flight.insert(name.clone());
            }

            let reconciler = self.reconciler.clone();
            let handle = self.handle.clone();
            self.handle.tracker.spawn(async move {
                let result = reconciler.reconcile(&name).await;
                drop(permit);
                handle.complete(name, result);
            });
        }

        self.handle.tracker.close();
        self.handle.tracker.wait().await;
        info!("Scheduler stopped");
    }
}

impl SchedulerHandle {
    fn complete(&self, name: ResourceName, result: crate::error::Result<ReconcileOutcome>) {
        let retry_after = match result {
            Ok(ReconcileOutcome::Done) => {
                self.shared.backoff.lock().reset(&name);
                None
            }
            Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                self.shared.backoff.lock().reset(&name);
                Some(delay)
            }
            Err(e) => {
                let delay = self.shared.backoff.lock().next_delay(&name);
                if e.is_retryable() {
                    warn!(resource = %name, error = %e, retry_in = ?delay, "Reconcile failed, retrying");
                } else {
                    error!(resource = %name, error = %e, retry_in = ?delay, "Reconcile failed");
                }
                Some(delay)
            }
        };

        let rerun = {
            let mut state = self.shared.state.lock();
            state.in_flight.remove(&name);
            state.dirty.remove(&name)
        };

        if rerun {
            self.shared.enqueue(name);
        } else if let Some(delay) = retry_after {
            self.enqueue_after(name, delay);
        }
    }
}
