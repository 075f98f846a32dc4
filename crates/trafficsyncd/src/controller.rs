//! Sync lifecycle controller.
//!
//! Drives one resource kind through its lifecycle:
//!
//! ```text
//!            deletion requested           forced cycles ok,
//!  Active ───────────────────▶ Pending ──finalizer removed──▶ Finalized
//!    │ ▲                       Finalization
//!    └─┘ due tags synced,            │ ▲
//!        cursor advanced             └─┘ cycle failed, finalizer kept
//! ```
//!
//! Reconciles for the same resource are serialized by an in-flight guard,
//! and the resource is fetched only after the guard is held. A second
//! finalization that queued behind the first therefore sees the finalizer
//! already gone and does nothing.

use crate::cycle::SyncCycle;
use crate::error::Result;
use crate::lifecycle::{LifecycleState, ResourceClient};
use crate::types::{Resource, ResourceName};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Shortest requeue delay for an active resource.
pub const MIN_REQUEUE: Duration = Duration::from_secs(1);

/// What the scheduler should do after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further until the next external event.
    Done,
    /// Reconcile again after the delay.
    RequeueAfter(Duration),
}

/// Something the scheduler can reconcile by name.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(&self, name: &ResourceName) -> Result<ReconcileOutcome>;
}

/// Lifecycle controller for the resources served by cycle `C`.
pub struct LifecycleController<C: SyncCycle> {
    cycle: C,
    client: Arc<dyn ResourceClient<C::Spec>>,
    guards: DashMap<ResourceName, Arc<Mutex<()>>>,
}

impl<C: SyncCycle> LifecycleController<C> {
    pub fn new(cycle: C, client: Arc<dyn ResourceClient<C::Spec>>) -> Self {
        Self {
            cycle,
            client,
            guards: DashMap::new(),
        }
    }

    /// Returns the cycle this controller drives.
    pub fn cycle(&self) -> &C {
        &self.cycle
    }

    /// Number of resources with a reconcile running or waiting.
    pub fn tracked(&self) -> usize {
        self.guards.len()
    }

    fn guard(&self, name: &ResourceName) -> Arc<Mutex<()>> {
        self.guards.entry(name.clone()).or_default().clone()
    }

    /// Drops the guard unless another reconcile holds or waits on it.
    fn release_guard(&self, name: &ResourceName) {
        // One reference in the map, one held by the caller
        self.guards
            .remove_if(name, |_, guard| Arc::strong_count(guard) <= 2);
    }

    /// Reconciles one resource. The caller holds its in-flight guard.
    async fn reconcile_locked(&self, name: &ResourceName) -> Result<ReconcileOutcome> {
        let Some(resource) = self.client.get(name).await? else {
            debug!("Resource not found, ignoring");
            return Ok(ReconcileOutcome::Done);
        };

        let state = LifecycleState::of(&resource.meta, self.cycle.finalizer());
        let result = match state {
            LifecycleState::Active => self.sync_active(resource).await,
            LifecycleState::PendingFinalization => self.finalize(resource).await,
            LifecycleState::Finalized => {
                debug!("Already finalized");
                Ok(ReconcileOutcome::Done)
            }
        };

        if let Err(e) = &result {
            error!(state = %state, error = %e, "Reconcile failed");
        }
        result
    }

    /// Runs forced cycles for every tag, then releases the resource.
    async fn finalize(&self, resource: Resource<C::Spec>) -> Result<ReconcileOutcome> {
        let name = resource.name();
        let tags = self.cycle.tags(&resource.spec)?;
        info!(resource = %name, kind = self.cycle.kind(), tags = tags.len(), "Finalizing");

        for tag in &tags {
            let report = self.cycle.sync_tag(&resource.spec, tag).await?;
            debug!(
                tag = %tag,
                delta = report.total_delta(),
                stale = report.stale_count(),
                "Final cycle complete"
            );
        }

        let finalizer = self.cycle.finalizer();
        let remaining: Vec<String> = resource
            .meta
            .finalizers
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect();
        self.client.set_finalizers(&name, remaining).await?;

        info!(resource = %name, kind = self.cycle.kind(), "Finalizer removed");
        Ok(ReconcileOutcome::Done)
    }

    /// Ensures the finalizer, then syncs every tag whose period has elapsed.
    async fn sync_active(&self, resource: Resource<C::Spec>) -> Result<ReconcileOutcome> {
        let name = resource.name();
        let finalizer = self.cycle.finalizer();

        if !resource.meta.has_finalizer(finalizer) {
            let mut finalizers = resource.meta.finalizers.clone();
            finalizers.push(finalizer.to_string());
            self.client.set_finalizers(&name, finalizers).await?;
            debug!(resource = %name, finalizer, "Added finalizer");
        }

        let period = self.cycle.sync_period(&resource.spec);
        let tags = self.cycle.tags(&resource.spec)?;
        let now = Utc::now();
        let mut status = resource.status.clone();
        let mut synced = 0usize;
        let mut failure = None;

        for tag in tags {
            if !status.is_due(&tag, now, period) {
                debug!(resource = %name, tag = %tag, "Not due, skipping");
                continue;
            }
            match self.cycle.sync_tag(&resource.spec, &tag).await {
                Ok(report) => {
                    debug!(
                        resource = %name,
                        tag = %tag,
                        delta = report.total_delta(),
                        stale = report.stale_count(),
                        "Cycle complete"
                    );
                    status.mark_synced(tag, Utc::now());
                    synced += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Keep progress for tags that did sync before a failure
        if synced > 0 {
            self.client.update_status(&name, status).await?;
        }
        if let Some(e) = failure {
            return Err(e);
        }

        Ok(ReconcileOutcome::RequeueAfter(period.max(MIN_REQUEUE)))
    }
}

#[async_trait]
impl<C: SyncCycle> Reconcile for LifecycleController<C> {
    #[instrument(skip(self, name), fields(kind = self.cycle.kind(), resource = %name))]
    async fn reconcile(&self, name: &ResourceName) -> Result<ReconcileOutcome> {
        let guard = self.guard(name);
        let result = {
            let _in_flight = guard.lock().await;
            self.reconcile_locked(name).await
        };
        self.release_guard(name);
        result
    }
}
