//! Sync cycle abstraction and per-cycle reporting.
//!
//! A cycle moves counters for one tag of one resource a single step down the
//! pipeline. Cycles never touch resource metadata or status; gating and
//! finalization belong to the controller.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use traffic_accounting::{DeltaKind, Direction, EndpointId, Tag};

/// One resource kind's synchronization step.
#[async_trait]
pub trait SyncCycle: Send + Sync + 'static {
    /// Spec of the resources this cycle serves.
    type Spec: Send + Sync + 'static;

    /// Resource kind for logging.
    fn kind(&self) -> &'static str;

    /// Protection finalizer held while the resource is tracked.
    fn finalizer(&self) -> &'static str;

    /// How often each tag is synchronized.
    fn sync_period(&self, spec: &Self::Spec) -> Duration;

    /// Tags to synchronize, in order.
    fn tags(&self, spec: &Self::Spec) -> Result<Vec<Tag>>;

    /// Runs one cycle for one tag.
    ///
    /// On error nothing was written for the failing `(endpoint, tag)`.
    async fn sync_tag(&self, spec: &Self::Spec, tag: &Tag) -> Result<CycleReport>;
}

/// What happened to one mark during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    pub endpoint: EndpointId,
    pub direction: Direction,
    pub kind: DeltaKind,
    /// Amount added to the total (0 unless advanced).
    pub delta: u64,
    /// Upstream value the delta was computed from.
    pub raw: u64,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tag: Tag,
    pub outcomes: Vec<SampleOutcome>,
}

impl CycleReport {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: SampleOutcome) {
        self.outcomes.push(outcome);
    }

    /// Sum of all applied deltas.
    pub fn total_delta(&self) -> u64 {
        self.outcomes
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.delta))
    }

    /// Number of samples held back as stale.
    pub fn stale_count(&self) -> usize {
        self.count(DeltaKind::Stale)
    }

    /// Number of samples that advanced a mark.
    pub fn advanced_count(&self) -> usize {
        self.count(DeltaKind::Advanced)
    }

    fn count(&self, kind: DeltaKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }
}
