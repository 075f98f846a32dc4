//! Resource lifecycle: framework access and per-resource state.

use crate::cursor::SyncStatus;
use crate::error::Result;
use crate::types::{ObjectMeta, Resource, ResourceName};
use async_trait::async_trait;
use std::fmt;

/// Protection finalizer on traffic sync requests.
pub const TSR_FINALIZER: &str = "networking.sealos.io/tsr-protection";

/// Protection finalizer on port feed requests.
pub const PFR_FINALIZER: &str = "networking.sealos.io/pfr-protection";

/// Access to stored resources of spec `S`.
///
/// Implemented by the embedding process over its resource framework.
/// Failures should be reported as `SyncError::Lifecycle`.
#[async_trait]
pub trait ResourceClient<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Fetches the current resource. `None` if it no longer exists.
    async fn get(&self, name: &ResourceName) -> Result<Option<Resource<S>>>;

    /// Replaces the finalizer list.
    async fn set_finalizers(&self, name: &ResourceName, finalizers: Vec<String>) -> Result<()>;

    /// Replaces the status.
    async fn update_status(&self, name: &ResourceName, status: SyncStatus) -> Result<()>;
}

/// Where a resource is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Tracked and periodically synchronized.
    Active,
    /// Removal requested; a final flush must succeed before release.
    PendingFinalization,
    /// Removal requested and the protection finalizer is gone.
    Finalized,
}

impl LifecycleState {
    /// Derives the state from metadata and the protection finalizer name.
    pub fn of(meta: &ObjectMeta, finalizer: &str) -> Self {
        match (meta.deletion_requested, meta.has_finalizer(finalizer)) {
            (false, _) => LifecycleState::Active,
            (true, true) => LifecycleState::PendingFinalization,
            (true, false) => LifecycleState::Finalized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::PendingFinalization => "pending_finalization",
            LifecycleState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
