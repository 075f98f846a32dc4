//! Fake collaborators for controller and cycle tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use traffic_accounting::{AccountAccumulator, EndpointCodec, FeedAccumulator, MemoryMarkStore};
use trafficsyncd::{
    CounterSource, CounterSourceConnector, DumpTrafficRequest, ObjectMeta, PortFeedRequestSpec,
    Resource, ResourceClient, ResourceName, SyncError, SyncStatus, TrafficCounters,
    TrafficSyncRequestSpec,
};

pub const NODE_IP: &str = "192.168.0.10";
pub const ADDRESS: &str = "10.0.0.1";
pub const NAMESPACE: &str = "team-a";
pub const POD: &str = "web-0";
pub const OWNER: &str = "team-a/web-0";

/// In-memory resource framework.
///
/// Mirrors the framework's removal rule: once deletion was requested and the
/// last finalizer is cleared, the resource disappears.
pub struct MemoryResourceClient<S> {
    resources: Mutex<HashMap<ResourceName, Resource<S>>>,
    pending_failures: AtomicUsize,
    pub finalizer_writes: AtomicUsize,
    pub status_writes: AtomicUsize,
}

impl<S: Clone> MemoryResourceClient<S> {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            pending_failures: AtomicUsize::new(0),
            finalizer_writes: AtomicUsize::new(0),
            status_writes: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, resource: Resource<S>) -> ResourceName {
        let name = resource.name();
        self.resources.lock().insert(name.clone(), resource);
        name
    }

    pub fn snapshot(&self, name: &ResourceName) -> Option<Resource<S>> {
        self.resources.lock().get(name).cloned()
    }

    pub fn request_deletion(&self, name: &ResourceName) {
        if let Some(r) = self.resources.lock().get_mut(name) {
            r.meta.deletion_requested = true;
        }
    }

    pub fn set_status(&self, name: &ResourceName, status: SyncStatus) {
        if let Some(r) = self.resources.lock().get_mut(name) {
            r.status = status;
        }
    }

    /// Makes the next `count` calls fail.
    pub fn inject_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    fn check_failure(&self, name: &ResourceName) -> trafficsyncd::Result<()> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SyncError::lifecycle(name, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> ResourceClient<S> for MemoryResourceClient<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn get(&self, name: &ResourceName) -> trafficsyncd::Result<Option<Resource<S>>> {
        self.check_failure(name)?;
        Ok(self.resources.lock().get(name).cloned())
    }

    async fn set_finalizers(
        &self,
        name: &ResourceName,
        finalizers: Vec<String>,
    ) -> trafficsyncd::Result<()> {
        self.check_failure(name)?;
        self.finalizer_writes.fetch_add(1, Ordering::SeqCst);
        let mut resources = self.resources.lock();
        let Some(r) = resources.get_mut(name) else {
            return Err(SyncError::lifecycle(name, "not found"));
        };
        r.meta.finalizers = finalizers;
        if r.meta.deletion_requested && r.meta.finalizers.is_empty() {
            resources.remove(name);
        }
        Ok(())
    }

    async fn update_status(&self, name: &ResourceName, status: SyncStatus) -> trafficsyncd::Result<()> {
        self.check_failure(name)?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let mut resources = self.resources.lock();
        let Some(r) = resources.get_mut(name) else {
            return Err(SyncError::lifecycle(name, "not found"));
        };
        r.status = status;
        Ok(())
    }
}

/// Scripted node agent.
#[derive(Default)]
pub struct FakeConnector {
    counters: Mutex<HashMap<(String, String), TrafficCounters>>,
    pending_failures: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    connects: AtomicUsize,
    dumps: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counters(&self, address: &str, tag: &str, sent: u64, recv: u64) {
        self.counters
            .lock()
            .insert((address.to_string(), tag.to_string()), TrafficCounters::new(sent, recv));
    }

    /// Makes the next `count` connects fail.
    pub fn inject_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Delays every dump by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn dumps(&self) -> usize {
        self.dumps.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    counters: HashMap<(String, String), TrafficCounters>,
    latency: Option<Duration>,
    dumps: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CounterSource for FakeSession {
    async fn dump_traffic(
        &mut self,
        request: DumpTrafficRequest,
    ) -> trafficsyncd::Result<TrafficCounters> {
        assert!(!request.reset, "sync cycles must not reset agent counters");
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.dumps.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .counters
            .get(&(request.address, request.tag))
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CounterSourceConnector for FakeConnector {
    async fn connect(&self, node_ip: &str) -> trafficsyncd::Result<Box<dyn CounterSource>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SyncError::remote_unavailable(node_ip, "connection refused"));
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: self.counters.lock().clone(),
            latency: *self.latency.lock(),
            dumps: self.dumps.clone(),
            open_sessions: self.open_sessions.clone(),
        }))
    }
}

/// Store, tiers and codec shared by both cycles.
pub struct Accounting {
    pub store: Arc<MemoryMarkStore>,
    pub accounts: AccountAccumulator,
    pub feeds: FeedAccumulator,
    pub codec: Arc<EndpointCodec>,
}

impl Accounting {
    pub fn new() -> Self {
        let store = Arc::new(MemoryMarkStore::new());
        Self {
            accounts: AccountAccumulator::new(store.clone(), Duration::from_secs(5)),
            feeds: FeedAccumulator::new(store.clone(), Duration::from_secs(5)),
            store,
            codec: Arc::new(EndpointCodec::new().unwrap()),
        }
    }
}

pub fn traffic_sync_request(
    name: &str,
    tags: &[&str],
    sync_period: Duration,
) -> Resource<TrafficSyncRequestSpec> {
    Resource::new(
        ObjectMeta::new(NAMESPACE, name),
        TrafficSyncRequestSpec {
            associated_namespace: NAMESPACE.to_string(),
            associated_pod: POD.to_string(),
            node_ip: NODE_IP.to_string(),
            address: ADDRESS.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            sync_period,
        },
    )
}

pub fn port_feed_request(
    name: &str,
    port: u16,
    address: Option<&str>,
    sync_period: Duration,
) -> Resource<PortFeedRequestSpec> {
    Resource::new(
        ObjectMeta::new(NAMESPACE, name),
        PortFeedRequestSpec {
            associated_namespace: NAMESPACE.to_string(),
            associated_pod: POD.to_string(),
            address: address.map(str::to_string),
            port,
            sync_period,
        },
    )
}
