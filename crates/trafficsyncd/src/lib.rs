//! Traffic counter synchronization daemon library.
//!
//! Periodically samples per-endpoint byte counters from node agents and
//! propagates them through the two accounting tiers of
//! [`traffic_accounting`]:
//!
//! - [`TrafficSync`]: level 1, agent counters into workload accounts
//! - [`PortFeedSync`]: level 2, account totals into port feeds
//! - [`LifecycleController`]: per-resource gating, finalizer handling and the
//!   forced final flush before a resource is released
//! - [`SyncScheduler`]: bounded, deduplicating work queue with backoff
//!
//! The resource framework and the agent transport are supplied by the
//! embedding process through [`ResourceClient`] and
//! [`CounterSourceConnector`].
//!
//! # Wiring
//!
//! ```ignore
//! let config = TrafficSyncConfig::load_or_default(DEFAULT_CONFIG_PATH)?;
//! telemetry::init_logging(&config.logging)?;
//!
//! let store: Arc<dyn MarkStore> = Arc::new(RedisMarkStore::connect(config.store_config()).await?);
//! let accounts = AccountAccumulator::new(store.clone(), config.store_timeout());
//! let codec = Arc::new(EndpointCodec::new()?);
//! let cycle = TrafficSync::new(accounts, connector, codec, config.remote_timeout());
//! let controller = Arc::new(LifecycleController::new(cycle, tsr_client));
//!
//! let scheduler = SyncScheduler::new(controller, &config.scheduler);
//! let handle = scheduler.handle();
//! tokio::spawn(scheduler.run());
//! handle.handle_event(name, ResourceEvent::Created);
//! ```

pub mod agent;
pub mod backoff;
pub mod config_file;
pub mod controller;
pub mod cursor;
pub mod cycle;
pub mod error;
pub mod lifecycle;
pub mod port_feed;
pub mod scheduler;
pub mod telemetry;
pub mod traffic_sync;
pub mod types;

pub use agent::{CounterSource, CounterSourceConnector, DumpTrafficRequest, TrafficCounters};
pub use backoff::Backoff;
pub use config_file::{
    AgentConfig, DatabaseConfig, LoggingConfig, SchedulerConfig, TrafficSyncConfig,
    DEFAULT_AGENT_PORT, DEFAULT_CONFIG_PATH,
};
pub use controller::{LifecycleController, Reconcile, ReconcileOutcome};
pub use cursor::SyncStatus;
pub use cycle::{CycleReport, SampleOutcome, SyncCycle};
pub use error::{Result, SyncError};
pub use lifecycle::{LifecycleState, ResourceClient, PFR_FINALIZER, TSR_FINALIZER};
pub use port_feed::PortFeedSync;
pub use scheduler::{ResourceEvent, SchedulerHandle, SyncScheduler};
pub use traffic_sync::TrafficSync;
pub use types::{
    ObjectMeta, PortFeedRequestSpec, Resource, ResourceName, TrafficSyncRequestSpec,
};
