//! Monotonic traffic accounting primitives.
//!
//! This crate provides the storage-facing half of the traffic synchronization
//! pipeline:
//!
//! - [`EndpointCodec`]: Stable, storage-safe identifiers for IP endpoints
//! - [`compute_delta`]: Converts resetting cumulative counters into safe deltas
//! - [`MarkStore`]: Atomic increment-and-set store for per-tag marks
//! - [`AccountAccumulator`] / [`FeedAccumulator`]: The two accounting tiers
//!
//! # Architecture
//!
//! ```text
//!  raw counter ──▶ compute_delta ──▶ AccountAccumulator ──▶ TRAFFIC_ACCOUNT:<owner>
//!                  (last mark)                │
//!                                             ▼ totals
//!                  compute_delta ──▶ FeedAccumulator    ──▶ PORT_FEED:<feed>
//! ```
//!
//! The feed tier only ever reads account totals; the account tier never
//! reads feeds.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use traffic_accounting::{
//!     compute_delta, AccountAccumulator, Direction, EndpointCodec, MemoryMarkStore, Tag,
//! };
//!
//! # tokio_test_block_on(async {
//! let store = Arc::new(MemoryMarkStore::new());
//! let accounts = AccountAccumulator::new(store, Duration::from_secs(5));
//! let endpoint = EndpointCodec::new().unwrap().encode("10.0.0.1").unwrap();
//! let tag = Tag::new("80").unwrap();
//!
//! let mark = accounts.read_mark("ns/pod", &endpoint, &tag, Direction::Sent).await.unwrap();
//! let delta = compute_delta(mark.last_raw_mark, 1000);
//! accounts
//!     .apply_delta("ns/pod", &endpoint, &tag, Direction::Sent, delta.delta, 1000)
//!     .await
//!     .unwrap();
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod accumulator;
pub mod delta;
pub mod endpoint;
pub mod error;
pub mod mark;
pub mod store;

pub use accumulator::{AccountAccumulator, AccountDocument, FeedAccumulator, FeedDocument};
pub use delta::{compute_delta, Delta, DeltaKind};
pub use endpoint::{encode, EndpointCodec, EndpointId, ENDPOINT_ALPHABET};
pub use error::{AccountingError, Result};
pub use mark::{
    Collection, Direction, DocumentKey, EndpointProperty, MarkDocument, MarkUpdate, Tag,
    TagMark, TagProperty,
};
pub use store::memory::MemoryMarkStore;
#[cfg(feature = "redis")]
pub use store::redis_backend::{RedisMarkStore, RedisStoreConfig};
pub use store::{MarkStore, MAX_TOTAL};
