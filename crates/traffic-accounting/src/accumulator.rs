//! The two accounting tiers.
//!
//! [`AccountAccumulator`] holds level-1 totals fed from raw device counters,
//! keyed by the owning workload. [`FeedAccumulator`] holds level-2 totals fed
//! from account totals, keyed by feed. Both are thin, timeboxed facades over a
//! shared [`MarkStore`]; they differ only in the collection they address.

use crate::endpoint::EndpointId;
use crate::error::{AccountingError, Result};
use crate::mark::{Direction, DocumentKey, MarkDocument, MarkUpdate, Tag, TagMark};
use crate::store::MarkStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Level-1 document: every endpoint and tag recorded for one workload.
pub type AccountDocument = MarkDocument;

/// Level-2 document: every endpoint and tag recorded for one feed.
pub type FeedDocument = MarkDocument;

/// Store access shared by both tiers.
#[derive(Clone)]
struct Tier {
    store: Arc<dyn MarkStore>,
    timeout: Duration,
}

impl Tier {
    async fn timeboxed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AccountingError::store_unavailable(
                operation,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    async fn read_mark(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark> {
        self.timeboxed(
            "read_mark",
            self.store.read_mark(document, endpoint, tag, direction),
        )
        .await
    }

    async fn apply_updates(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        updates: &[MarkUpdate],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.timeboxed(
            "apply_updates",
            self.store.apply_updates(document, endpoint, tag, updates),
        )
        .await?;

        for update in updates {
            info!(
                document = %document,
                endpoint = %endpoint,
                tag = %tag,
                direction = %update.direction,
                delta = update.delta,
                mark = update.new_raw_mark,
                "Applied delta"
            );
        }
        Ok(())
    }

    async fn load(&self, document: &DocumentKey) -> Result<Option<MarkDocument>> {
        let doc = self
            .timeboxed("load_document", self.store.load_document(document))
            .await?;
        debug!(
            document = %document,
            endpoints = doc.as_ref().map_or(0, |d| d.endpoints.len()),
            "Loaded document"
        );
        Ok(doc)
    }
}

/// Per-workload traffic accounts.
#[derive(Clone)]
pub struct AccountAccumulator {
    tier: Tier,
}

impl AccountAccumulator {
    /// Creates an accumulator whose store calls fail after `timeout`.
    pub fn new(store: Arc<dyn MarkStore>, timeout: Duration) -> Self {
        Self {
            tier: Tier { store, timeout },
        }
    }

    /// Returns the store backend name.
    pub fn backend(&self) -> &'static str {
        self.tier.store.backend()
    }

    /// Reads one mark of an account. Absent entries read as zero.
    #[instrument(skip(self), fields(backend = self.backend()))]
    pub async fn read_mark(
        &self,
        owner: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark> {
        self.tier
            .read_mark(&DocumentKey::account(owner), endpoint, tag, direction)
            .await
    }

    /// Atomically adds `delta` to the total and sets the last raw mark.
    pub async fn apply_delta(
        &self,
        owner: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
        delta: u64,
        new_raw_mark: u64,
    ) -> Result<()> {
        self.apply_updates(
            owner,
            endpoint,
            tag,
            &[MarkUpdate::new(direction, delta, new_raw_mark)],
        )
        .await
    }

    /// Applies updates for several directions of one tag in one atomic write.
    #[instrument(skip(self, updates), fields(backend = self.backend(), count = updates.len()))]
    pub async fn apply_updates(
        &self,
        owner: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        updates: &[MarkUpdate],
    ) -> Result<()> {
        self.tier
            .apply_updates(&DocumentKey::account(owner), endpoint, tag, updates)
            .await
    }

    /// Loads a whole account.
    #[instrument(skip(self), fields(backend = self.backend()))]
    pub async fn load(&self, owner: &str) -> Result<Option<AccountDocument>> {
        self.tier.load(&DocumentKey::account(owner)).await
    }
}

/// Per-feed aggregates derived from accounts.
#[derive(Clone)]
pub struct FeedAccumulator {
    tier: Tier,
}

impl FeedAccumulator {
    /// Creates an accumulator whose store calls fail after `timeout`.
    pub fn new(store: Arc<dyn MarkStore>, timeout: Duration) -> Self {
        Self {
            tier: Tier { store, timeout },
        }
    }

    /// Returns the store backend name.
    pub fn backend(&self) -> &'static str {
        self.tier.store.backend()
    }

    /// Reads one mark of a feed. The mark is the account total last consumed.
    #[instrument(skip(self), fields(backend = self.backend()))]
    pub async fn read_mark(
        &self,
        feed: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark> {
        self.tier
            .read_mark(&DocumentKey::feed(feed), endpoint, tag, direction)
            .await
    }

    /// Atomically adds `delta` to the total and sets the last raw mark.
    pub async fn apply_delta(
        &self,
        feed: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
        delta: u64,
        new_raw_mark: u64,
    ) -> Result<()> {
        self.apply_updates(
            feed,
            endpoint,
            tag,
            &[MarkUpdate::new(direction, delta, new_raw_mark)],
        )
        .await
    }

    /// Applies updates for several directions of one tag in one atomic write.
    #[instrument(skip(self, updates), fields(backend = self.backend(), count = updates.len()))]
    pub async fn apply_updates(
        &self,
        feed: &str,
        endpoint: &EndpointId,
        tag: &Tag,
        updates: &[MarkUpdate],
    ) -> Result<()> {
        self.tier
            .apply_updates(&DocumentKey::feed(feed), endpoint, tag, updates)
            .await
    }

    /// Loads a whole feed.
    #[instrument(skip(self), fields(backend = self.backend()))]
    pub async fn load(&self, feed: &str) -> Result<Option<FeedDocument>> {
        self.tier.load(&DocumentKey::feed(feed)).await
    }
}
