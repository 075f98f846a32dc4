//! Level-2 cycle: account totals into port feeds.
//!
//! The feed mark for an `(endpoint, port)` is the account total it last
//! consumed, so each cycle adds exactly the account growth since then.

use crate::cycle::{CycleReport, SampleOutcome, SyncCycle};
use crate::error::Result;
use crate::lifecycle::PFR_FINALIZER;
use crate::types::PortFeedRequestSpec;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use traffic_accounting::{
    compute_delta, AccountAccumulator, Direction, EndpointCodec, FeedAccumulator, MarkUpdate, Tag,
};

/// Rolls account totals for one port into the workload's feed.
pub struct PortFeedSync {
    accounts: AccountAccumulator,
    feeds: FeedAccumulator,
    codec: Arc<EndpointCodec>,
}

impl PortFeedSync {
    pub fn new(
        accounts: AccountAccumulator,
        feeds: FeedAccumulator,
        codec: Arc<EndpointCodec>,
    ) -> Self {
        Self {
            accounts,
            feeds,
            codec,
        }
    }
}

#[async_trait]
impl SyncCycle for PortFeedSync {
    type Spec = PortFeedRequestSpec;

    fn kind(&self) -> &'static str {
        "PortFeedRequest"
    }

    fn finalizer(&self) -> &'static str {
        PFR_FINALIZER
    }

    fn sync_period(&self, spec: &Self::Spec) -> Duration {
        spec.sync_period
    }

    fn tags(&self, spec: &Self::Spec) -> Result<Vec<Tag>> {
        Ok(vec![spec.tag()?])
    }

    #[instrument(skip(self, spec), fields(feed = %spec.feed_key(), tag = %tag))]
    async fn sync_tag(&self, spec: &Self::Spec, tag: &Tag) -> Result<CycleReport> {
        let only = spec
            .address
            .as_deref()
            .map(|address| self.codec.encode(address))
            .transpose()?;
        let owner = spec.owner_key();
        let feed = spec.feed_key();
        let mut report = CycleReport::new(tag.clone());

        let Some(account) = self.accounts.load(&owner).await? else {
            debug!(owner = %owner, "No account yet, nothing to feed");
            return Ok(report);
        };

        for (endpoint, totals) in account.endpoints_with_tag(tag) {
            if only.as_ref().is_some_and(|only| only != endpoint) {
                continue;
            }

            let mut updates = Vec::with_capacity(Direction::ALL.len());
            for direction in Direction::ALL {
                let upstream = totals.mark(direction).total;
                let mark = self.feeds.read_mark(&feed, endpoint, tag, direction).await?;
                let delta = compute_delta(mark.last_raw_mark, upstream);
                let kind = delta.kind();

                if delta.stale {
                    warn!(
                        endpoint = %endpoint,
                        direction = %direction,
                        mark = mark.last_raw_mark,
                        upstream,
                        "Account total below feed mark, holding"
                    );
                }
                if kind.should_apply() {
                    updates.push(MarkUpdate::new(direction, delta.delta, upstream));
                }
                report.record(SampleOutcome {
                    endpoint: endpoint.clone(),
                    direction,
                    kind,
                    delta: delta.delta,
                    raw: upstream,
                });
            }

            self.feeds
                .apply_updates(&feed, endpoint, tag, &updates)
                .await?;
        }

        Ok(report)
    }
}
