//! Level-1 cycle: node agent counters into workload accounts.

use crate::agent::{CounterSourceConnector, DumpTrafficRequest, TrafficCounters};
use crate::cycle::{CycleReport, SampleOutcome, SyncCycle};
use crate::error::{Result, SyncError};
use crate::lifecycle::TSR_FINALIZER;
use crate::types::TrafficSyncRequestSpec;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use traffic_accounting::{
    compute_delta, AccountAccumulator, Direction, EndpointCodec, MarkUpdate, Tag,
};

/// Samples one endpoint's counters and advances its account marks.
pub struct TrafficSync {
    accounts: AccountAccumulator,
    connector: Arc<dyn CounterSourceConnector>,
    codec: Arc<EndpointCodec>,
    remote_timeout: Duration,
}

impl TrafficSync {
    pub fn new(
        accounts: AccountAccumulator,
        connector: Arc<dyn CounterSourceConnector>,
        codec: Arc<EndpointCodec>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            connector,
            codec,
            remote_timeout,
        }
    }

    /// Opens a session to the node agent, dumps counters and closes it.
    async fn dump(&self, node_ip: &str, request: DumpTrafficRequest) -> Result<TrafficCounters> {
        let call = async {
            let mut source = self.connector.connect(node_ip).await?;
            source.dump_traffic(request).await
        };
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::remote_unavailable(
                node_ip,
                format!("timed out after {:?}", self.remote_timeout),
            )),
        }
    }
}

#[async_trait]
impl SyncCycle for TrafficSync {
    type Spec = TrafficSyncRequestSpec;

    fn kind(&self) -> &'static str {
        "TrafficSyncRequest"
    }

    fn finalizer(&self) -> &'static str {
        TSR_FINALIZER
    }

    fn sync_period(&self, spec: &Self::Spec) -> Duration {
        spec.sync_period
    }

    fn tags(&self, spec: &Self::Spec) -> Result<Vec<Tag>> {
        Ok(spec.tags()?)
    }

    #[instrument(skip(self, spec), fields(owner = %spec.owner_key(), address = %spec.address, tag = %tag))]
    async fn sync_tag(&self, spec: &Self::Spec, tag: &Tag) -> Result<CycleReport> {
        // Reject bad input before any I/O
        let endpoint = self.codec.encode(&spec.address)?;
        let owner = spec.owner_key();

        let counters = self
            .dump(&spec.node_ip, DumpTrafficRequest::new(&spec.address, tag.as_str()))
            .await?;
        debug!(
            sent = counters.sent_bytes,
            recv = counters.recv_bytes,
            "Dumped counters"
        );

        let mut report = CycleReport::new(tag.clone());
        let mut updates = Vec::with_capacity(Direction::ALL.len());
        for direction in Direction::ALL {
            let raw = counters.get(direction);
            let mark = self
                .accounts
                .read_mark(&owner, &endpoint, tag, direction)
                .await?;
            let delta = compute_delta(mark.last_raw_mark, raw);
            let kind = delta.kind();

            if delta.stale {
                warn!(
                    endpoint = %endpoint,
                    direction = %direction,
                    mark = mark.last_raw_mark,
                    raw,
                    "Counter below last mark, holding"
                );
            }
            if kind.should_apply() {
                updates.push(MarkUpdate::new(direction, delta.delta, raw));
            }
            report.record(SampleOutcome {
                endpoint: endpoint.clone(),
                direction,
                kind,
                delta: delta.delta,
                raw,
            });
        }

        self.accounts
            .apply_updates(&owner, &endpoint, tag, &updates)
            .await?;
        Ok(report)
    }
}
