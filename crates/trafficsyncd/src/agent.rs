//! Node counter agent interface.
//!
//! Each node runs an agent that exposes cumulative byte counters per
//! `(address, tag)`. The transport is supplied by the embedding process; this
//! crate only needs a connector that opens a session to one node and the
//! session's dump call.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use traffic_accounting::Direction;

/// Dump request for one endpoint and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpTrafficRequest {
    pub address: String,
    pub tag: String,
    /// Ask the agent to zero its counters after reading. The sync cycles
    /// always send `false`.
    pub reset: bool,
}

impl DumpTrafficRequest {
    pub fn new(address: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tag: tag.into(),
            reset: false,
        }
    }
}

/// Raw cumulative counters reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

impl TrafficCounters {
    pub fn new(sent_bytes: u64, recv_bytes: u64) -> Self {
        Self {
            sent_bytes,
            recv_bytes,
        }
    }

    /// Returns the counter for one direction.
    pub fn get(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Sent => self.sent_bytes,
            Direction::Recv => self.recv_bytes,
        }
    }
}

/// An open session to one node agent. Dropping it closes the session.
#[async_trait]
pub trait CounterSource: Send {
    async fn dump_traffic(&mut self, request: DumpTrafficRequest) -> Result<TrafficCounters>;
}

/// Opens sessions to node agents.
///
/// Implementations dial `node_ip` on their configured agent port (50051 by
/// default) and report failures as `SyncError::RemoteUnavailable`.
#[async_trait]
pub trait CounterSourceConnector: Send + Sync {
    async fn connect(&self, node_ip: &str) -> Result<Box<dyn CounterSource>>;
}
