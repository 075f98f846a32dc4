//! Tag marks and the fixed two-level document schema.
//!
//! Both accounting tiers persist documents of the same shape:
//!
//! ```text
//! <document key>
//!   └── <endpoint id>
//!         └── <tag>
//!               ├── sent: { total, last_raw_mark }
//!               └── recv: { total, last_raw_mark }
//! ```
//!
//! Stores address individual marks through field paths of the form
//! `<endpoint>.<tag>.<field>`, so neither endpoint ids nor tags may contain
//! the `.` delimiter.

use crate::endpoint::EndpointId;
use crate::error::{AccountingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field-path delimiter.
pub const PATH_DELIMITER: char = '.';

/// Byte direction a mark tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bytes sent by the endpoint.
    Sent,
    /// Bytes received by the endpoint.
    Recv,
}

impl Direction {
    /// Every direction, in processing order.
    pub const ALL: [Direction; 2] = [Direction::Sent, Direction::Recv];

    /// Returns the direction name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Recv => "recv",
        }
    }

    /// Field holding the running total.
    pub fn total_field(&self) -> &'static str {
        match self {
            Direction::Sent => "sent_bytes",
            Direction::Recv => "recv_bytes",
        }
    }

    /// Field holding the last raw mark.
    pub fn mark_field(&self) -> &'static str {
        match self {
            Direction::Sent => "last_sent_byte_mark",
            Direction::Recv => "last_recv_byte_mark",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-defined label separating traffic streams to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Validates and wraps a tag.
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(AccountingError::invalid_tag(tag, "tag cannot be empty"));
        }
        if tag.contains(PATH_DELIMITER) {
            return Err(AccountingError::invalid_tag(
                tag,
                format!("tag cannot contain '{}'", PATH_DELIMITER),
            ));
        }
        Ok(Self(tag))
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Running total and the raw counter value it was last advanced from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMark {
    /// Bytes attributed so far. Never decreases.
    pub total: u64,
    /// Raw value used for the most recent increment.
    pub last_raw_mark: u64,
}

/// Sent and received marks for one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagProperty {
    pub sent: TagMark,
    pub recv: TagMark,
}

impl TagProperty {
    /// Returns the mark for a direction.
    pub fn mark(&self, direction: Direction) -> TagMark {
        match direction {
            Direction::Sent => self.sent,
            Direction::Recv => self.recv,
        }
    }

    /// Returns a mutable reference to the mark for a direction.
    pub fn mark_mut(&mut self, direction: Direction) -> &mut TagMark {
        match direction {
            Direction::Sent => &mut self.sent,
            Direction::Recv => &mut self.recv,
        }
    }
}

/// All tags recorded for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointProperty {
    pub tags: BTreeMap<Tag, TagProperty>,
}

/// Which accounting tier a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Level-1 per-workload accounts fed from raw samples.
    Account,
    /// Level-2 feeds derived from account totals.
    Feed,
}

impl Collection {
    /// Returns the table name used as the store key prefix.
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Account => "TRAFFIC_ACCOUNT",
            Collection::Feed => "PORT_FEED",
        }
    }
}

/// Primary key of one persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub collection: Collection,
    pub key: String,
}

impl DocumentKey {
    /// Creates an account document key.
    pub fn account(owner_key: impl Into<String>) -> Self {
        Self {
            collection: Collection::Account,
            key: owner_key.into(),
        }
    }

    /// Creates a feed document key.
    pub fn feed(feed_key: impl Into<String>) -> Self {
        Self {
            collection: Collection::Feed,
            key: feed_key.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection.table_name(), self.key)
    }
}

/// One atomic increment-and-set against a single mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkUpdate {
    pub direction: Direction,
    /// Amount added to `total`.
    pub delta: u64,
    /// Replaces `last_raw_mark`.
    pub new_raw_mark: u64,
}

impl MarkUpdate {
    pub fn new(direction: Direction, delta: u64, new_raw_mark: u64) -> Self {
        Self {
            direction,
            delta,
            new_raw_mark,
        }
    }
}

/// A whole account or feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDocument {
    pub key: DocumentKey,
    pub endpoints: BTreeMap<EndpointId, EndpointProperty>,
}

impl MarkDocument {
    /// Creates an empty document.
    pub fn new(key: DocumentKey) -> Self {
        Self {
            key,
            endpoints: BTreeMap::new(),
        }
    }

    /// Returns the mark at a path, or zero if absent.
    pub fn mark(&self, endpoint: &EndpointId, tag: &Tag, direction: Direction) -> TagMark {
        self.endpoints
            .get(endpoint)
            .and_then(|e| e.tags.get(tag))
            .map(|p| p.mark(direction))
            .unwrap_or_default()
    }

    /// Iterates endpoints that carry the given tag.
    pub fn endpoints_with_tag<'a>(
        &'a self,
        tag: &'a Tag,
    ) -> impl Iterator<Item = (&'a EndpointId, &'a TagProperty)> + 'a {
        self.endpoints
            .iter()
            .filter_map(move |(id, prop)| prop.tags.get(tag).map(|p| (id, p)))
    }

    /// Sets one stored field, creating intermediate levels.
    ///
    /// Used by backends that persist the document as flat field paths.
    pub fn set_field(&mut self, path: &FieldPath, value: u64) {
        let mark = self
            .endpoints
            .entry(path.endpoint.clone())
            .or_default()
            .tags
            .entry(path.tag.clone())
            .or_default()
            .mark_mut(path.direction);
        match path.kind {
            FieldKind::Total => mark.total = value,
            FieldKind::LastRawMark => mark.last_raw_mark = value,
        }
    }
}

/// Which half of a mark a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Total,
    LastRawMark,
}

/// A parsed `<endpoint>.<tag>.<field>` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub endpoint: EndpointId,
    pub tag: Tag,
    pub direction: Direction,
    pub kind: FieldKind,
}

impl FieldPath {
    /// Builds the field name for a mark's total.
    pub fn total(endpoint: &EndpointId, tag: &Tag, direction: Direction) -> String {
        format!("{}.{}.{}", endpoint, tag, direction.total_field())
    }

    /// Builds the field name for a mark's last raw value.
    pub fn last_raw_mark(endpoint: &EndpointId, tag: &Tag, direction: Direction) -> String {
        format!("{}.{}.{}", endpoint, tag, direction.mark_field())
    }

    /// Parses a stored field name. Returns `None` for unknown shapes.
    pub fn parse(field: &str) -> Option<Self> {
        let mut parts = field.splitn(3, PATH_DELIMITER);
        let endpoint = EndpointId::from_stored(parts.next()?)?;
        let tag = Tag::new(parts.next()?).ok()?;
        let name = parts.next()?;
        let (direction, kind) = Direction::ALL.iter().find_map(|d| {
            if name == d.total_field() {
                Some((*d, FieldKind::Total))
            } else if name == d.mark_field() {
                Some((*d, FieldKind::LastRawMark))
            } else {
                None
            }
        })?;
        Some(Self {
            endpoint,
            tag,
            direction,
            kind,
        })
    }
}
