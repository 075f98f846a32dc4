//! Redis mark store.
//!
//! Each document is one hash at `<TABLE>:<key>` (`TRAFFIC_ACCOUNT:ns/pod`,
//! `PORT_FEED:ns/pod`). Every mark occupies two hash fields:
//!
//! ```text
//! <endpoint>.<tag>.sent_bytes            running total
//! <endpoint>.<tag>.last_sent_byte_mark   raw value of the last increment
//! ```
//!
//! Increment-and-set runs as a Lua script so the totals and marks for one
//! `(endpoint, tag)` change together or not at all. Totals are kept with
//! `HINCRBY` and are therefore bounded by `i64::MAX`.

use super::MarkStore;
use crate::endpoint::EndpointId;
use crate::error::{AccountingError, Result};
use crate::mark::{Direction, DocumentKey, FieldPath, MarkDocument, MarkUpdate, Tag, TagMark};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Applies `ARGV[1]` updates, each described by five arguments:
/// total field, mark field, delta, negated delta, new mark.
///
/// All increments run first; if one fails the earlier ones are reverted and
/// no mark is written.
const APPLY_UPDATES_SCRIPT: &str = r#"
local count = tonumber(ARGV[1])
local applied = {}
for i = 0, count - 1 do
    local base = 2 + i * 5
    local res = redis.pcall('HINCRBY', KEYS[1], ARGV[base], ARGV[base + 2])
    if type(res) == 'table' and res.err then
        for j = #applied, 1, -1 do
            local b = applied[j]
            redis.call('HINCRBY', KEYS[1], ARGV[b], ARGV[b + 3])
        end
        if string.find(res.err, 'overflow') then
            return redis.error_reply('OVERFLOW ' .. ARGV[base])
        end
        return redis.error_reply('CORRUPT ' .. ARGV[base])
    end
    applied[#applied + 1] = base
end
for i = 0, count - 1 do
    local base = 2 + i * 5
    redis.call('HSET', KEYS[1], ARGV[base + 1], ARGV[base + 4])
end
return count
"#;

/// Connection settings for [`RedisMarkStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
        }
    }
}

impl RedisStoreConfig {
    pub fn new(host: impl Into<String>, port: u16, db: i64) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Returns the connection URI.
    pub fn uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Mark store backed by Redis hashes.
#[derive(Clone)]
pub struct RedisMarkStore {
    conn: ConnectionManager,
    apply_script: Script,
    config: RedisStoreConfig,
}

impl std::fmt::Debug for RedisMarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMarkStore")
            .field("config", &self.config)
            .finish()
    }
}

impl RedisMarkStore {
    /// Connects and verifies the server answers `PING`.
    #[instrument(skip_all, fields(uri = %config.uri()))]
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        debug!("Connecting to mark store");
        let client = Client::open(config.uri()).map_err(store_error("connect"))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(store_error("connect"))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error("ping"))?;

        debug!("Connected to mark store");
        Ok(Self {
            conn,
            apply_script: Script::new(APPLY_UPDATES_SCRIPT),
            config,
        })
    }

    /// Returns the connection settings.
    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    /// Releases the connection.
    pub fn disconnect(self) {
        debug!(uri = %self.config.uri(), "Disconnecting from mark store");
        drop(self.conn);
    }
}

#[async_trait]
impl MarkStore for RedisMarkStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self), fields(document = %document))]
    async fn read_mark(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark> {
        let key = document.to_string();
        let total_field = FieldPath::total(endpoint, tag, direction);
        let mark_field = FieldPath::last_raw_mark(endpoint, tag, direction);

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&key)
            .arg(&total_field)
            .arg(&mark_field)
            .query_async(&mut conn)
            .await
            .map_err(store_error("read_mark"))?;

        let total = parse_value(&key, &total_field, values.first().cloned().flatten())?;
        let last_raw_mark = parse_value(&key, &mark_field, values.get(1).cloned().flatten())?;
        Ok(TagMark {
            total,
            last_raw_mark,
        })
    }

    #[instrument(skip(self, updates), fields(document = %document, count = updates.len()))]
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
        let key = document.to_string();

        let mut invocation = self.apply_script.prepare_invoke();
        invocation.key(&key).arg(updates.len());
        for update in updates {
            let total_field = FieldPath::total(endpoint, tag, update.direction);
            let delta = i64::try_from(update.delta)
                .map_err(|_| AccountingError::overflow(key.as_str(), total_field.as_str()))?;
            invocation
                .arg(&total_field)
                .arg(FieldPath::last_raw_mark(endpoint, tag, update.direction))
                .arg(delta)
                .arg(-delta)
                .arg(update.new_raw_mark);
        }

        let mut conn = self.conn.clone();
        let result: std::result::Result<i64, RedisError> =
            invocation.invoke_async(&mut conn).await;
        match result {
            Ok(_) => {
                debug!("Applied mark updates");
                Ok(())
            }
            Err(e) if e.code() == Some("OVERFLOW") => {
                warn!(error = %e, "Mark update rejected");
                Err(AccountingError::overflow(key, e.detail().unwrap_or_default()))
            }
            Err(e) if e.code() == Some("CORRUPT") => {
                warn!(error = %e, "Mark update rejected");
                Err(AccountingError::corrupt_mark(
                    key,
                    e.detail().unwrap_or_default(),
                    "<non-integer>",
                ))
            }
            Err(e) => Err(store_error("apply_updates")(e)),
        }
    }

    #[instrument(skip(self), fields(document = %document))]
    async fn load_document(&self, document: &DocumentKey) -> Result<Option<MarkDocument>> {
        let key = document.to_string();
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(store_error("load_document"))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let mut doc = MarkDocument::new(document.clone());
        for (field, value) in fields {
            let Some(path) = FieldPath::parse(&field) else {
                debug!(field, "Skipping unrecognized field");
                continue;
            };
            let value = parse_value(&key, &field, Some(value))?;
            doc.set_field(&path, value);
        }
        Ok(Some(doc))
    }
}

fn store_error(operation: &'static str) -> impl Fn(RedisError) -> AccountingError {
    move |e| AccountingError::store_unavailable(operation, e.to_string())
}

/// Parses a stored counter; absent fields read as zero.
fn parse_value(document: &str, field: &str, value: Option<String>) -> Result<u64> {
    match value {
        None => Ok(0),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| AccountingError::corrupt_mark(document, field, v.as_str())),
    }
}
