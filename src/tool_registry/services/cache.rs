//! Short-lived cache of successful tool results.

use crate::tool_registry::domain::{McpServerId, ToolArguments, ToolCallOutput};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cache key: server, tool, and a digest of the canonical arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    server_id: McpServerId,
    tool: String,
    arguments_digest: String,
}

impl CacheKey {
    /// Builds the key for a call. Argument key order does not matter.
    #[must_use]
    pub fn new(server_id: &McpServerId, tool: &str, arguments: &ToolArguments) -> Self {
        let mut canonical = String::new();
        write_canonical_object(arguments, &mut canonical);
        Self {
            server_id: server_id.clone(),
            tool: tool.to_owned(),
            arguments_digest: format!("{:x}", Sha256::digest(canonical.as_bytes())),
        }
    }
}

// Sorts keys explicitly; `serde_json::Map` keeps insertion order whenever
// another crate in the build enables `preserve_order`.
fn write_canonical_object(map: &ToolArguments, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|left, right| left.0.cmp(right.0));

    out.push('{');
    for (position, (key, item)) in entries.into_iter().enumerate() {
        if position > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(item, out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    output: ToolCallOutput,
    observed_at: DateTime<Utc>,
}

/// Concurrent TTL cache for tool results.
///
/// Entries older than the TTL are treated as absent and evicted lazily on
/// read; [`ToolResultCache::purge_expired`] sweeps the whole map.
#[derive(Debug)]
pub struct ToolResultCache {
    entries: DashMap<CacheKey, CachedResult>,
    ttl: TimeDelta,
}

impl ToolResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    fn is_expired(&self, cached: &CachedResult, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(cached.observed_at) > self.ttl
    }

    /// Returns a fresh cached output, evicting a stale one.
    #[must_use]
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<ToolCallOutput> {
        let entry = self.entries.get(key)?;
        if !self.is_expired(&entry, now) {
            return Some(entry.output.clone());
        }
        drop(entry);

        self.entries
            .remove_if(key, |_, cached| self.is_expired(cached, now));
        None
    }

    /// Stores an output observed at `now`, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, output: ToolCallOutput, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CachedResult {
                output,
                observed_at: now,
            },
        );
    }

    /// Removes every expired entry and returns how many were dropped.
    #[must_use = "the purge count reports how many results expired"]
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, cached| !self.is_expired(cached, now));
        before.saturating_sub(self.entries.len())
    }

    /// Returns the number of stored entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
