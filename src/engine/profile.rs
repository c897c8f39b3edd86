use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

use crate::primitives::pager::CacheStats;
use crate::types::{GraphError, Result};

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineProfileSnapshot {
    /// Supersteps executed.
    pub supersteps: u64,
    /// Vertices placed in an active set.
    pub vertices_activated: u64,
    /// `run` callbacks invoked.
    pub vertices_run: u64,
    /// Active vertices dropped by a filter.
    pub vertices_filtered: u64,
    /// I/O requests accepted by the bridge.
    pub requests_issued: u64,
    /// Requests dropped as repeats within a superstep.
    pub requests_deduplicated: u64,
    /// Edge list and edge count deliveries.
    pub deliveries: u64,
    /// Deliveries that failed with an I/O error.
    pub io_errors: u64,
    /// Messages queued by senders.
    pub messages_sent: u64,
    /// Messages handed to `run_on_message`.
    pub messages_delivered: u64,
}

impl EngineProfileSnapshot {
    /// Counter-wise difference `self - earlier`.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            supersteps: self.supersteps - earlier.supersteps,
            vertices_activated: self.vertices_activated - earlier.vertices_activated,
            vertices_run: self.vertices_run - earlier.vertices_run,
            vertices_filtered: self.vertices_filtered - earlier.vertices_filtered,
            requests_issued: self.requests_issued - earlier.requests_issued,
            requests_deduplicated: self.requests_deduplicated - earlier.requests_deduplicated,
            deliveries: self.deliveries - earlier.deliveries,
            io_errors: self.io_errors - earlier.io_errors,
            messages_sent: self.messages_sent - earlier.messages_sent,
            messages_delivered: self.messages_delivered - earlier.messages_delivered,
        }
    }
}

#[derive(Default)]
pub(crate) struct EngineProfile {
    pub supersteps: AtomicU64,
    pub vertices_activated: AtomicU64,
    pub vertices_run: AtomicU64,
    pub vertices_filtered: AtomicU64,
    pub requests_issued: AtomicU64,
    pub requests_deduplicated: AtomicU64,
    pub deliveries: AtomicU64,
    pub io_errors: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_delivered: AtomicU64,
}

impl EngineProfile {
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, reset: bool) -> EngineProfileSnapshot {
        let load = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        EngineProfileSnapshot {
            supersteps: load(&self.supersteps),
            vertices_activated: load(&self.vertices_activated),
            vertices_run: load(&self.vertices_run),
            vertices_filtered: load(&self.vertices_filtered),
            requests_issued: load(&self.requests_issued),
            requests_deduplicated: load(&self.requests_deduplicated),
            deliveries: load(&self.deliveries),
            io_errors: load(&self.io_errors),
            messages_sent: load(&self.messages_sent),
            messages_delivered: load(&self.messages_delivered),
        }
    }
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub supersteps: u64,
    pub vertices_activated: u64,
    pub vertices_run: u64,
    pub vertices_filtered: u64,
    pub requests: u64,
    pub deliveries: u64,
    pub messages: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub(crate) fn from_delta(delta: &EngineProfileSnapshot, elapsed: Duration) -> Self {
        Self {
            supersteps: delta.supersteps,
            vertices_activated: delta.vertices_activated,
            vertices_run: delta.vertices_run,
            vertices_filtered: delta.vertices_filtered,
            requests: delta.requests_issued,
            deliveries: delta.deliveries,
            messages: delta.messages_sent,
            elapsed,
        }
    }
}

fn serialize_millis<S>(value: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_u64(value.as_millis() as u64)
}

#[derive(Serialize)]
struct ProfileReport<'a> {
    status: &'a str,
    engine: EngineProfileSnapshot,
    cache: CacheStats,
}

/// Writes the cumulative counters as pretty JSON.
pub(crate) fn write_profile(
    path: &Path,
    status: &str,
    engine: EngineProfileSnapshot,
    cache: CacheStats,
) -> Result<()> {
    let report = ProfileReport {
        status,
        engine,
        cache,
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| GraphError::Config(format!("failed to encode profile: {err}")))?;
    fs::write(path, json)?;
    Ok(())
}
