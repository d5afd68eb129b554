// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for entity-store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `entity_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: entity type name the facade serves
//! - `operation`: find, save, remove, keys, lock, ...
//! - `status`: success, error, degraded

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a facade operation outcome
pub fn record_operation(entity: &str, operation: &str, status: &str) {
    counter!(
        "entity_store_operations_total",
        "entity" => entity.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(entity: &str, operation: &str, duration: Duration) {
    histogram!(
        "entity_store_operation_seconds",
        "entity" => entity.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCAL CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a local cache lookup
pub fn record_cache_lookup(cache: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(
        "entity_store_cache_lookups_total",
        "cache" => cache.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record entries dropped by capacity or age
pub fn record_cache_eviction(cache: &str, reason: &'static str, count: usize) {
    counter!(
        "entity_store_cache_evictions_total",
        "cache" => cache.to_string(),
        "reason" => reason
    )
    .increment(count as u64);
}

/// Set current local cache entry count
pub fn set_cache_entries(cache: &str, count: usize) {
    gauge!(
        "entity_store_cache_entries",
        "cache" => cache.to_string()
    )
    .set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE HEALTH
// ═══════════════════════════════════════════════════════════════════════════

/// Record a store call that failed because the store was unreachable
pub fn record_connectivity_failure() {
    counter!("entity_store_connectivity_failures_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DISTRIBUTED LOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Record a finished acquisition and how many conditional sets it took
pub fn record_lock_acquire(outcome: &'static str, attempts: u32) {
    counter!(
        "entity_store_lock_acquisitions_total",
        "outcome" => outcome
    )
    .increment(1);
    histogram!("entity_store_lock_attempts").record(attempts as f64);
}

/// Record how long a lock was held
pub fn record_lock_held(duration: Duration) {
    histogram!("entity_store_lock_held_seconds").record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITE-BEHIND
// ═══════════════════════════════════════════════════════════════════════════

/// Record an action handed to the write-behind queue
pub fn record_action_scheduled(kind: &'static str, retry: bool) {
    counter!(
        "entity_store_actions_scheduled_total",
        "kind" => kind,
        "retry" => if retry { "true" } else { "false" }
    )
    .increment(1);
}

/// Record an action executed by the write-behind worker
pub fn record_action_applied(kind: &'static str, status: &'static str) {
    counter!(
        "entity_store_actions_applied_total",
        "kind" => kind,
        "status" => status
    )
    .increment(1);
}

/// Record an event published to the store's pub/sub
pub fn record_event_published(code: &str, receivers: u64) {
    counter!(
        "entity_store_events_published_total",
        "code" => code.to_string()
    )
    .increment(1);
    histogram!("entity_store_event_receivers").record(receivers as f64);
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    entity: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(entity: &'static str, operation: &'static str) -> Self {
        Self {
            entity,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.entity, self.operation, self.start.elapsed());
    }
}
