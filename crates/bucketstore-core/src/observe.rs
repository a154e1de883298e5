//! Optional metrics instrumentation for the bucket store.
//!
//! When the `observe` feature is enabled, store operations emit counters,
//! histograms, and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder (e.g. `metrics-exporter-prometheus`)
//! to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a write operation (counter + latency histogram).
///
/// - `bucketstore.writes_total` – counter with `op` label (`put` / `remove` / `update`)
/// - `bucketstore.write_duration_seconds` – histogram with `op` label
#[inline]
pub fn record_write(op: &'static str, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("bucketstore.writes_total", "op" => op).increment(1);
        metrics::histogram!("bucketstore.write_duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (op, duration);
    }
}

/// Record tombstones written by a remove call.
///
/// - `bucketstore.tombstones_total` – counter
#[inline]
pub fn record_tombstones(count: u32) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("bucketstore.tombstones_total").increment(u64::from(count));
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record one drained iterator batch.
///
/// - `bucketstore.iterate.batches_total` – counter
/// - `bucketstore.iterate.entries_total` – counter
/// - `bucketstore.iterate.batch_bytes` – histogram
#[inline]
pub fn record_iterate(entries: usize, bytes: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("bucketstore.iterate.batches_total").increment(1);
        metrics::counter!("bucketstore.iterate.entries_total").increment(entries as u64);
        metrics::histogram!("bucketstore.iterate.batch_bytes").record(bytes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (entries, bytes);
    }
}

/// Record a split or join.
///
/// - `bucketstore.maintenance_total` – counter with `op` label (`split` / `join`)
/// - `bucketstore.maintenance.entries_moved_total` – counter with `op` label
#[inline]
pub fn record_maintenance(op: &'static str, entries_moved: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("bucketstore.maintenance_total", "op" => op).increment(1);
        metrics::counter!("bucketstore.maintenance.entries_moved_total", "op" => op)
            .increment(entries_moved as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (op, entries_moved);
    }
}

/// Set the number of stored buckets.
///
/// - `bucketstore.buckets` – gauge
#[inline]
pub fn set_bucket_count(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("bucketstore.buckets").set(count as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Set the number of open iterators.
///
/// - `bucketstore.open_iterators` – gauge
#[inline]
pub fn set_open_iterators(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("bucketstore.open_iterators").set(count as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}
