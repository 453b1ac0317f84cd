//! Lock-free pool metrics.
//!
//! Every counter is an atomic; the struct is shared as `Arc<PoolMetrics>`
//! between the pool, its pooled connections, and embedding code. Readers may
//! observe transiently inconsistent gauge pairs; the counters themselves are
//! exact.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Sentinel reported as the minimum time-to-first-transcript before any
/// sample has been recorded.
pub const UNSET_MIN: u64 = u64::MAX;

/// Counters and running statistics for one connection pool.
#[derive(Debug)]
pub struct PoolMetrics {
    active_connections: AtomicI64,
    idle_connections: AtomicI64,

    total_connections_created: AtomicU64,
    total_connections_acquired: AtomicU64,
    total_acquisition_timeouts: AtomicU64,
    total_connection_errors: AtomicU64,
    total_keep_alives_sent: AtomicU64,
    total_timeout_closures: AtomicU64,

    ttft_min: AtomicU64,
    ttft_max: AtomicU64,
    ttft_sum: AtomicU64,
    ttft_count: AtomicU64,

    acquisition_time_sum: AtomicU64,
    acquisition_time_count: AtomicU64,

    usage_time_sum: AtomicU64,
    usage_time_count: AtomicU64,
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicI64::new(0),
            idle_connections: AtomicI64::new(0),
            total_connections_created: AtomicU64::new(0),
            total_connections_acquired: AtomicU64::new(0),
            total_acquisition_timeouts: AtomicU64::new(0),
            total_connection_errors: AtomicU64::new(0),
            total_keep_alives_sent: AtomicU64::new(0),
            total_timeout_closures: AtomicU64::new(0),
            ttft_min: AtomicU64::new(UNSET_MIN),
            ttft_max: AtomicU64::new(0),
            ttft_sum: AtomicU64::new(0),
            ttft_count: AtomicU64::new(0),
            acquisition_time_sum: AtomicU64::new(0),
            acquisition_time_count: AtomicU64::new(0),
            usage_time_sum: AtomicU64::new(0),
            usage_time_count: AtomicU64::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Gauge transitions, bound to lifecycle events
    // -------------------------------------------------------------------------

    /// A new connection came up: it counts as active until it is parked.
    pub fn record_connection_created(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// A parked connection was handed to a caller.
    pub fn record_connection_acquired(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.idle_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_connections_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection went back to the idle queue.
    pub fn record_connection_released(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.idle_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection left the pool for good. Decrements whichever gauge still
    /// has room, active first.
    pub fn record_connection_closed(&self) {
        if self.active_connections.load(Ordering::Relaxed) > 0 {
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        } else if self.idle_connections.load(Ordering::Relaxed) > 0 {
            self.idle_connections.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Mark a connection as parked without an acquire/release cycle.
    pub fn record_connection_parked(&self) {
        self.idle_connections.fetch_add(1, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Event counters
    // -------------------------------------------------------------------------

    pub fn record_acquisition_timeout(&self) {
        self.total_acquisition_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keep_alive_sent(&self) {
        self.total_keep_alives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout_closure(&self) {
        self.total_timeout_closures.fetch_add(1, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Running statistics
    // -------------------------------------------------------------------------

    /// Record how long a session took to produce its first transcript.
    pub fn record_time_to_first_transcript(&self, millis: u64) {
        self.ttft_sum.fetch_add(millis, Ordering::Relaxed);
        self.ttft_count.fetch_add(1, Ordering::Relaxed);
        self.ttft_min.fetch_min(millis, Ordering::Relaxed);
        self.ttft_max.fetch_max(millis, Ordering::Relaxed);
    }

    /// Record how long an `acquire` call took to produce a session.
    pub fn record_acquisition_time(&self, millis: u64) {
        self.acquisition_time_sum.fetch_add(millis, Ordering::Relaxed);
        self.acquisition_time_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a caller held a session before releasing it.
    pub fn record_usage_time(&self, millis: u64) {
        self.usage_time_sum.fetch_add(millis, Ordering::Relaxed);
        self.usage_time_count.fetch_add(1, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Readers
    // -------------------------------------------------------------------------

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn idle_connections(&self) -> i64 {
        self.idle_connections.load(Ordering::Relaxed)
    }

    pub fn total_connections_created(&self) -> u64 {
        self.total_connections_created.load(Ordering::Relaxed)
    }

    pub fn total_connections_acquired(&self) -> u64 {
        self.total_connections_acquired.load(Ordering::Relaxed)
    }

    pub fn total_acquisition_timeouts(&self) -> u64 {
        self.total_acquisition_timeouts.load(Ordering::Relaxed)
    }

    pub fn total_connection_errors(&self) -> u64 {
        self.total_connection_errors.load(Ordering::Relaxed)
    }

    pub fn total_keep_alives_sent(&self) -> u64 {
        self.total_keep_alives_sent.load(Ordering::Relaxed)
    }

    pub fn total_timeout_closures(&self) -> u64 {
        self.total_timeout_closures.load(Ordering::Relaxed)
    }

    /// Minimum recorded time to first transcript, or [`UNSET_MIN`] when no
    /// sample exists yet.
    pub fn min_time_to_first_transcript(&self) -> u64 {
        self.ttft_min.load(Ordering::Relaxed)
    }

    pub fn max_time_to_first_transcript(&self) -> u64 {
        self.ttft_max.load(Ordering::Relaxed)
    }

    pub fn average_time_to_first_transcript(&self) -> f64 {
        average(
            self.ttft_sum.load(Ordering::Relaxed),
            self.ttft_count.load(Ordering::Relaxed),
        )
    }

    pub fn average_acquisition_time(&self) -> f64 {
        average(
            self.acquisition_time_sum.load(Ordering::Relaxed),
            self.acquisition_time_count.load(Ordering::Relaxed),
        )
    }

    pub fn average_usage_time(&self) -> f64 {
        average(
            self.usage_time_sum.load(Ordering::Relaxed),
            self.usage_time_count.load(Ordering::Relaxed),
        )
    }

    /// Share of live connections currently handed out, as a percentage.
    pub fn pool_utilization(&self) -> f64 {
        let active = self.active_connections.load(Ordering::Relaxed) as f64;
        let idle = self.idle_connections.load(Ordering::Relaxed) as f64;
        let total = active + idle;
        if total > 0.0 { active * 100.0 / total } else { 0.0 }
    }
}

fn average(sum: u64, count: u64) -> f64 {
    if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn time_to_first_transcript_statistics() {
        let metrics = PoolMetrics::new();
        for sample in [100, 50, 200] {
            metrics.record_time_to_first_transcript(sample);
        }

        assert!((metrics.average_time_to_first_transcript() - 350.0 / 3.0).abs() < 1e-6);
        assert_eq!(metrics.min_time_to_first_transcript(), 50);
        assert_eq!(metrics.max_time_to_first_transcript(), 200);
    }

    #[test]
    fn empty_statistics_report_zero_average_and_sentinel_min() {
        let metrics = PoolMetrics::new();
        assert_eq!(metrics.average_time_to_first_transcript(), 0.0);
        assert_eq!(metrics.average_acquisition_time(), 0.0);
        assert_eq!(metrics.average_usage_time(), 0.0);
        assert_eq!(metrics.min_time_to_first_transcript(), UNSET_MIN);
        assert_eq!(metrics.max_time_to_first_transcript(), 0);
    }

    #[test]
    fn min_average_max_are_ordered() {
        let metrics = PoolMetrics::new();
        for sample in [7, 3, 12, 9, 3, 40] {
            metrics.record_time_to_first_transcript(sample);
        }
        let min = metrics.min_time_to_first_transcript() as f64;
        let max = metrics.max_time_to_first_transcript() as f64;
        let avg = metrics.average_time_to_first_transcript();
        assert!(min <= avg && avg <= max);
    }

    #[test]
    fn acquire_release_cycles_return_gauges_to_start() {
        let metrics = PoolMetrics::new();
        let parked = 3;
        for _ in 0..parked {
            metrics.record_connection_parked();
        }
        assert_eq!(metrics.idle_connections(), parked);
        assert_eq!(metrics.active_connections(), 0);

        for _ in 0..10 {
            metrics.record_connection_acquired();
            metrics.record_connection_released();
        }
        assert_eq!(metrics.idle_connections(), parked);
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.total_connections_acquired(), 10);
    }

    #[test]
    fn creation_counts_as_active() {
        let metrics = PoolMetrics::new();
        metrics.record_connection_created();
        assert_eq!(metrics.active_connections(), 1);
        assert_eq!(metrics.total_connections_created(), 1);
    }

    #[test]
    fn close_prefers_active_then_idle() {
        let metrics = PoolMetrics::new();
        metrics.record_connection_created();
        metrics.record_connection_parked();

        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.idle_connections(), 1);

        metrics.record_connection_closed();
        assert_eq!(metrics.idle_connections(), 0);

        // Nothing left; the gauges stay at zero.
        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.idle_connections(), 0);
    }

    #[test]
    fn utilization_is_zero_for_empty_pool() {
        let metrics = PoolMetrics::new();
        assert_eq!(metrics.pool_utilization(), 0.0);

        metrics.record_connection_parked();
        assert_eq!(metrics.pool_utilization(), 0.0);

        metrics.record_connection_acquired();
        assert_eq!(metrics.pool_utilization(), 100.0);

        metrics.record_connection_parked();
        assert_eq!(metrics.pool_utilization(), 50.0);
    }

    #[tokio::test]
    async fn concurrent_recording_converges() {
        let metrics = Arc::new(PoolMetrics::new());
        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let metrics = metrics.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..100u64 {
                    metrics.record_time_to_first_transcript(worker * 100 + i + 1);
                    metrics.record_keep_alive_sent();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(metrics.total_keep_alives_sent(), 800);
        assert_eq!(metrics.min_time_to_first_transcript(), 1);
        assert_eq!(metrics.max_time_to_first_transcript(), 800);
        let avg = metrics.average_time_to_first_transcript();
        assert!((avg - 400.5).abs() < 1e-6);
    }
}
