use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running counters of the scheduler, shared with eviction sweeps.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    emitted: AtomicU64,
    deferred_receives: AtomicU64,
    stalled_rounds: AtomicU64,
    sweeps: AtomicU64,
    evicted: AtomicU64,
}

impl SchedulerStats {
    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred_receives.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stall(&self) {
        self.stalled_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self, evicted: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy, combined with the current table size.
    pub fn snapshot(&self, correlation_table_size: usize) -> StatsSnapshot {
        StatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            deferred_receives: self.deferred_receives.load(Ordering::Relaxed),
            stalled_rounds: self.stalled_rounds.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            correlation_table_size,
        }
    }
}

/// Copy of the scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Events that left the scheduler.
    pub emitted: u64,
    /// Times a receive head was skipped because its send was not yet known.
    pub deferred_receives: u64,
    /// Rounds in which no head was schedulable.
    pub stalled_rounds: u64,
    /// Completed eviction sweeps.
    pub sweeps: u64,
    /// Correlation entries removed by all sweeps.
    pub evicted: u64,
    /// Correlation entries currently retained.
    pub correlation_table_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = SchedulerStats::default();
        stats.record_emitted();
        stats.record_emitted();
        stats.record_deferred();
        stats.record_stall();
        stats.record_sweep(3);
        stats.record_sweep(0);

        let snap = stats.snapshot(7);
        assert_eq!(snap.emitted, 2);
        assert_eq!(snap.deferred_receives, 1);
        assert_eq!(snap.stalled_rounds, 1);
        assert_eq!(snap.sweeps, 2);
        assert_eq!(snap.evicted, 3);
        assert_eq!(snap.correlation_table_size, 7);
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_string(&StatsSnapshot::default()).unwrap();
        assert!(json.contains("\"correlation_table_size\":0"));
    }
}
