use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use tm_types::{TargetId, VectorClock};

use crate::correlation::CorrelationTable;
use crate::stats::SchedulerStats;

/// Outcome of one eviction sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionReport {
    pub before: usize,
    pub evicted: usize,
    pub after: usize,
}

/// One-shot pass that drops correlation entries no receive can still need.
///
/// An entry is removed only when, for every target, the clock of that
/// target's last emitted event is causally after the send's clock. A target
/// that has not emitted anything yet cannot vouch for any entry, so nothing
/// is evicted until every target has emitted at least once.
///
/// The horizon is a snapshot taken when the sweep is launched; the scheduler
/// keeps advancing meanwhile, which only makes the sweep more conservative.
pub struct EvictionSweep {
    table: Arc<CorrelationTable>,
    horizon: Vec<(TargetId, Option<VectorClock>)>,
    stats: Arc<SchedulerStats>,
}

impl EvictionSweep {
    pub fn new(
        table: Arc<CorrelationTable>,
        horizon: Vec<(TargetId, Option<VectorClock>)>,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        Self {
            table,
            horizon,
            stats,
        }
    }

    /// Returns `true` if every target has moved causally past `send_clock`.
    pub fn is_evictable(&self, send_clock: &VectorClock) -> bool {
        self.horizon.iter().all(|(_, last)| {
            last.as_ref()
                .is_some_and(|last| last.is_after(send_clock))
        })
    }

    /// Run the sweep on the current thread.
    pub fn run(&self) -> EvictionReport {
        let before = self.table.len();
        let evicted = self
            .table
            .evict_where(|_, send| self.is_evictable(&send.clock));
        let after = self.table.len();
        self.stats.record_sweep(evicted);

        let waiting: Vec<&str> = self
            .horizon
            .iter()
            .filter(|(_, last)| last.is_none())
            .map(|(id, _)| id.as_str())
            .collect();
        if !waiting.is_empty() && before > 0 {
            warn!(
                retained = after,
                silent_targets = ?waiting,
                "eviction blocked: targets without emitted events"
            );
        } else if evicted == 0 && before > 0 {
            warn!(retained = after, "eviction sweep reclaimed nothing");
        }
        info!(before, evicted, after, "eviction sweep finished");

        EvictionReport {
            before,
            evicted,
            after,
        }
    }

    /// Run the sweep on tokio's blocking pool.
    pub fn spawn(self) -> JoinHandle<EvictionReport> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelatedSend;
    use tm_types::{MessageId, Participants};

    fn vc(s: &str) -> VectorClock {
        s.parse().unwrap()
    }

    fn table_with(entries: &[(&str, &str)]) -> Arc<CorrelationTable> {
        let table = Arc::new(CorrelationTable::new());
        for (seq, (msg, clock)) in entries.iter().enumerate() {
            table.register(
                MessageId::from(*msg),
                CorrelatedSend {
                    sequence: seq as u64 + 1,
                    sender: TargetId::from("a"),
                    clock: vc(clock),
                    receivers: Participants::default(),
                },
            );
        }
        table
    }

    fn sweep(table: &Arc<CorrelationTable>, horizon: &[(&str, Option<&str>)]) -> EvictionSweep {
        let horizon = horizon
            .iter()
            .map(|(id, clock)| (TargetId::from(*id), clock.map(vc)))
            .collect();
        EvictionSweep::new(Arc::clone(table), horizon, Arc::new(SchedulerStats::default()))
    }

    #[test]
    fn evicts_when_every_target_is_past_the_send() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        let report = sweep(&table, &[("a", Some("{a=2, b=0}")), ("b", Some("{a=1, b=1}"))]).run();
        assert_eq!(
            report,
            EvictionReport {
                before: 1,
                evicted: 1,
                after: 0
            }
        );
        assert!(table.is_empty());
    }

    #[test]
    fn keeps_entry_while_a_target_lags() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        // b never saw a's send.
        let report = sweep(&table, &[("a", Some("{a=2, b=0}")), ("b", Some("{a=0, b=5}"))]).run();
        assert_eq!(report.evicted, 0);
        assert!(table.contains("m1"));
    }

    #[test]
    fn silent_target_cannot_authorize_eviction() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        let report = sweep(&table, &[("a", Some("{a=9, b=9}")), ("b", None)]).run();
        assert_eq!(report.evicted, 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn equal_clock_is_not_past() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        let report = sweep(&table, &[("a", Some("{a=1, b=0}")), ("b", Some("{a=1, b=1}"))]).run();
        assert_eq!(report.evicted, 0);
    }

    #[test]
    fn partial_eviction() {
        let table = table_with(&[("m1", "{a=1, b=0}"), ("m2", "{a=3, b=0}")]);
        let report = sweep(&table, &[("a", Some("{a=3, b=0}")), ("b", Some("{a=2, b=1}"))]).run();
        assert_eq!(report.evicted, 1);
        assert!(!table.contains("m1"));
        assert!(table.contains("m2"));
    }

    #[test]
    fn sweep_records_stats() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        let stats = Arc::new(SchedulerStats::default());
        let horizon = vec![
            (TargetId::from("a"), Some(vc("{a=2, b=0}"))),
            (TargetId::from("b"), Some(vc("{a=1, b=1}"))),
        ];
        EvictionSweep::new(Arc::clone(&table), horizon, Arc::clone(&stats)).run();
        let snap = stats.snapshot(table.len());
        assert_eq!(snap.sweeps, 1);
        assert_eq!(snap.evicted, 1);
        assert_eq!(snap.correlation_table_size, 0);
    }

    #[tokio::test]
    async fn spawned_sweep_runs_off_thread() {
        let table = table_with(&[("m1", "{a=1, b=0}")]);
        let report = sweep(&table, &[("a", Some("{a=2, b=0}")), ("b", Some("{a=1, b=1}"))])
            .spawn()
            .await
            .unwrap();
        assert_eq!(report.after, 0);
    }
}
