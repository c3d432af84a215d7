use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use tm_types::{EventKind, TargetId, TraceEvent};

use crate::correlation::{CorrelatedSend, CorrelationTable};
use crate::error::{Result, SchedulerError};
use crate::eviction::{EvictionReport, EvictionSweep};
use crate::queue::EventQueue;
use crate::stats::{SchedulerStats, StatsSnapshot};
use crate::target::{Target, TargetHandle};

/// Configuration for the [`Scheduler`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of emitted events between two eviction sweeps. `0` disables
    /// eviction.
    pub eviction_interval: u64,
    /// Pause after a round in which no head was schedulable.
    pub stall_backoff_ms: u64,
    /// Capacity of the channel behind [`Scheduler::spawn`].
    pub output_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            eviction_interval: 5000,
            stall_backoff_ms: 10,
            output_capacity: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn stall_backoff(&self) -> Duration {
        Duration::from_millis(self.stall_backoff_ms)
    }
}

/// Receiving end of a spawned scheduler.
pub type EventStream = mpsc::Receiver<TraceEvent>;

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cooperative stop signal for a [`Scheduler`].
///
/// Stopping closes every target queue, so a round suspended in its barrier
/// wakes up with [`SchedulerError::Cancelled`] instead of hanging on an empty
/// queue.
#[derive(Clone, Debug)]
pub struct StopHandle {
    state: Arc<StopState>,
    queues: Vec<Arc<EventQueue>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for queue in &self.queues {
            queue.close();
        }
        self.state.notify.notify_waiters();
        info!("scheduler stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }

    /// Resolve once [`stop`](StopHandle::stop) has been called.
    pub async fn stopped(&self) {
        let notified = self.state.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

/// How a schedulable head gets its clock.
enum ClockRule {
    /// Send or internal: advance the owning target's component.
    Tick,
    /// Receive: advance, then absorb the matching send's clock.
    Observe(CorrelatedSend),
}

/// Merges the per-target queues into one causally stamped event sequence.
///
/// Each call to [`next_event`](Scheduler::next_event) runs barrier rounds
/// until one event is emitted:
///
/// 1. Peek the head of every target queue, waiting until all are non-empty.
/// 2. Order the heads by local timestamp, ties broken by target id.
/// 3. Take the first schedulable head. Sends and internal events always
///    are; a receive only once the send with its message id is registered.
/// 4. Commit it, stamp it with the next global sequence number and the
///    owning target's new vector clock, and return it.
///
/// Heads that are not taken stay queued for the next round. Every
/// `eviction_interval` emitted events an [`EvictionSweep`] is launched on
/// the blocking pool.
pub struct Scheduler {
    targets: Vec<Target>,
    table: Arc<CorrelationTable>,
    stats: Arc<SchedulerStats>,
    config: SchedulerConfig,
    last_sequence: u64,
    since_sweep: u64,
    sweeps: Vec<JoinHandle<EvictionReport>>,
    stop: StopHandle,
}

impl Scheduler {
    /// Create a scheduler over a fixed set of targets.
    pub fn new(targets: Vec<Target>, config: SchedulerConfig) -> Result<Self> {
        if targets.is_empty() {
            return Err(SchedulerError::NoTargets);
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.id().clone()) {
                return Err(SchedulerError::DuplicateTarget(target.id().clone()));
            }
        }

        let stop = StopHandle {
            state: Arc::new(StopState::default()),
            queues: targets.iter().map(|t| Arc::clone(t.queue())).collect(),
        };

        Ok(Self {
            targets,
            table: Arc::new(CorrelationTable::new()),
            stats: Arc::new(SchedulerStats::default()),
            config,
            last_sequence: 0,
            since_sweep: 0,
            sweeps: Vec::new(),
            stop,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id().as_str() == id)
    }

    /// Ingestion handles for every target.
    pub fn handles(&self) -> Vec<TargetHandle> {
        self.targets.iter().map(Target::handle).collect()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn correlation_table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.table.len())
    }

    /// Sequence number of the most recently emitted event (`0` before the
    /// first).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Run rounds until one event is emitted.
    ///
    /// Fails with [`SchedulerError::Stopped`] once stopped, or with
    /// [`SchedulerError::Cancelled`] if the stop interrupted a barrier wait.
    pub async fn next_event(&mut self) -> Result<TraceEvent> {
        loop {
            if self.stop.is_stopped() {
                return Err(SchedulerError::Stopped);
            }
            if let Some(event) = self.round().await? {
                return Ok(event);
            }
            self.stall().await;
        }
    }

    /// Drive the scheduler until stopped or until `output` is dropped.
    /// Returns the final counters.
    pub async fn run(mut self, output: mpsc::Sender<TraceEvent>) -> Result<StatsSnapshot> {
        info!(
            targets = self.targets.len(),
            eviction_interval = self.config.eviction_interval,
            "scheduler started"
        );
        let outcome = loop {
            match self.next_event().await {
                Ok(event) => {
                    let stop = self.stop.clone();
                    tokio::select! {
                        sent = output.send(event) => {
                            if sent.is_err() {
                                debug!("output stream dropped");
                                break Ok(());
                            }
                        }
                        _ = stop.stopped() => break Ok(()),
                    }
                }
                Err(SchedulerError::Stopped | SchedulerError::Cancelled(_))
                    if self.stop.is_stopped() =>
                {
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };
        let stats = self.stats();
        info!(
            emitted = stats.emitted,
            retained = stats.correlation_table_size,
            "scheduler finished"
        );
        outcome.map(|()| stats)
    }

    /// Run on a tokio task, returning the ordered stream, a stop handle, and
    /// the task handle.
    pub fn spawn(self) -> (EventStream, StopHandle, JoinHandle<Result<StatsSnapshot>>) {
        let (tx, rx) = mpsc::channel(self.config.output_capacity.max(1));
        let stop = self.stop_handle();
        let task = tokio::spawn(self.run(tx));
        (rx, stop, task)
    }

    /// Wait for every launched eviction sweep to finish.
    pub async fn wait_for_evictions(&mut self) -> Result<Vec<EvictionReport>> {
        let mut reports = Vec::with_capacity(self.sweeps.len());
        for sweep in self.sweeps.drain(..) {
            let report = sweep
                .await
                .map_err(|e| SchedulerError::SweepFailed(e.to_string()))?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// One barrier round. Returns the emitted event, or `None` if no head
    /// was schedulable.
    async fn round(&mut self) -> Result<Option<TraceEvent>> {
        let mut heads = Vec::with_capacity(self.targets.len());
        for (index, target) in self.targets.iter().enumerate() {
            let head = target.queue().peek_blocking().await?;
            heads.push((index, head));
        }
        heads.sort_by(|(_, a), (_, b)| {
            a.local_timestamp()
                .cmp(&b.local_timestamp())
                .then_with(|| a.target().cmp(b.target()))
        });

        for (index, head) in &heads {
            let Some(rule) = self.clock_rule(head) else {
                continue;
            };
            let event = self.emit(*index, rule)?;
            return Ok(Some(event));
        }
        Ok(None)
    }

    /// Decide whether `head` can be scheduled now.
    fn clock_rule(&self, head: &TraceEvent) -> Option<ClockRule> {
        match head.kind() {
            EventKind::Send | EventKind::Internal => Some(ClockRule::Tick),
            EventKind::Receive => {
                let msg_id = head.msg_id()?;
                match self.table.lookup(msg_id) {
                    Some(send) => Some(ClockRule::Observe(send)),
                    None => {
                        self.stats.record_deferred();
                        trace!(
                            target = %head.target(),
                            msg_id = %msg_id,
                            "receive deferred; send not yet scheduled"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Commit the head of `targets[index]` and stamp it.
    fn emit(&mut self, index: usize, rule: ClockRule) -> Result<TraceEvent> {
        let target = &mut self.targets[index];
        let mut event = target.queue().commit_remove()?;

        let clock = match rule {
            ClockRule::Tick => target.tick(),
            ClockRule::Observe(send) => {
                event.resolve_dependency(send.sequence)?;
                send.receivers.insert(target.id().clone());
                event.add_participant(send.sender.clone());
                target.observe(&send.clock)
            }
        };

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        event.stamp(sequence, clock.clone())?;

        if let (EventKind::Send, Some(msg_id)) = (event.kind(), event.msg_id()) {
            self.table.register(
                msg_id.clone(),
                CorrelatedSend {
                    sequence,
                    sender: target.id().clone(),
                    clock,
                    receivers: event.participants().clone(),
                },
            );
        }

        target.set_last_event(event.clone());
        self.stats.record_emitted();
        trace!(
            seq = sequence,
            target = %event.target(),
            kind = %event.kind(),
            ts = event.local_timestamp(),
            "event scheduled"
        );

        self.since_sweep += 1;
        if self.config.eviction_interval > 0 && self.since_sweep >= self.config.eviction_interval {
            self.since_sweep = 0;
            self.launch_sweep();
        }

        Ok(event)
    }

    fn launch_sweep(&mut self) {
        let horizon: Vec<(TargetId, Option<_>)> = self
            .targets
            .iter()
            .map(|t| (t.id().clone(), t.last_clock().cloned()))
            .collect();
        debug!(entries = self.table.len(), "launching eviction sweep");
        let sweep = EvictionSweep::new(Arc::clone(&self.table), horizon, Arc::clone(&self.stats));
        self.sweeps.retain(|handle| !handle.is_finished());
        self.sweeps.push(sweep.spawn());
    }

    /// Wait after an unproductive round instead of spinning.
    async fn stall(&self) {
        self.stats.record_stall();
        debug!(
            backoff_ms = self.config.stall_backoff_ms,
            "no schedulable head; waiting"
        );
        tokio::select! {
            _ = tokio::time::sleep(self.config.stall_backoff()) => {}
            _ = self.stop.stopped() => {}
        }
    }
}
