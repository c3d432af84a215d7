use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tm_scheduler::TargetHandle;
use tm_types::{MessageId, TargetId, TraceEvent};

use crate::error::{SourceError, SourceResult};

/// Tuning for [`SimulationSource`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Upper bound of the pause between two steps of one target. Each pause
    /// is drawn from `[period / 4, period)`.
    pub period_ms: u64,
    /// Seed for reproducible runs. Target `i` uses `seed + i`.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            seed: None,
        }
    }
}

/// Message in flight between two simulated targets.
#[derive(Debug)]
struct Envelope {
    msg_id: MessageId,
    from: TargetId,
}

/// Stand-in for real observers: each target runs a random walk of local
/// steps and message exchanges, feeding its queue like an instrumented
/// device would.
///
/// Per step a target first handles at most one message from its inbox
/// (recording a receive and answering it with probability 1/3), then either
/// sends to a random peer (probability 1/3) or records an internal event.
/// A send is always admitted to the sender's queue before the message is
/// delivered, so a receive never reaches the scheduler without its send.
pub struct SimulationSource {
    handles: Vec<TargetHandle>,
    config: SimulationConfig,
}

impl SimulationSource {
    pub fn new(handles: Vec<TargetHandle>, config: SimulationConfig) -> SourceResult<Self> {
        if handles.len() < 2 {
            return Err(SourceError::TooFewTargets(handles.len()));
        }
        Ok(Self { handles, config })
    }

    /// Spawn one task per target.
    pub fn start(self) -> SimulationHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let ids: Vec<TargetId> = self.handles.iter().map(|h| h.id().clone()).collect();

        let (senders, receivers): (Vec<_>, Vec<_>) =
            self.handles.iter().map(|_| mpsc::unbounded_channel()).unzip();

        let period = Duration::from_millis(self.config.period_ms.max(4));
        let tasks = self
            .handles
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(index, (handle, inbox))| {
                let rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                    None => StdRng::from_entropy(),
                };
                let node = SimulatedTarget {
                    index,
                    handle,
                    peers: ids.clone(),
                    outboxes: senders.clone(),
                    inbox,
                    rng,
                    period,
                    sent: 0,
                    produced: 0,
                    last_ts: 0,
                };
                tokio::spawn(node.run(stop_rx.clone()))
            })
            .collect();

        info!(targets = ids.len(), period_ms = period.as_millis() as u64, "simulation started");
        SimulationHandle {
            stop: stop_tx,
            tasks,
        }
    }
}

/// Controls a running simulation.
pub struct SimulationHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<u64>>,
}

impl SimulationHandle {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop every task and wait for it. Returns the number of events
    /// produced in total.
    pub async fn join(self) -> SourceResult<u64> {
        self.stop();
        let mut produced = 0;
        for task in self.tasks {
            produced += task
                .await
                .map_err(|e| SourceError::TaskFailed(e.to_string()))?;
        }
        info!(produced, "simulation stopped");
        Ok(produced)
    }
}

struct SimulatedTarget {
    index: usize,
    handle: TargetHandle,
    peers: Vec<TargetId>,
    outboxes: Vec<mpsc::UnboundedSender<Envelope>>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    rng: StdRng,
    period: Duration,
    sent: u64,
    produced: u64,
    last_ts: u64,
}

impl SimulatedTarget {
    async fn run(mut self, mut stop: watch::Receiver<bool>) -> u64 {
        self.handle.set_ready(true);
        while !*stop.borrow() {
            let pause = self.rng.gen_range(self.period / 4..self.period);
            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            self.step();
        }
        self.handle.set_ready(false);
        debug!(target = %self.handle.id(), produced = self.produced, "simulated target finished");
        self.produced
    }

    fn step(&mut self) {
        if let Ok(envelope) = self.inbox.try_recv() {
            let ts = self.timestamp();
            self.record(TraceEvent::receive(self.handle.id().clone(), ts, envelope.msg_id));
            if self.rng.gen_ratio(1, 3) {
                if let Some(peer) = self.peers.iter().position(|p| *p == envelope.from) {
                    self.send_to(peer);
                }
            }
        }

        if self.rng.gen_ratio(1, 3) {
            let mut peer = self.rng.gen_range(0..self.peers.len() - 1);
            if peer >= self.index {
                peer += 1;
            }
            self.send_to(peer);
        } else {
            let ts = self.timestamp();
            self.record(TraceEvent::internal(self.handle.id().clone(), ts));
        }
    }

    fn send_to(&mut self, peer: usize) {
        let msg_id = MessageId::sequential(self.handle.id(), self.sent);
        self.sent += 1;
        let ts = self.timestamp();
        self.record(TraceEvent::send(self.handle.id().clone(), ts, msg_id.clone()));
        let envelope = Envelope {
            msg_id,
            from: self.handle.id().clone(),
        };
        // A peer that already stopped simply never receives.
        let _ = self.outboxes[peer].send(envelope);
    }

    /// Wall-clock milliseconds, never behind the previous event.
    fn timestamp(&mut self) -> u64 {
        self.last_ts = self.last_ts.max(now_ms());
        self.last_ts
    }

    fn record(&mut self, event: TraceEvent) {
        self.handle.add(event);
        self.produced += 1;
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
