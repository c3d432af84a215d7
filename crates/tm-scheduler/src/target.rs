use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tm_types::{TargetId, TraceEvent, VectorClock};

use crate::queue::EventQueue;

/// Readiness and host metadata, written by the ingestion layer.
#[derive(Debug, Default)]
struct TargetStatus {
    ready: AtomicBool,
    host: RwLock<Option<String>>,
}

/// Scheduling state of one traced target.
///
/// The vector clock and the last emitted event are owned by the scheduler
/// and only change through [`tick`](Target::tick),
/// [`observe`](Target::observe), and the scheduler's bookkeeping. The queue
/// and the readiness metadata are shared with the ingestion layer through
/// [`TargetHandle`].
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    queue: Arc<EventQueue>,
    status: Arc<TargetStatus>,
    clock: VectorClock,
    last_event: Option<TraceEvent>,
}

impl Target {
    /// Create a target whose clock starts at zero for every id in `all_ids`.
    pub fn new<I>(id: TargetId, all_ids: I) -> Self
    where
        I: IntoIterator<Item = TargetId>,
    {
        Self {
            queue: Arc::new(EventQueue::new(id.clone())),
            status: Arc::new(TargetStatus::default()),
            clock: VectorClock::with_keys(all_ids),
            last_event: None,
            id,
        }
    }

    /// Create one target per id, each clock covering the whole set.
    pub fn group<I>(ids: I) -> Vec<Self>
    where
        I: IntoIterator<Item = TargetId>,
    {
        let ids: Vec<TargetId> = ids.into_iter().collect();
        ids.iter()
            .map(|id| Self::new(id.clone(), ids.iter().cloned()))
            .collect()
    }

    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// A cloneable handle for the ingestion layer.
    pub fn handle(&self) -> TargetHandle {
        TargetHandle {
            id: self.id.clone(),
            queue: Arc::clone(&self.queue),
            status: Arc::clone(&self.status),
        }
    }

    /// Current vector clock.
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Last event of this target that left the scheduler, if any.
    pub fn last_event(&self) -> Option<&TraceEvent> {
        self.last_event.as_ref()
    }

    /// Vector clock of the last emitted event, if any.
    pub fn last_clock(&self) -> Option<&VectorClock> {
        self.last_event.as_ref().and_then(TraceEvent::vector_clock)
    }

    /// Advance the own component. Used for send and internal events.
    pub fn tick(&mut self) -> VectorClock {
        self.clock = self.clock.increment(&self.id);
        self.clock.clone()
    }

    /// Advance the own component, then absorb everything the sender knew.
    /// Used for receive events.
    pub fn observe(&mut self, remote: &VectorClock) -> VectorClock {
        self.clock = self.clock.increment(&self.id).merge(remote);
        self.clock.clone()
    }

    pub(crate) fn set_last_event(&mut self, event: TraceEvent) {
        self.last_event = Some(event);
    }

    pub fn is_ready(&self) -> bool {
        self.status.ready.load(Ordering::Acquire)
    }

    pub fn host(&self) -> Option<String> {
        read_host(&self.status)
    }
}

/// Shared view of a [`Target`] for producers: admits events and updates
/// readiness metadata, but cannot touch the clock.
#[derive(Clone, Debug)]
pub struct TargetHandle {
    id: TargetId,
    queue: Arc<EventQueue>,
    status: Arc<TargetStatus>,
}

impl TargetHandle {
    pub fn id(&self) -> &TargetId {
        &self.id
    }

    /// Admit a captured event into the target's queue.
    pub fn add(&self, event: TraceEvent) {
        self.queue.add(event);
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn set_ready(&self, ready: bool) {
        self.status.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.status.ready.load(Ordering::Acquire)
    }

    pub fn set_host(&self, host: impl Into<String>) {
        *self
            .status
            .host
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(host.into());
    }

    pub fn host(&self) -> Option<String> {
        read_host(&self.status)
    }
}

fn read_host(status: &TargetStatus) -> Option<String> {
    status
        .host
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_types::Clock;

    fn ids() -> Vec<TargetId> {
        ["a", "b", "c"].into_iter().map(TargetId::from).collect()
    }

    #[test]
    fn starts_with_zero_clock_over_all_targets() {
        let target = Target::new(TargetId::from("a"), ids());
        assert_eq!(target.clock().to_string(), "{a=0, b=0, c=0}");
        assert!(target.last_event().is_none());
        assert!(target.last_clock().is_none());
    }

    #[test]
    fn tick_advances_only_own_component() {
        let mut target = Target::new(TargetId::from("b"), ids());
        let first = target.tick();
        let second = target.tick();
        assert_eq!(first.to_string(), "{a=0, b=1, c=0}");
        assert_eq!(second.to_string(), "{a=0, b=2, c=0}");
        assert!(second.is_after(&first));
        assert_eq!(target.clock(), &second);
    }

    #[test]
    fn observe_ticks_then_merges() {
        let mut sender = Target::new(TargetId::from("a"), ids());
        sender.tick();
        let sent = sender.tick();

        let mut receiver = Target::new(TargetId::from("b"), ids());
        let received = receiver.observe(&sent);
        assert_eq!(received.get("a"), Clock::new(2));
        assert_eq!(received.get("b"), Clock::new(1));
        assert!(received.is_after(&sent));
        // The sender's snapshot is untouched.
        assert_eq!(sent.get("b"), Clock::ZERO);
    }

    #[test]
    fn group_shares_key_domain() {
        let group = Target::group(ids());
        assert_eq!(group.len(), 3);
        for target in &group {
            assert_eq!(target.clock().len(), 3);
        }
    }

    #[test]
    fn handle_admits_into_target_queue() {
        let target = Target::new(TargetId::from("a"), ids());
        let handle = target.handle();
        handle.add(TraceEvent::internal("a", 1));
        assert_eq!(target.queue().size(), 1);
        assert_eq!(handle.id().as_str(), "a");
    }

    #[test]
    fn readiness_and_host_are_shared() {
        let target = Target::new(TargetId::from("a"), ids());
        let handle = target.handle();
        assert!(!target.is_ready());
        assert!(target.host().is_none());

        handle.set_ready(true);
        handle.set_host("observer-1");
        assert!(target.is_ready());
        assert_eq!(target.host().as_deref(), Some("observer-1"));
        assert_eq!(handle.host().as_deref(), Some("observer-1"));
    }

    #[test]
    fn last_event_tracks_clock() {
        let mut target = Target::new(TargetId::from("a"), ids());
        let clock = target.tick();
        let mut event = TraceEvent::internal("a", 1);
        event.stamp(1, clock.clone()).unwrap();
        target.set_last_event(event);
        assert_eq!(target.last_clock(), Some(&clock));
    }
}
