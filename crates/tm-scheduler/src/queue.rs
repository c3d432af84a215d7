use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use tm_types::{TargetId, TraceEvent};

use crate::error::{Result, SchedulerError};

/// FIFO of admitted events for one target with a two-phase consume.
///
/// Producers call [`add`](EventQueue::add) from any task. Exactly one
/// consumer drives [`peek_blocking`](EventQueue::peek_blocking) followed by
/// [`commit_remove`](EventQueue::commit_remove); between the two it may
/// inspect other queues and decide not to commit at all; the head then
/// stays in place for the next peek.
///
/// The number of admitted-but-uncommitted events is tracked in its own
/// counter. It is raised only after an event is in storage and lowered only
/// on commit, so a peek that observes a non-zero count always finds a head.
pub struct EventQueue {
    target: TargetId,
    entries: Mutex<VecDeque<TraceEvent>>,
    available: AtomicUsize,
    peeked: AtomicBool,
    closed: AtomicBool,
    notify: Notify,
}

impl EventQueue {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            entries: Mutex::new(VecDeque::new()),
            available: AtomicUsize::new(0),
            peeked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// The target this queue belongs to.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Admit an event at the tail. Never blocks and never rejects.
    pub fn add(&self, event: TraceEvent) {
        self.entries().push_back(event);
        self.available.fetch_add(1, Ordering::AcqRel);
        // Single consumer: a stored permit covers an add racing the wait.
        self.notify.notify_one();
    }

    /// Return a copy of the head once one exists, waiting for an admission
    /// if the queue is empty. The head is not removed.
    ///
    /// Fails with [`SchedulerError::Cancelled`] once the queue is closed.
    pub async fn peek_blocking(&self) -> Result<TraceEvent> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(SchedulerError::Cancelled(self.target.clone()));
            }
            if self.available.load(Ordering::Acquire) > 0 {
                if let Some(head) = self.entries().front().cloned() {
                    self.peeked.store(true, Ordering::Release);
                    return Ok(head);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Return a copy of the head without waiting.
    pub fn try_peek(&self) -> Option<TraceEvent> {
        if self.available.load(Ordering::Acquire) == 0 {
            return None;
        }
        let head = self.entries().front().cloned();
        if head.is_some() {
            self.peeked.store(true, Ordering::Release);
        }
        head
    }

    /// Remove and return the element most recently returned by a peek.
    pub fn commit_remove(&self) -> Result<TraceEvent> {
        if !self.peeked.swap(false, Ordering::AcqRel) {
            return Err(SchedulerError::CommitWithoutPeek(self.target.clone()));
        }
        let event = self
            .entries()
            .pop_front()
            .ok_or_else(|| SchedulerError::CommitWithoutPeek(self.target.clone()))?;
        self.available.fetch_sub(1, Ordering::AcqRel);
        Ok(event)
    }

    /// Current number of queued events (diagnostics only).
    pub fn size(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Wake the consumer and make every further peek fail with
    /// [`SchedulerError::Cancelled`]. Queued events are kept.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(target = %self.target, pending = self.size(), "event queue closed");
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<TraceEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("target", &self.target)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}
