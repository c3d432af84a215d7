use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use tm_types::{MessageId, Participants, TargetId, VectorClock};

/// What a receive needs to know about its send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelatedSend {
    /// Global sequence number of the send.
    pub sequence: u64,
    /// Target that sent the message.
    pub sender: TargetId,
    /// Vector clock assigned to the send.
    pub clock: VectorClock,
    /// Receivers of the message; shared with the emitted send event.
    pub receivers: Participants,
}

/// Index of scheduled sends awaiting their receive(s), keyed by message id.
///
/// The scheduler inserts and looks up entries; eviction sweeps remove them
/// from another thread. All access goes through an internal [`RwLock`].
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: RwLock<HashMap<MessageId, CorrelatedSend>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scheduled send. A second send with the same id replaces
    /// the first.
    pub fn register(&self, msg_id: MessageId, send: CorrelatedSend) {
        let sequence = send.sequence;
        if let Some(previous) = self.write().insert(msg_id.clone(), send) {
            warn!(
                msg_id = %msg_id,
                previous_seq = previous.sequence,
                seq = sequence,
                "duplicate message id; replacing earlier send"
            );
        }
    }

    /// The send registered under `msg_id`, if any.
    pub fn lookup(&self, msg_id: &MessageId) -> Option<CorrelatedSend> {
        self.read().get(msg_id).cloned()
    }

    pub fn contains(&self, msg_id: &str) -> bool {
        self.read().contains_key(msg_id)
    }

    /// Current number of entries. Exposed as a gauge: it only shrinks when
    /// every target has causally moved past an entry.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry for which `evict` returns `true`; returns how many
    /// were removed.
    pub fn evict_where<F>(&self, mut evict: F) -> usize
    where
        F: FnMut(&MessageId, &CorrelatedSend) -> bool,
    {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|msg_id, send| !evict(msg_id, send));
        before - entries.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MessageId, CorrelatedSend>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MessageId, CorrelatedSend>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(sequence: u64) -> CorrelatedSend {
        CorrelatedSend {
            sequence,
            sender: TargetId::from("a"),
            clock: VectorClock::new().increment(&TargetId::from("a")),
            receivers: Participants::default(),
        }
    }

    #[test]
    fn register_and_lookup() {
        let table = CorrelationTable::new();
        assert!(table.lookup(&MessageId::from("m1")).is_none());

        table.register(MessageId::from("m1"), send(4));
        let found = table.lookup(&MessageId::from("m1")).unwrap();
        assert_eq!(found.sequence, 4);
        assert!(table.contains("m1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_id_replaces() {
        let table = CorrelationTable::new();
        table.register(MessageId::from("m1"), send(1));
        table.register(MessageId::from("m1"), send(9));
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(&MessageId::from("m1")).unwrap().sequence, 9);
    }

    #[test]
    fn receivers_shared_with_lookup() {
        let table = CorrelationTable::new();
        let entry = send(1);
        let receivers = entry.receivers.clone();
        table.register(MessageId::from("m1"), entry);

        let found = table.lookup(&MessageId::from("m1")).unwrap();
        found.receivers.insert(TargetId::from("b"));
        assert!(receivers.contains("b"));
    }

    #[test]
    fn evict_where_removes_matching() {
        let table = CorrelationTable::new();
        for seq in 1..=5 {
            table.register(MessageId::new(format!("m{seq}")), send(seq));
        }
        let removed = table.evict_where(|_, send| send.sequence % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(table.len(), 3);
        assert!(!table.contains("m2"));
        assert!(table.contains("m3"));
    }

    #[test]
    fn concurrent_register_and_evict() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(CorrelationTable::new());
        let writer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for seq in 0..500 {
                    table.register(MessageId::new(format!("m{seq}")), send(seq));
                }
            })
        };
        let sweeper = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let mut removed = 0;
                for _ in 0..50 {
                    removed += table.evict_where(|_, send| send.sequence < 100);
                }
                removed
            })
        };

        writer.join().unwrap();
        let removed = sweeper.join().unwrap();
        let remaining = table.len();
        assert!(removed <= 100);
        assert_eq!(remaining + removed, 500);
    }
}
