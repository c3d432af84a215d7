use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::identity::{MessageId, TargetId};
use crate::vector_clock::VectorClock;

/// Scheduling class of an event. Decides which clock rule the scheduler
/// applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A message leaving the owning target.
    Send,
    /// A message arriving at the owning target.
    Receive,
    /// Anything that does not cross a target boundary.
    Internal,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Send => "SEND",
            Self::Receive => "RECEIVE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// What the observer captured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Message sent to one or more other targets.
    Send { msg_id: MessageId },
    /// Message received from another target.
    Receive { msg_id: MessageId },
    /// Function entered or exited.
    Function {
        function_address: u64,
        call_site: u64,
        enter: bool,
    },
    /// Watched memory location read or written.
    Memory { address: u64, value: u64, write: bool },
    /// Log line emitted by the target.
    Log { message: String },
    /// The observer's trace buffer overflowed; events were lost on the target.
    Overflow,
    /// Liveness signal from the observer.
    Heartbeat,
    /// Generic local action without further detail.
    Internal,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Send { .. } => EventKind::Send,
            Self::Receive { .. } => EventKind::Receive,
            Self::Function { .. }
            | Self::Memory { .. }
            | Self::Log { .. }
            | Self::Overflow
            | Self::Heartbeat
            | Self::Internal => EventKind::Internal,
        }
    }

    pub fn msg_id(&self) -> Option<&MessageId> {
        match self {
            Self::Send { msg_id } | Self::Receive { msg_id } => Some(msg_id),
            _ => None,
        }
    }

    /// Transient events take part in scheduling but are not part of the
    /// reconstructed trace.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

/// The other side(s) of a message.
///
/// For a send these are the receivers, for a receive the sender. The set is
/// shared between clones: a send that has already left the scheduler still
/// learns about receivers matched later.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeSet<TargetId>", into = "BTreeSet<TargetId>")]
pub struct Participants(Arc<RwLock<BTreeSet<TargetId>>>);

impl Participants {
    pub fn insert(&self, target: TargetId) -> bool {
        self.0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(target)
    }

    /// Point-in-time copy of the set.
    pub fn snapshot(&self) -> BTreeSet<TargetId> {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<BTreeSet<TargetId>> for Participants {
    fn from(set: BTreeSet<TargetId>) -> Self {
        Self(Arc::new(RwLock::new(set)))
    }
}

impl From<Participants> for BTreeSet<TargetId> {
    fn from(participants: Participants) -> Self {
        participants.snapshot()
    }
}

impl PartialEq for Participants {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.snapshot() == other.snapshot()
    }
}

impl Eq for Participants {}

impl fmt::Debug for Participants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.snapshot().iter()).finish()
    }
}

impl fmt::Display for Participants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.snapshot().iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// A single event captured on one target.
///
/// Built by the ingestion layer with its owning target, local capture
/// timestamp, and payload. The vector clock, global sequence number, and
/// (for receives) the dependency are absent until the scheduler assigns them
/// and cannot be reassigned afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    id: Uuid,
    target: TargetId,
    local_timestamp: u64,
    payload: EventPayload,
    participants: Participants,
    vector_clock: Option<VectorClock>,
    sequence: Option<u64>,
    dependency: Option<u64>,
}

impl TraceEvent {
    pub fn new(target: TargetId, local_timestamp: u64, payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            target,
            local_timestamp,
            payload,
            participants: Participants::default(),
            vector_clock: None,
            sequence: None,
            dependency: None,
        }
    }

    pub fn send(target: impl Into<TargetId>, local_timestamp: u64, msg_id: impl Into<MessageId>) -> Self {
        Self::new(
            target.into(),
            local_timestamp,
            EventPayload::Send {
                msg_id: msg_id.into(),
            },
        )
    }

    pub fn receive(
        target: impl Into<TargetId>,
        local_timestamp: u64,
        msg_id: impl Into<MessageId>,
    ) -> Self {
        Self::new(
            target.into(),
            local_timestamp,
            EventPayload::Receive {
                msg_id: msg_id.into(),
            },
        )
    }

    pub fn internal(target: impl Into<TargetId>, local_timestamp: u64) -> Self {
        Self::new(target.into(), local_timestamp, EventPayload::Internal)
    }

    /// Unique id used to follow the event through the pipeline.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Timestamp from the target's own, unsynchronized capture clock.
    pub fn local_timestamp(&self) -> u64 {
        self.local_timestamp
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn msg_id(&self) -> Option<&MessageId> {
        self.payload.msg_id()
    }

    pub fn is_transient(&self) -> bool {
        self.payload.is_transient()
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    /// Record a target on the other side of this message.
    pub fn add_participant(&self, target: TargetId) {
        self.participants.insert(target);
    }

    pub fn vector_clock(&self) -> Option<&VectorClock> {
        self.vector_clock.as_ref()
    }

    /// Global sequence number, assigned when the event leaves the scheduler.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Sequence number of the matching send, for a resolved receive.
    pub fn dependency(&self) -> Option<u64> {
        self.dependency
    }

    pub fn is_stamped(&self) -> bool {
        self.sequence.is_some()
    }

    /// Assign the scheduler's vector clock and global sequence number.
    pub fn stamp(&mut self, sequence: u64, clock: VectorClock) -> Result<(), TypeError> {
        if self.sequence.is_some() || self.vector_clock.is_some() {
            return Err(TypeError::AlreadyStamped(self.id));
        }
        self.sequence = Some(sequence);
        self.vector_clock = Some(clock);
        Ok(())
    }

    /// Link a receive to the sequence number of its send.
    pub fn resolve_dependency(&mut self, send_sequence: u64) -> Result<(), TypeError> {
        if self.kind() != EventKind::Receive {
            return Err(TypeError::NotAReceive(self.id));
        }
        if self.dependency.is_some() {
            return Err(TypeError::DependencyAlreadySet(self.id));
        }
        self.dependency = Some(send_sequence);
        Ok(())
    }

    /// Returns `true` if both events are stamped and this one's vector clock
    /// is causally after the other's.
    pub fn vector_clock_is_after(&self, other: &TraceEvent) -> bool {
        match (&self.vector_clock, &other.vector_clock) {
            (Some(mine), Some(theirs)) => mine.is_after(theirs),
            _ => false,
        }
    }

    /// Human-readable description without the target prefix.
    pub fn describe(&self) -> String {
        match &self.payload {
            EventPayload::Send { msg_id } => {
                format!("SEND  message {msg_id} to {}", self.participants)
            }
            EventPayload::Receive { msg_id } => {
                format!("RCV   message {msg_id} from {}", self.participants)
            }
            EventPayload::Function {
                function_address,
                call_site,
                enter,
            } => format!(
                "{} function {function_address:#010x}, called from {call_site:#010x}",
                if *enter { "ENTER" } else { "EXIT " }
            ),
            EventPayload::Memory {
                address,
                value,
                write,
            } => format!(
                "{} address {address:#010x}: {value:#X}",
                if *write { "WRITE" } else { "READ " }
            ),
            EventPayload::Log { message } => format!("INFO: {message}"),
            EventPayload::Overflow => "INFO: ITM_OVERFLOW".to_owned(),
            EventPayload::Heartbeat => "HEARTBEAT".to_owned(),
            EventPayload::Internal => "LOCAL".to_owned(),
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.target)?;
        if let Some(seq) = self.sequence {
            write!(f, "{seq} ")?;
        }
        f.write_str(&self.describe())
    }
}
