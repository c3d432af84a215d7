use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid vector clock literal: {0}")]
    InvalidVectorClock(String),

    #[error("unknown event kind {0}")]
    UnknownEventKind(i32),

    #[error("unknown {kind} subtype {subtype}")]
    UnknownSubtype { kind: &'static str, subtype: i32 },

    #[error("trace packet is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("event {0} is already stamped")]
    AlreadyStamped(uuid::Uuid),

    #[error("event {0} is not a receive event")]
    NotAReceive(uuid::Uuid),

    #[error("dependency of event {0} is already resolved")]
    DependencyAlreadySet(uuid::Uuid),
}
