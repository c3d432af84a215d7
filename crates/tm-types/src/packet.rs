use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::event::{EventPayload, TraceEvent};
use crate::identity::{MessageId, TargetId};

/// Compact event record as emitted by an observer.
///
/// Field names are single letters to keep the JSON small on the wire:
///
/// | field | meaning                                    |
/// |-------|--------------------------------------------|
/// | `i`   | packet type (absent for heartbeats)        |
/// | `j`   | packet subtype                             |
/// | `f`   | called function address                    |
/// | `c`   | call site address                          |
/// | `a`   | memory address                             |
/// | `v`   | memory value                               |
/// | `m`   | message id                                 |
/// | `l`   | log message                                |
/// | `t`   | local capture timestamp                    |
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<u64>,
}

impl TracePacket {
    pub const TYPE_MEMORY: i32 = 0;
    pub const TYPE_FUNCTION: i32 = 1;
    pub const TYPE_MESSAGE: i32 = 2;
    pub const TYPE_OVERFLOW: i32 = 3;
    pub const TYPE_LOG: i32 = 4;

    pub const SUBTYPE_WRITE: i32 = 0;
    pub const SUBTYPE_READ: i32 = 1;
    pub const SUBTYPE_ENTER: i32 = 0;
    pub const SUBTYPE_EXIT: i32 = 1;
    pub const SUBTYPE_SEND: i32 = 0;
    pub const SUBTYPE_RECEIVE: i32 = 1;

    /// Packet for a message send or receive.
    pub fn message(send: bool, msg_id: &MessageId, timestamp: u64) -> Self {
        Self {
            i: Some(Self::TYPE_MESSAGE),
            j: Some(if send {
                Self::SUBTYPE_SEND
            } else {
                Self::SUBTYPE_RECEIVE
            }),
            m: Some(msg_id.as_str().to_owned()),
            t: Some(timestamp),
            ..Default::default()
        }
    }

    /// Packet for a log line.
    pub fn log(message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            i: Some(Self::TYPE_LOG),
            l: Some(message.into()),
            t: Some(timestamp),
            ..Default::default()
        }
    }

    /// Heartbeat packet (no type).
    pub fn heartbeat(timestamp: u64) -> Self {
        Self {
            t: Some(timestamp),
            ..Default::default()
        }
    }

    /// Decode into the payload it describes.
    ///
    /// Unknown types and subtypes are rejected rather than guessed, since the
    /// kind decides how the scheduler treats the event.
    pub fn payload(&self) -> Result<EventPayload, TypeError> {
        let Some(kind) = self.i else {
            return Ok(EventPayload::Heartbeat);
        };
        match kind {
            Self::TYPE_MEMORY => {
                let write = match self.subtype()? {
                    Self::SUBTYPE_WRITE => true,
                    Self::SUBTYPE_READ => false,
                    other => {
                        return Err(TypeError::UnknownSubtype {
                            kind: "memory",
                            subtype: other,
                        })
                    }
                };
                Ok(EventPayload::Memory {
                    address: self.a.ok_or(TypeError::MissingField("a"))?,
                    value: self.v.ok_or(TypeError::MissingField("v"))?,
                    write,
                })
            }
            Self::TYPE_FUNCTION => {
                let enter = match self.subtype()? {
                    Self::SUBTYPE_ENTER => true,
                    Self::SUBTYPE_EXIT => false,
                    other => {
                        return Err(TypeError::UnknownSubtype {
                            kind: "function",
                            subtype: other,
                        })
                    }
                };
                Ok(EventPayload::Function {
                    function_address: self.f.ok_or(TypeError::MissingField("f"))?,
                    call_site: self.c.ok_or(TypeError::MissingField("c"))?,
                    enter,
                })
            }
            Self::TYPE_MESSAGE => {
                let msg_id = self
                    .m
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .map(MessageId::from)
                    .ok_or(TypeError::MissingField("m"))?;
                match self.subtype()? {
                    Self::SUBTYPE_SEND => Ok(EventPayload::Send { msg_id }),
                    Self::SUBTYPE_RECEIVE => Ok(EventPayload::Receive { msg_id }),
                    other => Err(TypeError::UnknownSubtype {
                        kind: "message",
                        subtype: other,
                    }),
                }
            }
            Self::TYPE_OVERFLOW => Ok(EventPayload::Overflow),
            Self::TYPE_LOG => Ok(EventPayload::Log {
                message: self.l.clone().unwrap_or_default(),
            }),
            other => Err(TypeError::UnknownEventKind(other)),
        }
    }

    /// Decode into an unstamped event owned by `target`.
    pub fn into_event(self, target: TargetId) -> Result<TraceEvent, TypeError> {
        let timestamp = self.t.ok_or(TypeError::MissingField("t"))?;
        let payload = self.payload()?;
        Ok(TraceEvent::new(target, timestamp, payload))
    }

    fn subtype(&self) -> Result<i32, TypeError> {
        self.j.ok_or(TypeError::MissingField("j"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn target() -> TargetId {
        TargetId::from("node-0")
    }

    #[test]
    fn decode_message_packets() {
        let send = TracePacket::message(true, &MessageId::from("m1"), 10)
            .into_event(target())
            .unwrap();
        assert_eq!(send.kind(), EventKind::Send);
        assert_eq!(send.msg_id().map(MessageId::as_str), Some("m1"));
        assert_eq!(send.local_timestamp(), 10);

        let receive = TracePacket::message(false, &MessageId::from("m1"), 11)
            .into_event(target())
            .unwrap();
        assert_eq!(receive.kind(), EventKind::Receive);
    }

    #[test]
    fn message_without_id_is_rejected() {
        let packet = TracePacket {
            i: Some(TracePacket::TYPE_MESSAGE),
            j: Some(TracePacket::SUBTYPE_SEND),
            t: Some(1),
            ..Default::default()
        };
        assert_eq!(packet.payload(), Err(TypeError::MissingField("m")));

        let empty = TracePacket {
            m: Some(String::new()),
            ..packet
        };
        assert_eq!(empty.payload(), Err(TypeError::MissingField("m")));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let packet = TracePacket {
            i: Some(9),
            t: Some(1),
            ..Default::default()
        };
        assert_eq!(
            packet.into_event(target()).unwrap_err(),
            TypeError::UnknownEventKind(9)
        );
    }

    #[test]
    fn unknown_subtype_is_rejected() {
        let packet = TracePacket {
            i: Some(TracePacket::TYPE_FUNCTION),
            j: Some(5),
            f: Some(1),
            c: Some(2),
            t: Some(1),
            ..Default::default()
        };
        assert_eq!(
            packet.payload(),
            Err(TypeError::UnknownSubtype {
                kind: "function",
                subtype: 5
            })
        );
    }

    #[test]
    fn missing_timestamp_is_rejected() {
        let packet = TracePacket {
            i: Some(TracePacket::TYPE_OVERFLOW),
            ..Default::default()
        };
        assert_eq!(
            packet.into_event(target()).unwrap_err(),
            TypeError::MissingField("t")
        );
    }

    #[test]
    fn decode_internal_variants() {
        let memory = TracePacket {
            i: Some(TracePacket::TYPE_MEMORY),
            j: Some(TracePacket::SUBTYPE_WRITE),
            a: Some(0x2000_0000),
            v: Some(42),
            t: Some(1),
            ..Default::default()
        };
        assert_eq!(
            memory.payload().unwrap(),
            EventPayload::Memory {
                address: 0x2000_0000,
                value: 42,
                write: true
            }
        );

        let function = TracePacket {
            i: Some(TracePacket::TYPE_FUNCTION),
            j: Some(TracePacket::SUBTYPE_EXIT),
            f: Some(0x800),
            c: Some(0x400),
            t: Some(1),
            ..Default::default()
        };
        assert_eq!(
            function.payload().unwrap(),
            EventPayload::Function {
                function_address: 0x800,
                call_site: 0x400,
                enter: false
            }
        );

        assert_eq!(
            TracePacket::log("hello", 1).payload().unwrap(),
            EventPayload::Log {
                message: "hello".into()
            }
        );
        assert_eq!(
            TracePacket::heartbeat(1).payload().unwrap(),
            EventPayload::Heartbeat
        );
    }

    #[test]
    fn parse_observer_json() {
        let json = r#"{"i":2,"j":1,"m":"0_3","t":1700}"#;
        let packet: TracePacket = serde_json::from_str(json).unwrap();
        let event = packet.into_event(target()).unwrap();
        assert_eq!(event.kind(), EventKind::Receive);
        assert_eq!(event.msg_id().map(MessageId::as_str), Some("0_3"));
        assert_eq!(event.local_timestamp(), 1700);
    }

    #[test]
    fn serializes_compactly() {
        let json = serde_json::to_string(&TracePacket::heartbeat(5)).unwrap();
        assert_eq!(json, r#"{"t":5}"#);
    }
}
