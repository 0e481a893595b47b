use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::face::FaceId;
use crate::name::Name;

/// Hop limit stamped onto locally-generated replies.
pub const DEFAULT_HOP_LIMIT: u8 = 128;

/// Wire-level packet class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PktType {
    Interest,
    Content,
    Nak,
    ControlRequest,
    ControlReply,
}

/// Message semantics within a packet class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    Interest,
    Content,
    EchoRequest,
    EchoReply,
    TracerouteRequest,
    TracerouteReply,
    HelloRequest,
    HelloReply,
}

/// Reason carried by a NAK sent back toward the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NakCode {
    NoRoute,
    HopLimitExceeded,
    NoResources,
}

/// Pre-parsed view of one wire message, handed in by the packet codec.
///
/// The engine never touches wire bytes; it sees the name, the type fields
/// and the few header values forwarding decisions depend on. The payload
/// handle is refcounted, so cloning a packet never copies content bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPacket {
    pub pkt_type: PktType,
    pub msg_type: MsgType,
    pub name: Name,
    pub hop_limit: u8,
    /// Requested pending-Interest lifetime, when the packet carried one.
    pub lifetime_ms: Option<u64>,
    /// Requested cache residency, when the packet carried one.
    pub cache_time_ms: Option<u64>,
    /// Content payload; `None` for requests.
    pub payload: Option<Bytes>,
}

impl ParsedPacket {
    /// Plain Interest for `name`.
    pub fn interest(name: Name) -> Self {
        Self {
            pkt_type: PktType::Interest,
            msg_type: MsgType::Interest,
            name,
            hop_limit: DEFAULT_HOP_LIMIT,
            lifetime_ms: None,
            cache_time_ms: None,
            payload: None,
        }
    }

    /// Plain Content carrying `payload`.
    pub fn content(name: Name, payload: Bytes) -> Self {
        Self {
            pkt_type: PktType::Content,
            msg_type: MsgType::Content,
            name,
            hop_limit: DEFAULT_HOP_LIMIT,
            lifetime_ms: None,
            cache_time_ms: None,
            payload: Some(payload),
        }
    }

    /// Control request (echo, traceroute, hello) for `name`.
    pub fn control_request(name: Name, msg_type: MsgType) -> Self {
        Self {
            pkt_type: PktType::ControlRequest,
            msg_type,
            name,
            hop_limit: DEFAULT_HOP_LIMIT,
            lifetime_ms: None,
            cache_time_ms: None,
            payload: None,
        }
    }

    /// Rewrite this request container into a locally-generated control
    /// reply: same name, reply message type, fresh hop limit, no payload.
    pub fn into_reply(mut self, msg_type: MsgType) -> Self {
        self.pkt_type = PktType::ControlReply;
        self.msg_type = msg_type;
        self.hop_limit = DEFAULT_HOP_LIMIT;
        self.lifetime_ms = None;
        self.cache_time_ms = None;
        self.payload = None;
        self
    }

    /// Rewrite this request container into a Content reply carrying a
    /// cached payload handle.
    pub fn into_content_reply(mut self, payload: Bytes) -> Self {
        self.pkt_type = PktType::Content;
        self.msg_type = MsgType::Content;
        self.hop_limit = DEFAULT_HOP_LIMIT;
        self.lifetime_ms = None;
        self.cache_time_ms = None;
        self.payload = Some(payload);
        self
    }

    /// Rewrite this request container into a NAK bounced to its sender.
    pub fn into_nak(mut self) -> Self {
        self.pkt_type = PktType::Nak;
        self.payload = None;
        self
    }
}

/// Outcome of processing one packet. The host I/O layer executes it; the
/// engine itself never writes to a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardingDecision {
    /// Send the packet out one selected face.
    Forward { face: FaceId, packet: ParsedPacket },
    /// Deliver one reply to every listed face: a content-store hit, or the
    /// fan-out to all requesters pending on a just-satisfied Interest. The
    /// last listed face reuses the packet container; earlier faces get
    /// cheap clones.
    ReplyFromCache {
        faces: Vec<FaceId>,
        packet: ParsedPacket,
    },
    /// Bounce a NAK back to the sender.
    Nak {
        face: FaceId,
        code: NakCode,
        packet: ParsedPacket,
    },
    /// Consume the packet locally.
    Drop { reason: DropReason },
}

/// Why a packet was consumed without producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Arrival face is not in the registry.
    UnknownFace,
    /// Arrival face is administratively or liveness down.
    FaceDown,
    /// Hop limit was already zero on arrival.
    HopLimitZero,
    /// Interest joined an existing pending entry.
    Aggregated,
    /// Pending entry exists but its requester set is full.
    AggregationCapacity,
    /// Table pool exhausted; nothing was recorded.
    NoMemory,
    /// Content with no pending entry for its name.
    NoPitEntry,
    /// Content arrived on a face other than the one the Interest left on.
    WrongFace,
    /// Content for a name the cache already holds.
    DuplicateContent,
    /// Every pending requester face went down meanwhile.
    NoLiveRequesters,
    /// NAKs are accounted and consumed, nothing else.
    NakReceived,
    /// Liveness probe reply, recorded against its adjacency.
    HelloRecorded,
    /// Packet class the engine does not handle.
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_constructor() {
        let pkt = ParsedPacket::interest(Name::from_uri("/a/b").unwrap());
        assert_eq!(pkt.pkt_type, PktType::Interest);
        assert_eq!(pkt.msg_type, MsgType::Interest);
        assert_eq!(pkt.hop_limit, DEFAULT_HOP_LIMIT);
        assert!(pkt.payload.is_none());
    }

    #[test]
    fn test_into_reply_resets_hop_limit() {
        let mut pkt =
            ParsedPacket::control_request(Name::from_uri("/n").unwrap(), MsgType::EchoRequest);
        pkt.hop_limit = 1;
        let reply = pkt.into_reply(MsgType::EchoReply);
        assert_eq!(reply.pkt_type, PktType::ControlReply);
        assert_eq!(reply.msg_type, MsgType::EchoReply);
        assert_eq!(reply.hop_limit, DEFAULT_HOP_LIMIT);
    }

    #[test]
    fn test_into_content_reply_attaches_payload() {
        let pkt = ParsedPacket::interest(Name::from_uri("/a").unwrap());
        let reply = pkt.into_content_reply(Bytes::from_static(b"payload"));
        assert_eq!(reply.pkt_type, PktType::Content);
        assert_eq!(reply.msg_type, MsgType::Content);
        assert_eq!(reply.payload.as_deref(), Some(b"payload".as_slice()));
    }

    #[test]
    fn test_into_nak_strips_payload() {
        let pkt = ParsedPacket::content(Name::from_uri("/a").unwrap(), Bytes::from_static(b"x"));
        let nak = pkt.into_nak();
        assert_eq!(nak.pkt_type, PktType::Nak);
        assert!(nak.payload.is_none());
    }
}
