use thiserror::Error;

use crate::packet::NakCode;

/// Per-packet failure classes inside the forwarding path.
///
/// Every one of these is an ordinary local event: the engine maps it onto
/// a drop or NAK decision plus a counter and moves to the next packet.
/// None of them aborts a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("no route toward name")]
    NoRoute,
    #[error("hop limit exceeded")]
    HopLimitExceeded,
    #[error("table pool exhausted")]
    NoMemory,
    #[error("no pending entry for content")]
    NoPitEntry,
    #[error("content arrived on unexpected face")]
    WrongFace,
    #[error("face is down")]
    FaceDown,
    #[error("unknown face")]
    UnknownFace,
}

impl ForwardError {
    /// NAK code for the failures that are answered toward the requester.
    /// The rest are silent drops.
    pub fn nak_code(self) -> Option<NakCode> {
        match self {
            ForwardError::NoRoute => Some(NakCode::NoRoute),
            ForwardError::HopLimitExceeded => Some(NakCode::HopLimitExceeded),
            _ => None,
        }
    }
}

/// Raised by the packet codec collaborator when wire bytes do not form a
/// usable message. The engine only accounts these; malformed bytes never
/// reach a shard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated packet")]
    Truncated,
    #[error("unknown packet type {0:#04x}")]
    UnknownPktType(u8),
    #[error("bad name encoding")]
    BadName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_route_and_hop_failures_nak() {
        assert_eq!(ForwardError::NoRoute.nak_code(), Some(NakCode::NoRoute));
        assert_eq!(
            ForwardError::HopLimitExceeded.nak_code(),
            Some(NakCode::HopLimitExceeded)
        );
        assert_eq!(ForwardError::NoMemory.nak_code(), None);
        assert_eq!(ForwardError::WrongFace.nak_code(), None);
        assert_eq!(ForwardError::UnknownFace.nak_code(), None);
    }

    #[test]
    fn test_display_is_stable() {
        assert_eq!(ForwardError::NoRoute.to_string(), "no route toward name");
        assert_eq!(
            ParseError::UnknownPktType(0xab).to_string(),
            "unknown packet type 0xab"
        );
    }
}
