use std::collections::HashMap;

use log::debug;

use icnfwd_core::config::{ConfigError, HelloConfig};
use icnfwd_core::face::FaceId;
use icnfwd_core::name::Name;
use icnfwd_core::packet::{MsgType, ParsedPacket, PktType};

/// Identity parsed out of a probe name: the sending side's face id and
/// the probe sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloName {
    pub face: FaceId,
    pub seq: u64,
}

/// Stateless recognizer for probe names, cheap enough to consult on the
/// per-packet path without touching the adjacency table.
///
/// A probe name is the configured prefix followed by exactly two fixed
/// width components: the 4-byte big-endian face id, then the 8-byte
/// big-endian sequence number.
#[derive(Debug, Clone)]
pub struct HelloClassifier {
    prefix: Name,
    enabled: bool,
}

impl HelloClassifier {
    pub fn new(cfg: &HelloConfig) -> Result<Self, ConfigError> {
        let prefix = Name::from_uri(&cfg.name_prefix)
            .map_err(|e| ConfigError::HelloPrefix(cfg.name_prefix.clone(), e))?;
        Ok(Self {
            prefix,
            enabled: cfg.enabled,
        })
    }

    pub fn classify(&self, name: &Name) -> Option<HelloName> {
        if !self.enabled {
            return None;
        }
        let prefix_len = self.prefix.component_count();
        if name.component_count() != prefix_len + 2 || !self.prefix.is_prefix_of(name) {
            return None;
        }
        let face: [u8; 4] = name.component(prefix_len)?.try_into().ok()?;
        let seq: [u8; 8] = name.component(prefix_len + 1)?.try_into().ok()?;
        Some(HelloName {
            face: FaceId(u32::from_be_bytes(face)),
            seq: u64::from_be_bytes(seq),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Adjacency {
    last_sent_seq: u64,
    last_received_seq: u64,
}

/// Per-face probe bookkeeping for the liveness protocol.
///
/// One probe per face per interval is produced by a caller-driven tick;
/// replies are recorded as they arrive on the data path. A face whose
/// unanswered-probe gap reaches the configured threshold is considered
/// down until a reply closes the gap again.
#[derive(Debug)]
pub struct HelloState {
    cfg: HelloConfig,
    prefix: Name,
    adjacencies: HashMap<FaceId, Adjacency>,
}

impl HelloState {
    pub fn new(cfg: HelloConfig) -> Result<Self, ConfigError> {
        let prefix = Name::from_uri(&cfg.name_prefix)
            .map_err(|e| ConfigError::HelloPrefix(cfg.name_prefix.clone(), e))?;
        Ok(Self {
            cfg,
            prefix,
            adjacencies: HashMap::new(),
        })
    }

    pub fn classifier(&self) -> HelloClassifier {
        HelloClassifier {
            prefix: self.prefix.clone(),
            enabled: self.cfg.enabled,
        }
    }

    /// Builds the next probe Interest for a face, advancing its
    /// sequence number. Probes carry hop limit 1 so they never travel
    /// past the direct neighbor.
    pub fn make_probe(&mut self, face: FaceId) -> ParsedPacket {
        let adj = self.adjacencies.entry(face).or_default();
        adj.last_sent_seq += 1;
        let mut name = self.prefix.clone();
        name.append(face.0.to_be_bytes().to_vec());
        name.append(adj.last_sent_seq.to_be_bytes().to_vec());
        ParsedPacket {
            pkt_type: PktType::Interest,
            msg_type: MsgType::HelloRequest,
            name,
            hop_limit: 1,
            lifetime_ms: None,
            cache_time_ms: None,
            payload: None,
        }
    }

    /// Records a probe reply that arrived on `from`. The face id inside
    /// the name must match the arrival face; anything else is ignored.
    /// Sequence numbers never move backward, and a reply can never
    /// acknowledge more probes than were sent.
    pub fn record_reply(&mut self, from: FaceId, hello: HelloName) {
        if hello.face != from {
            debug!(
                "ignoring probe reply for {} arriving on {}",
                hello.face, from
            );
            return;
        }
        let adj = self.adjacencies.entry(from).or_default();
        let seq = hello.seq.min(adj.last_sent_seq);
        if seq > adj.last_received_seq {
            adj.last_received_seq = seq;
        }
    }

    /// Unanswered-probe gap for a face, zero if it was never probed.
    pub fn gap(&self, face: FaceId) -> u64 {
        match self.adjacencies.get(&face) {
            Some(adj) => adj.last_sent_seq.saturating_sub(adj.last_received_seq),
            None => 0,
        }
    }

    pub fn is_peer_down(&self, face: FaceId) -> bool {
        self.gap(face) >= self.cfg.misses_down
    }

    /// Drops adjacency state when a face is removed.
    pub fn forget_face(&mut self, face: FaceId) {
        self.adjacencies.remove(&face);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> HelloState {
        HelloState::new(HelloConfig::default()).unwrap()
    }

    #[test]
    fn test_probe_name_round_trips_through_classifier() {
        let mut hello = state();
        let classifier = hello.classifier();

        let probe = hello.make_probe(FaceId(7));
        assert_eq!(probe.pkt_type, PktType::Interest);
        assert_eq!(probe.msg_type, MsgType::HelloRequest);
        assert_eq!(probe.hop_limit, 1);
        assert_eq!(
            classifier.classify(&probe.name),
            Some(HelloName {
                face: FaceId(7),
                seq: 1
            })
        );

        let probe = hello.make_probe(FaceId(7));
        assert_eq!(
            classifier.classify(&probe.name).map(|h| h.seq),
            Some(2)
        );
    }

    #[test]
    fn test_classify_rejects_foreign_names() {
        let hello = state();
        let classifier = hello.classifier();

        for uri in ["/data/video", "/local/hello", "/local/hello/x"] {
            assert_eq!(classifier.classify(&Name::from_uri(uri).unwrap()), None);
        }

        // Right arity but wrong component widths.
        let mut name = Name::from_uri("/local/hello").unwrap();
        name.append(b"face".to_vec());
        name.append(b"seq".to_vec());
        assert_eq!(classifier.classify(&name), None);
    }

    #[test]
    fn test_disabled_classifier_matches_nothing() {
        let mut hello = state();
        let probe = hello.make_probe(FaceId(1));

        let disabled = HelloClassifier::new(&HelloConfig {
            enabled: false,
            ..HelloConfig::default()
        })
        .unwrap();
        assert_eq!(disabled.classify(&probe.name), None);
    }

    #[test]
    fn test_unanswered_probes_take_peer_down() {
        let mut hello = state();
        let face = FaceId(3);

        for _ in 0..2 {
            hello.make_probe(face);
        }
        assert_eq!(hello.gap(face), 2);
        assert!(!hello.is_peer_down(face));

        hello.make_probe(face);
        assert_eq!(hello.gap(face), 3);
        assert!(hello.is_peer_down(face));
    }

    #[test]
    fn test_reply_recovers_peer() {
        let mut hello = state();
        let face = FaceId(3);
        for _ in 0..3 {
            hello.make_probe(face);
        }
        assert!(hello.is_peer_down(face));

        hello.record_reply(face, HelloName { face, seq: 3 });
        assert_eq!(hello.gap(face), 0);
        assert!(!hello.is_peer_down(face));
    }

    #[test]
    fn test_stale_reply_does_not_regress() {
        let mut hello = state();
        let face = FaceId(3);
        for _ in 0..3 {
            hello.make_probe(face);
        }
        hello.record_reply(face, HelloName { face, seq: 3 });
        hello.record_reply(face, HelloName { face, seq: 1 });
        assert_eq!(hello.gap(face), 0);
    }

    #[test]
    fn test_reply_cannot_outrun_sent_probes() {
        let mut hello = state();
        let face = FaceId(3);
        hello.make_probe(face);
        hello.record_reply(face, HelloName { face, seq: 999 });
        assert_eq!(hello.gap(face), 0);

        // The clamp keeps later real gaps visible.
        hello.make_probe(face);
        hello.make_probe(face);
        assert_eq!(hello.gap(face), 2);
    }

    #[test]
    fn test_reply_on_wrong_face_is_ignored() {
        let mut hello = state();
        let face = FaceId(3);
        hello.make_probe(face);
        hello.record_reply(
            FaceId(9),
            HelloName { face, seq: 1 },
        );
        assert_eq!(hello.gap(face), 1);
    }

    #[test]
    fn test_forget_face_clears_state() {
        let mut hello = state();
        let face = FaceId(3);
        for _ in 0..5 {
            hello.make_probe(face);
        }
        assert!(hello.is_peer_down(face));
        hello.forget_face(face);
        assert!(!hello.is_peer_down(face));
        assert_eq!(hello.gap(face), 0);
    }
}
