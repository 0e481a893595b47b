use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{info, trace, warn};

use icnfwd_core::config::{ConfigError, ForwarderConfig};
use icnfwd_core::error::ForwardError;
use icnfwd_core::face::{FaceId, FaceRegistry};
use icnfwd_core::hash::{hash_name, hash_prefixes, PrefixHashes};
use icnfwd_core::name::Name;
use icnfwd_core::packet::{
    DropReason, ForwardingDecision, MsgType, NakCode, ParsedPacket, PktType,
};

use crate::fib::SharedFib;
use crate::hello::{HelloClassifier, HelloName, HelloState};
use crate::pcs::{AddRxFace, ContentRef, Lookup, PcsTable};
use crate::stats::ShardStats;

/// Per-shard packet state machine.
///
/// Owns its PIT/CS table and counter block outright; the FIB and face
/// registry are shared read-mostly collaborators. `process` is fully
/// synchronous: one packet in, one `ForwardingDecision` out, nothing
/// blocks and nothing escapes as an error. Work arriving here has
/// already been partitioned by name hash, so no other thread ever
/// touches this table.
pub struct Forwarder {
    shard_index: usize,
    config: ForwarderConfig,
    node_name: Option<Name>,
    table: PcsTable,
    fib: Arc<SharedFib>,
    faces: Arc<FaceRegistry>,
    hello: Arc<Mutex<HelloState>>,
    hello_classifier: HelloClassifier,
    cs_enabled: bool,
    stats: ShardStats,
}

impl Forwarder {
    pub fn new(
        shard_index: usize,
        config: &ForwarderConfig,
        fib: Arc<SharedFib>,
        faces: Arc<FaceRegistry>,
        hello: Arc<Mutex<HelloState>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let node_name = config.parsed_node_name()?;
        let hello_classifier = HelloClassifier::new(&config.hello)?;
        let table = PcsTable::new(
            config.pcs_max_entries,
            config.cs_max_entries,
            config.pit_aggregation_capacity,
        );
        info!(
            "forwarder shard {} up: {} table slots, cs bound {}",
            shard_index, config.pcs_max_entries, config.cs_max_entries
        );
        Ok(Self {
            shard_index,
            node_name,
            table,
            fib,
            faces,
            hello,
            hello_classifier,
            cs_enabled: config.cs_max_entries > 0,
            stats: ShardStats::default(),
            config: config.clone(),
        })
    }

    pub fn shard_index(&self) -> usize {
        self.shard_index
    }

    /// Classifies one packet and produces its forwarding decision.
    /// `now` is taken as a parameter so expiry is driven by the caller's
    /// clock, one reading per packet.
    pub fn process(
        &mut self,
        from: FaceId,
        packet: ParsedPacket,
        now: Instant,
    ) -> ForwardingDecision {
        self.stats.packets += 1;
        match packet.pkt_type {
            PktType::Interest => {
                self.stats.interests += 1;
                self.process_request(from, packet, now)
            }
            PktType::ControlRequest => {
                self.stats.control_requests += 1;
                self.process_request(from, packet, now)
            }
            PktType::Content => {
                self.stats.contents += 1;
                self.process_reply(from, packet, now)
            }
            PktType::ControlReply => {
                self.stats.control_replies += 1;
                self.process_reply(from, packet, now)
            }
            // NAKs are accounting only; they never touch the table.
            PktType::Nak => {
                self.stats.naks_in += 1;
                self.drop_packet(DropReason::NakReceived)
            }
        }
    }

    fn process_request(
        &mut self,
        from: FaceId,
        mut packet: ParsedPacket,
        now: Instant,
    ) -> ForwardingDecision {
        let face = match self.faces.find_by_id(from) {
            Some(face) => face,
            None => return self.drop_packet(DropReason::UnknownFace),
        };

        if packet.hop_limit == 0 {
            // A probe that arrives already exhausted still terminates a
            // traceroute here; anything else is too old to handle.
            if packet.msg_type == MsgType::TracerouteRequest {
                return self.local_reply(from, packet, MsgType::TracerouteReply);
            }
            return self.drop_packet(DropReason::HopLimitZero);
        }
        packet.hop_limit -= 1;

        // Liveness probes are reflected before the face-state gate; the
        // probe reply is what brings a hello-down adjacency back.
        if self.hello_classifier.classify(&packet.name).is_some() {
            self.stats.hello_interests += 1;
            self.stats.local_replies += 1;
            return ForwardingDecision::Forward {
                face: from,
                packet: packet.into_reply(MsgType::HelloReply),
            };
        }

        if !face.is_usable() {
            return self.drop_packet(DropReason::FaceDown);
        }

        if packet.hop_limit == 0 {
            return self.hop_limit_edge(from, packet);
        }

        // An echo or traceroute target is a node prefix plus two trailing
        // components; shorter names address no node.
        if packet.pkt_type == PktType::ControlRequest
            && matches!(
                packet.msg_type,
                MsgType::EchoRequest | MsgType::TracerouteRequest
            )
            && packet.name.component_count() < 3
        {
            return self.drop_packet(DropReason::Unsupported);
        }

        if self.is_for_us(&packet) {
            let reply_msg = match packet.msg_type {
                MsgType::EchoRequest => MsgType::EchoReply,
                _ => MsgType::TracerouteReply,
            };
            return self.local_reply(from, packet, reply_msg);
        }

        let hashes = hash_prefixes(&packet.name);
        match self.table.lookup(hashes.full(), &packet.name, now) {
            Lookup::Cs { slot, content } => {
                self.table.promote(slot);
                self.stats.cache_hits += 1;
                trace!("cache hit for {}", packet.name.to_uri());
                ForwardingDecision::ReplyFromCache {
                    faces: vec![from],
                    packet: packet.into_content_reply(content),
                }
            }
            Lookup::Pit(slot) => self.join_pending(from, slot, packet),
            Lookup::Miss => self.forward_new_request(from, packet, &hashes, now),
        }
    }

    /// An Interest whose name already has a pending entry either joins
    /// it (aggregation) or, for a face already recorded, re-forwards out
    /// the previously selected hop without fresh state.
    fn join_pending(&mut self, from: FaceId, slot: u32, packet: ParsedPacket) -> ForwardingDecision {
        match self.table.add_rx_face(slot, from) {
            AddRxFace::AlreadyPending => {
                self.stats.interest_retransmissions += 1;
                let tx_face = match self.table.pit(slot) {
                    Some(pit) => pit.tx_face,
                    None => return self.reject(from, packet, ForwardError::NoPitEntry),
                };
                let usable = self
                    .faces
                    .find_by_id(tx_face)
                    .map(|state| state.is_usable())
                    .unwrap_or(false);
                if !usable {
                    return self.reject(from, packet, ForwardError::FaceDown);
                }
                ForwardingDecision::Forward {
                    face: tx_face,
                    packet,
                }
            }
            AddRxFace::Added => {
                self.stats.interest_aggregations += 1;
                self.drop_packet(DropReason::Aggregated)
            }
            AddRxFace::CapacityExhausted => {
                self.stats.interest_aggregations += 1;
                self.drop_packet(DropReason::AggregationCapacity)
            }
        }
    }

    fn forward_new_request(
        &mut self,
        from: FaceId,
        packet: ParsedPacket,
        hashes: &PrefixHashes,
        now: Instant,
    ) -> ForwardingDecision {
        let next = match self.fib.lookup_next_hop(hashes, &packet.name, &self.faces) {
            Some(next) => next,
            None => return self.reject(from, packet, ForwardError::NoRoute),
        };
        let lifetime = self.config.effective_pit_lifetime_ms(packet.lifetime_ms);
        let expire = now + Duration::from_millis(lifetime);
        match self
            .table
            .insert_pit(packet.name.clone(), hashes.full(), next, from, now, expire)
        {
            Ok(_) => ForwardingDecision::Forward { face: next, packet },
            Err(_) => self.reject(from, packet, ForwardError::NoMemory),
        }
    }

    fn process_reply(
        &mut self,
        from: FaceId,
        packet: ParsedPacket,
        now: Instant,
    ) -> ForwardingDecision {
        let face = match self.faces.find_by_id(from) {
            Some(face) => face,
            None => return self.drop_packet(DropReason::UnknownFace),
        };
        if !face.is_usable() {
            // The one thing accepted from a hello-down face is a probe
            // reply, which is what revives it.
            if let Some(hello) = self.hello_classifier.classify(&packet.name) {
                return self.record_hello_reply(from, hello);
            }
            return self.drop_packet(DropReason::FaceDown);
        }

        let hash = hash_name(&packet.name);
        match self.table.lookup(hash, &packet.name, now) {
            Lookup::Miss => {
                // Probes are sent without pending state, so their
                // replies always land here.
                if let Some(hello) = self.hello_classifier.classify(&packet.name) {
                    return self.record_hello_reply(from, hello);
                }
                self.reject(from, packet, ForwardError::NoPitEntry)
            }
            Lookup::Cs { .. } => self.drop_packet(DropReason::DuplicateContent),
            Lookup::Pit(slot) => self.satisfy_pending(from, slot, packet, now),
        }
    }

    /// Content (or a control reply) matched a pending entry: fan the
    /// reply out to every live requester, and either convert the entry
    /// into a cache entry or delete it.
    fn satisfy_pending(
        &mut self,
        from: FaceId,
        slot: u32,
        packet: ParsedPacket,
        now: Instant,
    ) -> ForwardingDecision {
        let (tx_face, rx_faces) = match self.table.pit(slot) {
            Some(pit) => (pit.tx_face, pit.rx_faces.clone()),
            None => return self.reject(from, packet, ForwardError::NoPitEntry),
        };
        if tx_face != from {
            // Content must return on the face the Interest left on. The
            // entry stays: the legitimate reply may still arrive.
            return self.reject(from, packet, ForwardError::WrongFace);
        }

        let faces: Vec<FaceId> = rx_faces
            .into_iter()
            .filter(|&rx| {
                self.faces
                    .find_by_id(rx)
                    .map(|state| state.is_usable())
                    .unwrap_or(false)
            })
            .collect();

        let cacheable = self.cs_enabled
            && packet.pkt_type == PktType::Content
            && packet.msg_type == MsgType::Content
            && packet.payload.is_some();
        if cacheable {
            let lifetime = self.config.effective_cs_lifetime_ms(packet.cache_time_ms);
            let expire = now + Duration::from_millis(lifetime);
            if let Some(content) = packet.payload.clone() {
                self.table.convert_pit_to_cs(slot, from, content, now, expire);
            }
        } else {
            self.table.delete(slot);
        }

        if faces.is_empty() {
            return self.drop_packet(DropReason::NoLiveRequesters);
        }
        ForwardingDecision::ReplyFromCache { faces, packet }
    }

    /// Hop limit ran out after the decrement. Traceroutes terminate here
    /// with a local reply naming this node; an echo addressed to us is
    /// still answered; everything else bounces back as a NAK.
    fn hop_limit_edge(&mut self, from: FaceId, packet: ParsedPacket) -> ForwardingDecision {
        if packet.msg_type == MsgType::TracerouteRequest {
            return self.local_reply(from, packet, MsgType::TracerouteReply);
        }
        if packet.msg_type == MsgType::EchoRequest && self.is_for_us(&packet) {
            return self.local_reply(from, packet, MsgType::EchoReply);
        }
        self.reject(from, packet, ForwardError::HopLimitExceeded)
    }

    /// An echo or traceroute request addressed to this node: the target
    /// name is the configured node name plus two trailing components.
    fn is_for_us(&self, packet: &ParsedPacket) -> bool {
        let node = match &self.node_name {
            Some(node) => node,
            None => return false,
        };
        if packet.pkt_type != PktType::ControlRequest {
            return false;
        }
        if !matches!(
            packet.msg_type,
            MsgType::EchoRequest | MsgType::TracerouteRequest
        ) {
            return false;
        }
        node.component_count() + 2 == packet.name.component_count()
            && node.is_prefix_of(&packet.name)
    }

    fn local_reply(
        &mut self,
        from: FaceId,
        packet: ParsedPacket,
        msg_type: MsgType,
    ) -> ForwardingDecision {
        self.stats.local_replies += 1;
        let mut reply = packet.into_reply(msg_type);
        reply.payload = Some(self.node_payload());
        ForwardingDecision::Forward {
            face: from,
            packet: reply,
        }
    }

    /// Identity blob carried by echo and traceroute replies.
    fn node_payload(&self) -> Bytes {
        match &self.node_name {
            Some(name) => Bytes::from(name.to_uri().into_bytes()),
            None => Bytes::from_static(b"no-name"),
        }
    }

    fn record_hello_reply(&mut self, from: FaceId, hello: HelloName) -> ForwardingDecision {
        self.stats.hello_replies += 1;
        match self.hello.lock() {
            Ok(mut state) => state.record_reply(from, hello),
            Err(_) => warn!("hello state lock poisoned, probe reply not recorded"),
        }
        self.drop_packet(DropReason::HelloRecorded)
    }

    /// Maps a forwarding failure onto its outward effect: a NAK back to
    /// the sender for the answerable failures, a counted silent drop for
    /// the rest.
    fn reject(
        &mut self,
        from: FaceId,
        packet: ParsedPacket,
        err: ForwardError,
    ) -> ForwardingDecision {
        if let Some(code) = err.nak_code() {
            match code {
                NakCode::NoRoute => self.stats.naks_sent_no_route += 1,
                NakCode::HopLimitExceeded => self.stats.naks_sent_hoplimit += 1,
                NakCode::NoResources => {}
            }
            trace!("nak {:?} for {} toward {}", code, packet.name.to_uri(), from);
            return ForwardingDecision::Nak {
                face: from,
                code,
                packet: packet.into_nak(),
            };
        }
        let reason = match err {
            ForwardError::NoMemory => DropReason::NoMemory,
            ForwardError::NoPitEntry => DropReason::NoPitEntry,
            ForwardError::WrongFace => DropReason::WrongFace,
            ForwardError::FaceDown => DropReason::FaceDown,
            ForwardError::UnknownFace => DropReason::UnknownFace,
            // Answerable failures returned above.
            ForwardError::NoRoute | ForwardError::HopLimitExceeded => DropReason::Unsupported,
        };
        self.drop_packet(reason)
    }

    fn drop_packet(&mut self, reason: DropReason) -> ForwardingDecision {
        self.stats.dropped += 1;
        match reason {
            DropReason::NoPitEntry => self.stats.no_pit_drops += 1,
            DropReason::WrongFace => self.stats.wrong_face_drops += 1,
            DropReason::NoMemory => self.stats.no_memory_drops += 1,
            DropReason::FaceDown => self.stats.face_down_drops += 1,
            DropReason::UnknownFace => self.stats.unknown_face_drops += 1,
            DropReason::Unsupported => self.stats.unsupported_drops += 1,
            _ => {}
        }
        trace!("drop: {:?}", reason);
        ForwardingDecision::Drop { reason }
    }

    /// Evicts cache overflow, bounded per call. The shard loop runs this
    /// between batches and drops the returned handles in bulk.
    pub fn trim_cs(&mut self) -> Vec<ContentRef> {
        self.table.trim_cs()
    }

    /// Counter snapshot with the table gauges folded in.
    pub fn stats(&self) -> ShardStats {
        let mut stats = self.stats.clone();
        let table = self.table.stats();
        stats.pit_expired = table.pit_expired;
        stats.cs_expired = table.cs_expired;
        stats.cs_trimmed = table.cs_trimmed;
        stats.pit_count = table.pit_count;
        stats.cs_count = table.cs_count;
        stats.lru_count = table.lru_count;
        stats
    }
}
