use serde::{Deserialize, Serialize};

/// Counter block owned by a single shard, no atomics anywhere: the
/// owning worker is the only writer, and snapshots are taken by cloning.
/// Gauges mirrored from the table (`pit_count`, `cs_count`, `lru_count`)
/// are refreshed when a snapshot is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    // Ingress, by packet kind.
    pub packets: u64,
    pub interests: u64,
    pub contents: u64,
    pub naks_in: u64,
    pub control_requests: u64,
    pub control_replies: u64,

    // Liveness protocol traffic.
    pub hello_interests: u64,
    pub hello_replies: u64,

    // Request-path outcomes.
    pub cache_hits: u64,
    pub interest_aggregations: u64,
    pub interest_retransmissions: u64,
    pub naks_sent_no_route: u64,
    pub naks_sent_hoplimit: u64,
    pub local_replies: u64,

    // Drops, total plus notable causes.
    pub dropped: u64,
    pub no_pit_drops: u64,
    pub wrong_face_drops: u64,
    pub no_memory_drops: u64,
    pub face_down_drops: u64,
    pub unknown_face_drops: u64,
    pub unsupported_drops: u64,
    pub malformed_drops: u64,
    pub queue_full_drops: u64,

    // Table housekeeping.
    pub pit_expired: u64,
    pub cs_expired: u64,
    pub cs_trimmed: u64,

    // Gauges at snapshot time.
    pub pit_count: u64,
    pub cs_count: u64,
    pub lru_count: u64,
}

impl ShardStats {
    /// Field-wise accumulation, used to fold per-shard snapshots into a
    /// node-wide view.
    pub fn merge(&mut self, other: &ShardStats) {
        self.packets += other.packets;
        self.interests += other.interests;
        self.contents += other.contents;
        self.naks_in += other.naks_in;
        self.control_requests += other.control_requests;
        self.control_replies += other.control_replies;
        self.hello_interests += other.hello_interests;
        self.hello_replies += other.hello_replies;
        self.cache_hits += other.cache_hits;
        self.interest_aggregations += other.interest_aggregations;
        self.interest_retransmissions += other.interest_retransmissions;
        self.naks_sent_no_route += other.naks_sent_no_route;
        self.naks_sent_hoplimit += other.naks_sent_hoplimit;
        self.local_replies += other.local_replies;
        self.dropped += other.dropped;
        self.no_pit_drops += other.no_pit_drops;
        self.wrong_face_drops += other.wrong_face_drops;
        self.no_memory_drops += other.no_memory_drops;
        self.face_down_drops += other.face_down_drops;
        self.unknown_face_drops += other.unknown_face_drops;
        self.unsupported_drops += other.unsupported_drops;
        self.malformed_drops += other.malformed_drops;
        self.queue_full_drops += other.queue_full_drops;
        self.pit_expired += other.pit_expired;
        self.cs_expired += other.cs_expired;
        self.cs_trimmed += other.cs_trimmed;
        self.pit_count += other.pit_count;
        self.cs_count += other.cs_count;
        self.lru_count += other.lru_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_every_field() {
        let mut total = ShardStats::default();
        let shard = ShardStats {
            packets: 10,
            interests: 6,
            contents: 3,
            naks_in: 1,
            cache_hits: 2,
            dropped: 4,
            pit_count: 5,
            ..ShardStats::default()
        };

        total.merge(&shard);
        total.merge(&shard);
        assert_eq!(total.packets, 20);
        assert_eq!(total.interests, 12);
        assert_eq!(total.contents, 6);
        assert_eq!(total.naks_in, 2);
        assert_eq!(total.cache_hits, 4);
        assert_eq!(total.dropped, 8);
        assert_eq!(total.pit_count, 10);
        assert_eq!(total.wrong_face_drops, 0);
    }

    #[test]
    fn test_stats_serialize_for_dumps() {
        let stats = ShardStats {
            packets: 7,
            cache_hits: 3,
            ..ShardStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"packets\":7"));
        assert!(json.contains("\"cache_hits\":3"));

        let back: ShardStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
