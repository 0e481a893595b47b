pub mod fib;
pub mod forwarder;
pub mod hello;
pub mod pcs;
pub mod shard;
pub mod stats;

// Forwarding state machine exports
pub use forwarder::Forwarder;

// PIT/CS table exports
pub use pcs::{
    AddRxFace, ContentRef, CsData, ExpiredCounts, Lookup, PcsEntry, PcsError, PcsStats, PcsTable,
    PitData, LRU_TRIM_BATCH,
};

// Routing exports
pub use fib::{Fib, FibEntry, FibError, FibNextHop, FibStats, SharedFib, MAX_NEXT_HOPS};

// Adjacency liveness exports
pub use hello::{HelloClassifier, HelloName, HelloState};

// Work distribution exports
pub use shard::{assign_shard, effective_shard_count, ShardSet, WorkItem};

// Counter exports
pub use stats::ShardStats;
