use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use icnfwd_core::config::{ConfigError, ForwarderConfig};
use icnfwd_core::error::ParseError;
use icnfwd_core::face::{FaceId, FaceRegistry};
use icnfwd_core::hash::{hash_name, NameHash};
use icnfwd_core::packet::{ForwardingDecision, ParsedPacket};

use crate::fib::SharedFib;
use crate::forwarder::Forwarder;
use crate::hello::HelloState;
use crate::stats::ShardStats;

/// Items drained from a shard queue in one go before the cache trim
/// runs.
const WORKER_BATCH: usize = 64;

/// Per-shard ingress queue depth. Overflow is dropped at dispatch, not
/// buffered.
const QUEUE_DEPTH: usize = 1024;

/// One unit of work routed to a shard.
#[derive(Debug)]
pub struct WorkItem {
    pub from: FaceId,
    pub packet: ParsedPacket,
    pub received_at: Instant,
}

/// Shard index for a name hash. Every packet for a given name maps to
/// the same shard, which is what gives each name a total order without
/// any locking in the packet path.
pub fn assign_shard(hash: NameHash, shard_count: usize) -> usize {
    debug_assert!(shard_count >= 1);
    let h = hash.0 as usize;
    if shard_count.is_power_of_two() {
        h & (shard_count - 1)
    } else {
        h % shard_count
    }
}

/// Worker count to use when the configuration leaves it at zero: the
/// largest power of two not above the machine's logical CPU count.
pub fn effective_shard_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    let cpus = num_cpus::get().max(1);
    if cpus.is_power_of_two() {
        cpus
    } else {
        cpus.next_power_of_two() / 2
    }
}

async fn worker_loop(
    mut forwarder: Forwarder,
    mut rx: mpsc::Receiver<WorkItem>,
    out: mpsc::Sender<(usize, ForwardingDecision)>,
) -> ShardStats {
    let index = forwarder.shard_index();
    let mut batch = Vec::with_capacity(WORKER_BATCH);
    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < WORKER_BATCH {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }
        for item in batch.drain(..) {
            let decision = forwarder.process(item.from, item.packet, item.received_at);
            if out.send((index, decision)).await.is_err() {
                error!("shard {}: decision channel closed, stopping", index);
                return forwarder.stats();
            }
        }
        // Cache overflow is shed between batches, off the packet path;
        // the handles are released in one bulk drop.
        drop(forwarder.trim_cs());
    }
    drop(forwarder.trim_cs());
    info!("shard {} drained", index);
    forwarder.stats()
}

/// The set of forwarding workers plus the shared state they consult.
///
/// Packets enter through `dispatch`, which is synchronous and never
/// blocks: it hashes the name, picks the shard, and hands the item to
/// that worker's queue. Decisions come back on the channel given to
/// `start`, tagged with the shard index that produced them.
pub struct ShardSet {
    shard_count: usize,
    senders: Vec<mpsc::Sender<WorkItem>>,
    handles: Vec<JoinHandle<ShardStats>>,
    fib: Arc<SharedFib>,
    faces: Arc<FaceRegistry>,
    hello: Arc<Mutex<HelloState>>,
    malformed: AtomicU64,
    queue_full: AtomicU64,
}

impl ShardSet {
    pub fn start(
        config: &ForwarderConfig,
        faces: Arc<FaceRegistry>,
        decisions: mpsc::Sender<(usize, ForwardingDecision)>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let shard_count = effective_shard_count(config.shard_count);
        let fib = Arc::new(SharedFib::new());
        let hello = Arc::new(Mutex::new(HelloState::new(config.hello.clone())?));

        let mut senders = Vec::with_capacity(shard_count);
        let mut handles = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let forwarder =
                Forwarder::new(index, config, fib.clone(), faces.clone(), hello.clone())?;
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            senders.push(tx);
            handles.push(tokio::spawn(worker_loop(forwarder, rx, decisions.clone())));
        }
        info!("started {} forwarding shards", shard_count);

        Ok(Self {
            shard_count,
            senders,
            handles,
            fib,
            faces,
            hello,
            malformed: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Shared routing table, for the control surface that adds and
    /// removes routes while the workers run.
    pub fn fib(&self) -> &Arc<SharedFib> {
        &self.fib
    }

    /// Routes one parse result to its shard. Returns false when the
    /// packet was dropped at the door, either malformed or bound for a
    /// shard whose queue is full.
    pub fn dispatch(
        &self,
        from: FaceId,
        parsed: Result<ParsedPacket, ParseError>,
        now: Instant,
    ) -> bool {
        let packet = match parsed {
            Ok(packet) => packet,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("malformed packet from {}: {}", from, err);
                return false;
            }
        };
        let shard = assign_shard(hash_name(&packet.name), self.shard_count);
        let item = WorkItem {
            from,
            packet,
            received_at: now,
        };
        match self.senders[shard].try_send(item) {
            Ok(()) => true,
            Err(_) => {
                self.queue_full.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Builds the next liveness probe for a face. Probes are transmitted
    /// by the caller directly and leave no pending state behind.
    pub fn make_probe(&self, face: FaceId) -> Option<ParsedPacket> {
        match self.hello.lock() {
            Ok(mut state) => Some(state.make_probe(face)),
            Err(_) => {
                warn!("hello state lock poisoned, no probe for {}", face);
                None
            }
        }
    }

    pub fn hello_peer_down(&self, face: FaceId) -> bool {
        self.hello
            .lock()
            .map(|state| state.is_peer_down(face))
            .unwrap_or(false)
    }

    /// Reconciles the per-face liveness flags with the recorded probe
    /// gaps. Returns how many faces changed state.
    pub fn refresh_hello_flags(&self) -> usize {
        let verdicts: Vec<(FaceId, bool)> = match self.hello.lock() {
            Ok(state) => self
                .faces
                .ids()
                .into_iter()
                .map(|id| (id, state.is_peer_down(id)))
                .collect(),
            Err(_) => {
                warn!("hello state lock poisoned, liveness flags not refreshed");
                return 0;
            }
        };
        let mut changed = 0;
        for (id, down) in verdicts {
            let current = match self.faces.find_by_id(id) {
                Some(state) => state.hello_down,
                None => continue,
            };
            if current != down && self.faces.set_hello_down(id, down) {
                changed += 1;
            }
        }
        changed
    }

    /// Face teardown: drops the face itself, its routes, and its probe
    /// history. Returns how many routes were cleared.
    pub fn remove_face(&self, face: FaceId) -> usize {
        if let Ok(mut state) = self.hello.lock() {
            state.forget_face(face);
        }
        self.faces.remove(face);
        self.fib.clear_face(face)
    }

    /// Stops every worker and collects their final counter snapshots.
    /// Edge drops recorded at dispatch are folded into the first
    /// shard's block.
    pub async fn shutdown(mut self) -> Vec<ShardStats> {
        self.senders.clear();
        let mut all = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(stats) => all.push(stats),
                Err(err) => {
                    warn!("shard worker aborted: {}", err);
                    all.push(ShardStats::default());
                }
            }
        }
        if let Some(first) = all.first_mut() {
            first.malformed_drops += self.malformed.load(Ordering::Relaxed);
            first.queue_full_drops += self.queue_full.load(Ordering::Relaxed);
        }
        all
    }
}
