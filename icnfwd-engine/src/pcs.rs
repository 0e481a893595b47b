use std::time::{Duration, Instant};

use bytes::Bytes;
use log::debug;
use serde::Serialize;
use thiserror::Error;

use icnfwd_core::face::FaceId;
use icnfwd_core::hash::NameHash;
use icnfwd_core::name::Name;

/// Shared handle to a cached content payload. Cloning bumps a reference
/// count; the backing buffer is released when the last handle drops.
pub type ContentRef = Bytes;

/// Upper bound on entries removed by a single `trim_cs` call, so one
/// packet never pays for draining a deeply oversized cache.
pub const LRU_TRIM_BATCH: usize = 512;

/// Sentinel for "no slot" in chain and LRU links.
const NIL: u32 = u32::MAX;

const MIN_BUCKETS: usize = 16;

/// Payload of a pending-Interest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitData {
    /// Face the Interest was forwarded out of. Content must return on it.
    pub tx_face: FaceId,
    /// Distinct requester faces awaiting the reply, first requester first.
    pub rx_faces: Vec<FaceId>,
}

/// Payload of a content-store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsData {
    /// Face the content arrived on, kept for diagnostics.
    pub rx_face: FaceId,
    /// `None` marks a slot whose payload was already released but which
    /// has not been reclaimed yet. Such a slot is dead to lookups.
    pub content: Option<ContentRef>,
    lru_prev: u32,
    lru_next: u32,
}

/// The two entry kinds sharing one slot pool. A `Pit` entry converts to
/// `Cs` in place, exactly once, when matching content arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcsEntry {
    Pit(PitData),
    Cs(CsData),
}

#[derive(Debug)]
struct Slot {
    hash: NameHash,
    name: Name,
    create_time: Instant,
    expire_time: Instant,
    entry: PcsEntry,
    /// Next slot index in the same hash bucket, `NIL` at the end.
    chain: u32,
}

/// Outcome of a table probe for a full name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No live entry for the name.
    Miss,
    /// A pending Interest owns the name; inspect or update it through
    /// the slot index.
    Pit(u32),
    /// Cached content is live. The handle is already cloned for a reply.
    Cs { slot: u32, content: ContentRef },
}

/// Outcome of recording one more requester face on a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddRxFace {
    /// Face recorded as a new requester.
    Added,
    /// Face was already waiting, so the Interest is a retransmission.
    AlreadyPending,
    /// The requester set is at capacity and the face was not recorded.
    CapacityExhausted,
}

/// Entries removed by one opportunistic bucket scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiredCounts {
    pub pit: u64,
    pub cs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PcsError {
    #[error("entry pool exhausted")]
    NoMemory,
}

/// Counter and gauge snapshot of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PcsStats {
    pub pit_count: u64,
    pub cs_count: u64,
    pub lru_count: u64,
    pub capacity: u32,
    pub in_use: u32,
    pub pit_expired: u64,
    pub cs_expired: u64,
    pub cs_trimmed: u64,
}

/// Intrusive LRU over the CS-tagged slots, threaded through the
/// `lru_prev`/`lru_next` fields of `CsData`. Links are valid only while
/// the entry holds content; `count` always equals the number of threaded
/// entries.
#[derive(Debug)]
struct LruList {
    head: u32,
    tail: u32,
    count: u64,
    max: u64,
}

fn cs_mut(slots: &mut [Option<Slot>], idx: u32) -> Option<&mut CsData> {
    match slots.get_mut(idx as usize).and_then(|s| s.as_mut()) {
        Some(Slot {
            entry: PcsEntry::Cs(cs),
            ..
        }) => Some(cs),
        _ => None,
    }
}

impl LruList {
    fn new(max: u64) -> Self {
        Self {
            head: NIL,
            tail: NIL,
            count: 0,
            max,
        }
    }

    fn insert_head(&mut self, slots: &mut [Option<Slot>], idx: u32) {
        let old_head = self.head;
        match cs_mut(slots, idx) {
            Some(cs) => {
                cs.lru_prev = NIL;
                cs.lru_next = old_head;
            }
            None => return,
        }
        if old_head == NIL {
            self.tail = idx;
        } else if let Some(cs) = cs_mut(slots, old_head) {
            cs.lru_prev = idx;
        }
        self.head = idx;
        self.count += 1;
    }

    fn dequeue(&mut self, slots: &mut [Option<Slot>], idx: u32) {
        let (prev, next) = match cs_mut(slots, idx) {
            Some(cs) => {
                let links = (cs.lru_prev, cs.lru_next);
                cs.lru_prev = NIL;
                cs.lru_next = NIL;
                links
            }
            None => return,
        };
        if prev == NIL {
            self.head = next;
        } else if let Some(cs) = cs_mut(slots, prev) {
            cs.lru_next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else if let Some(cs) = cs_mut(slots, next) {
            cs.lru_prev = prev;
        }
        self.count = self.count.saturating_sub(1);
    }

    fn promote(&mut self, slots: &mut [Option<Slot>], idx: u32) {
        if self.head == idx {
            return;
        }
        self.dequeue(slots, idx);
        self.insert_head(slots, idx);
    }
}

/// Combined PIT and content store for one shard.
///
/// Entries of both kinds live in a single slot pool indexed by a chained
/// hash table keyed on the full-name hash. Expiration is lazy: every
/// lookup or insert first sweeps the target bucket and reclaims entries
/// whose expiry has passed, so stale state is paid for by the traffic
/// that touches its bucket instead of by a background timer. An entry at
/// exactly its expiry instant is still live; it dies strictly after.
///
/// The table is owned by exactly one shard and is not synchronized.
#[derive(Debug)]
pub struct PcsTable {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    buckets: Vec<u32>,
    bucket_mask: u64,
    capacity: u32,
    pit_rx_capacity: usize,
    pit_count: u64,
    cs_count: u64,
    lru: LruList,
    pit_expired: u64,
    cs_expired: u64,
    trimmed: u64,
}

impl PcsTable {
    /// `capacity` bounds the slot pool, `cs_max_entries` bounds the LRU
    /// (0 disables caching entirely), `pit_rx_capacity` bounds distinct
    /// requester faces per pending entry.
    pub fn new(capacity: u32, cs_max_entries: u64, pit_rx_capacity: usize) -> Self {
        let bucket_count = (capacity as usize / 4).next_power_of_two().max(MIN_BUCKETS);
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![NIL; bucket_count],
            bucket_mask: bucket_count as u64 - 1,
            capacity,
            pit_rx_capacity,
            pit_count: 0,
            cs_count: 0,
            lru: LruList::new(cs_max_entries),
            pit_expired: 0,
            cs_expired: 0,
            trimmed: 0,
        }
    }

    fn bucket_index(&self, hash: NameHash) -> usize {
        (hash.0 & self.bucket_mask) as usize
    }

    fn alloc(&mut self, slot: Slot) -> Result<u32, PcsError> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(slot);
            Ok(idx)
        } else if (self.slots.len() as u32) < self.capacity {
            self.slots.push(Some(slot));
            Ok(self.slots.len() as u32 - 1)
        } else {
            Err(PcsError::NoMemory)
        }
    }

    /// Creates a pending entry for a name with its first requester face.
    /// Callers look up first; this never replaces a live entry.
    pub fn insert_pit(
        &mut self,
        name: Name,
        hash: NameHash,
        tx_face: FaceId,
        rx_face: FaceId,
        now: Instant,
        expire: Instant,
    ) -> Result<u32, PcsError> {
        debug_assert!(expire >= now);
        self.scan_bucket_for_expired(hash, now);
        let bucket = self.bucket_index(hash);
        let head = self.buckets[bucket];
        let mut rx_faces = Vec::with_capacity(self.pit_rx_capacity);
        rx_faces.push(rx_face);
        let idx = self.alloc(Slot {
            hash,
            name,
            create_time: now,
            expire_time: expire,
            entry: PcsEntry::Pit(PitData { tx_face, rx_faces }),
            chain: head,
        })?;
        self.buckets[bucket] = idx;
        self.pit_count += 1;
        Ok(idx)
    }

    /// Probes for a live entry matching both hash and full name. Sweeps
    /// the bucket for expired entries first, so a hit is always live. A
    /// CS slot whose content was already released counts as a miss and
    /// is reclaimed on the spot.
    pub fn lookup(&mut self, hash: NameHash, name: &Name, now: Instant) -> Lookup {
        self.scan_bucket_for_expired(hash, now);
        let mut cur = self.buckets[self.bucket_index(hash)];
        while cur != NIL {
            let (found, next) = match self.slots[cur as usize].as_ref() {
                Some(slot) => (slot.hash == hash && slot.name == *name, slot.chain),
                None => (false, NIL),
            };
            if found {
                let is_pit = matches!(
                    self.slots[cur as usize].as_ref().map(|s| &s.entry),
                    Some(PcsEntry::Pit(_))
                );
                if is_pit {
                    return Lookup::Pit(cur);
                }
                let content = match self.slots[cur as usize].as_ref().map(|s| &s.entry) {
                    Some(PcsEntry::Cs(cs)) => cs.content.clone(),
                    _ => None,
                };
                return match content {
                    Some(content) => Lookup::Cs { slot: cur, content },
                    None => {
                        self.cs_expired += 1;
                        self.delete(cur);
                        Lookup::Miss
                    }
                };
            }
            cur = next;
        }
        Lookup::Miss
    }

    /// Walks one bucket and reclaims every entry whose expiry has
    /// passed. Amortizes expiration into normal traffic; a bucket no
    /// packet hashes into keeps its garbage until it is next touched.
    pub fn scan_bucket_for_expired(&mut self, hash: NameHash, now: Instant) -> ExpiredCounts {
        let mut counts = ExpiredCounts::default();
        let mut expired: Vec<u32> = Vec::new();
        let mut cur = self.buckets[self.bucket_index(hash)];
        while cur != NIL {
            match self.slots[cur as usize].as_ref() {
                Some(slot) => {
                    if now > slot.expire_time {
                        expired.push(cur);
                    }
                    cur = slot.chain;
                }
                None => break,
            }
        }
        for idx in expired {
            match self.slots[idx as usize].as_ref().map(|s| &s.entry) {
                Some(PcsEntry::Pit(_)) => counts.pit += 1,
                Some(PcsEntry::Cs(_)) => counts.cs += 1,
                None => {}
            }
            self.delete(idx);
        }
        if counts.pit + counts.cs > 0 {
            self.pit_expired += counts.pit;
            self.cs_expired += counts.cs;
            debug!(
                "expired {} pit / {} cs entries on bucket scan",
                counts.pit, counts.cs
            );
        }
        counts
    }

    /// Removes a slot from the hash index, unthreads it from the LRU if
    /// it holds content, and returns it to the free pool. Dropping the
    /// slot releases its content handle.
    pub fn delete(&mut self, idx: u32) {
        let (hash, is_pit, threaded) = match self.slots.get(idx as usize).and_then(|s| s.as_ref())
        {
            Some(slot) => (
                slot.hash,
                matches!(slot.entry, PcsEntry::Pit(_)),
                matches!(
                    slot.entry,
                    PcsEntry::Cs(CsData {
                        content: Some(_),
                        ..
                    })
                ),
            ),
            None => return,
        };
        if threaded {
            self.lru.dequeue(&mut self.slots, idx);
        }
        self.unlink_chain(hash, idx);
        if is_pit {
            self.pit_count = self.pit_count.saturating_sub(1);
        } else {
            self.cs_count = self.cs_count.saturating_sub(1);
        }
        self.slots[idx as usize] = None;
        self.free.push(idx);
    }

    fn unlink_chain(&mut self, hash: NameHash, idx: u32) {
        let next_of_idx = match self.slots[idx as usize].as_ref() {
            Some(slot) => slot.chain,
            None => return,
        };
        let bucket = self.bucket_index(hash);
        let mut cur = self.buckets[bucket];
        if cur == idx {
            self.buckets[bucket] = next_of_idx;
            return;
        }
        while cur != NIL {
            let next = match self.slots[cur as usize].as_ref() {
                Some(slot) => slot.chain,
                None => return,
            };
            if next == idx {
                if let Some(slot) = self.slots[cur as usize].as_mut() {
                    slot.chain = next_of_idx;
                }
                return;
            }
            cur = next;
        }
    }

    /// Converts a pending entry into a content-store entry in place: the
    /// slot keeps its name and hash position, gets fresh create/expire
    /// times, and is threaded at the LRU head. The PIT payload is gone
    /// afterward.
    pub fn convert_pit_to_cs(
        &mut self,
        idx: u32,
        rx_face: FaceId,
        content: ContentRef,
        now: Instant,
        expire: Instant,
    ) {
        debug_assert!(expire >= now);
        let converted = match self.slots.get_mut(idx as usize).and_then(|s| s.as_mut()) {
            Some(slot) => match slot.entry {
                PcsEntry::Pit(_) => {
                    slot.entry = PcsEntry::Cs(CsData {
                        rx_face,
                        content: Some(content),
                        lru_prev: NIL,
                        lru_next: NIL,
                    });
                    slot.create_time = now;
                    slot.expire_time = expire;
                    true
                }
                PcsEntry::Cs(_) => false,
            },
            None => false,
        };
        if !converted {
            debug_assert!(false, "conversion target is not a pending entry");
            return;
        }
        self.pit_count = self.pit_count.saturating_sub(1);
        self.cs_count += 1;
        self.lru.insert_head(&mut self.slots, idx);
    }

    /// Moves a CS entry to the LRU head. Called on every cache hit.
    pub fn promote(&mut self, idx: u32) {
        self.lru.promote(&mut self.slots, idx);
    }

    /// Records one more requester face on a pending entry, deduplicating
    /// and enforcing the capacity bound.
    pub fn add_rx_face(&mut self, idx: u32, face: FaceId) -> AddRxFace {
        let cap = self.pit_rx_capacity;
        match self.slots.get_mut(idx as usize).and_then(|s| s.as_mut()) {
            Some(Slot {
                entry: PcsEntry::Pit(pit),
                ..
            }) => {
                if pit.rx_faces.contains(&face) {
                    AddRxFace::AlreadyPending
                } else if pit.rx_faces.len() >= cap {
                    AddRxFace::CapacityExhausted
                } else {
                    pit.rx_faces.push(face);
                    AddRxFace::Added
                }
            }
            // Non-PIT slots accept no requesters.
            _ => AddRxFace::CapacityExhausted,
        }
    }

    pub fn pit(&self, idx: u32) -> Option<&PitData> {
        match self.slots.get(idx as usize).and_then(|s| s.as_ref()) {
            Some(Slot {
                entry: PcsEntry::Pit(pit),
                ..
            }) => Some(pit),
            _ => None,
        }
    }

    /// Age of a live entry at `now`. Conversion to a content-store entry
    /// restarts the clock.
    pub fn entry_age(&self, idx: u32, now: Instant) -> Option<Duration> {
        self.slots
            .get(idx as usize)
            .and_then(|s| s.as_ref())
            .map(|slot| now.saturating_duration_since(slot.create_time))
    }

    fn take_content(&mut self, idx: u32) -> Option<ContentRef> {
        match self.slots.get_mut(idx as usize).and_then(|s| s.as_mut()) {
            Some(Slot {
                entry: PcsEntry::Cs(cs),
                ..
            }) => cs.content.take(),
            _ => None,
        }
    }

    /// Evicts from the LRU tail until the cache is back under its bound,
    /// removing at most `LRU_TRIM_BATCH` entries per call. Returns the
    /// released content handles so the caller can drop them in bulk
    /// outside the table.
    pub fn trim_cs(&mut self) -> Vec<ContentRef> {
        let overflow = self.lru.count.saturating_sub(self.lru.max);
        let batch = overflow.min(LRU_TRIM_BATCH as u64);
        let mut released = Vec::with_capacity(batch as usize);
        let mut removed = 0u64;
        while removed < batch {
            let victim = self.lru.tail;
            if victim == NIL {
                break;
            }
            self.lru.dequeue(&mut self.slots, victim);
            if let Some(content) = self.take_content(victim) {
                released.push(content);
            }
            self.delete(victim);
            removed += 1;
        }
        if removed > 0 {
            self.trimmed += removed;
            debug!("trimmed {} content store entries", removed);
        }
        released
    }

    pub fn pit_count(&self) -> u64 {
        self.pit_count
    }

    pub fn cs_count(&self) -> u64 {
        self.cs_count
    }

    pub fn lru_count(&self) -> u64 {
        self.lru.count
    }

    pub fn stats(&self) -> PcsStats {
        PcsStats {
            pit_count: self.pit_count,
            cs_count: self.cs_count,
            lru_count: self.lru.count,
            capacity: self.capacity,
            in_use: (self.slots.len() - self.free.len()) as u32,
            pit_expired: self.pit_expired,
            cs_expired: self.cs_expired,
            cs_trimmed: self.trimmed,
        }
    }
}
