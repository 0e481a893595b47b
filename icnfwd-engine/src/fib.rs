use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use icnfwd_core::face::{FaceId, FaceRegistry};
use icnfwd_core::hash::{hash_name, NameHash, PrefixHashes, MAX_PREFIX_COMPONENTS};
use icnfwd_core::name::Name;

/// Next hops carried per prefix.
pub const MAX_NEXT_HOPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FibNextHop {
    pub face: FaceId,
    pub weight: u8,
}

/// One routed prefix with its weighted next-hop set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    pub prefix: Name,
    pub next_hops: Vec<FibNextHop>,
}

impl FibEntry {
    /// Picks the usable next hop with the highest weight. Ties go to the
    /// first maximal-weight hop in insertion order. Faces the registry
    /// does not know, or that are not usable, are skipped.
    pub fn select_next_hop(&self, faces: &FaceRegistry) -> Option<FaceId> {
        let mut best: Option<(FaceId, u8)> = None;
        for hop in &self.next_hops {
            if !hop.face.is_valid() {
                continue;
            }
            let usable = faces
                .find_by_id(hop.face)
                .map(|state| state.is_usable())
                .unwrap_or(false);
            if !usable {
                continue;
            }
            let better = match best {
                Some((_, weight)) => hop.weight > weight,
                None => true,
            };
            if better {
                best = Some((hop.face, hop.weight));
            }
        }
        best.map(|(face, _)| face)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FibError {
    #[error("prefix exceeds {MAX_PREFIX_COMPONENTS} components")]
    PrefixTooLong,
    #[error("next hop set is full")]
    NextHopsFull,
    #[error("no such route")]
    NoSuchRoute,
    #[error("fib lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FibStats {
    pub entries: u64,
    pub next_hops: u64,
    pub default_route: bool,
}

/// Prefix-indexed forwarding table.
///
/// Entries are bucketed by prefix hash; lookups verify the actual prefix
/// so hash collisions cannot misroute. The empty prefix acts as a
/// default route consulted when no longer prefix matches.
#[derive(Debug, Default)]
pub struct Fib {
    entries: HashMap<NameHash, Vec<FibEntry>>,
    default_route: Option<FibEntry>,
    entry_count: u64,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or updates one next hop under a prefix. An existing hop for
    /// the same face has its weight replaced.
    pub fn add_route(&mut self, prefix: Name, face: FaceId, weight: u8) -> Result<(), FibError> {
        if prefix.component_count() > MAX_PREFIX_COMPONENTS {
            return Err(FibError::PrefixTooLong);
        }
        let entry = if prefix.is_empty() {
            self.default_route.get_or_insert_with(|| FibEntry {
                prefix: Name::default(),
                next_hops: Vec::new(),
            })
        } else {
            let hash = hash_name(&prefix);
            let bucket = self.entries.entry(hash).or_default();
            match bucket.iter().position(|e| e.prefix == prefix) {
                Some(pos) => &mut bucket[pos],
                None => {
                    bucket.push(FibEntry {
                        prefix,
                        next_hops: Vec::new(),
                    });
                    self.entry_count += 1;
                    let pos = bucket.len() - 1;
                    &mut bucket[pos]
                }
            }
        };
        if let Some(hop) = entry.next_hops.iter_mut().find(|h| h.face == face) {
            hop.weight = weight;
            return Ok(());
        }
        if entry.next_hops.len() >= MAX_NEXT_HOPS {
            return Err(FibError::NextHopsFull);
        }
        entry.next_hops.push(FibNextHop { face, weight });
        Ok(())
    }

    /// Drops one next hop; the entry goes away with its last hop.
    pub fn remove_route(&mut self, prefix: &Name, face: FaceId) -> Result<(), FibError> {
        if prefix.is_empty() {
            let hops = match self.default_route.as_mut() {
                Some(entry) => &mut entry.next_hops,
                None => return Err(FibError::NoSuchRoute),
            };
            let before = hops.len();
            hops.retain(|h| h.face != face);
            if hops.len() == before {
                return Err(FibError::NoSuchRoute);
            }
            if hops.is_empty() {
                self.default_route = None;
            }
            return Ok(());
        }
        let hash = hash_name(prefix);
        let bucket = match self.entries.get_mut(&hash) {
            Some(bucket) => bucket,
            None => return Err(FibError::NoSuchRoute),
        };
        let pos = match bucket.iter().position(|e| e.prefix == *prefix) {
            Some(pos) => pos,
            None => return Err(FibError::NoSuchRoute),
        };
        let hops = &mut bucket[pos].next_hops;
        let before = hops.len();
        hops.retain(|h| h.face != face);
        if hops.len() == before {
            return Err(FibError::NoSuchRoute);
        }
        if hops.is_empty() {
            bucket.swap_remove(pos);
            self.entry_count = self.entry_count.saturating_sub(1);
            if bucket.is_empty() {
                self.entries.remove(&hash);
            }
        }
        Ok(())
    }

    /// Removes a face from every route, returning how many hops went
    /// away. Used when a face is torn down.
    pub fn clear_face(&mut self, face: FaceId) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, bucket| {
            bucket.retain_mut(|entry| {
                let before = entry.next_hops.len();
                entry.next_hops.retain(|h| h.face != face);
                removed += before - entry.next_hops.len();
                !entry.next_hops.is_empty()
            });
            !bucket.is_empty()
        });
        self.entry_count = 0;
        for bucket in self.entries.values() {
            self.entry_count += bucket.len() as u64;
        }
        if let Some(entry) = self.default_route.as_mut() {
            let before = entry.next_hops.len();
            entry.next_hops.retain(|h| h.face != face);
            removed += before - entry.next_hops.len();
            if entry.next_hops.is_empty() {
                self.default_route = None;
            }
        }
        removed
    }

    /// Longest-prefix match over the precomputed prefix hashes, longest
    /// first, with the default route as the final fallback. The stored
    /// prefix is checked against the name so a colliding hash never
    /// matches.
    pub fn lookup(&self, hashes: &PrefixHashes, name: &Name) -> Option<&FibEntry> {
        for len in (1..=hashes.prefix_count()).rev() {
            let hash = match hashes.prefix(len) {
                Some(hash) => hash,
                None => continue,
            };
            if let Some(bucket) = self.entries.get(&hash) {
                if let Some(entry) = bucket
                    .iter()
                    .find(|e| e.prefix.component_count() == len && e.prefix.is_prefix_of(name))
                {
                    return Some(entry);
                }
            }
        }
        self.default_route.as_ref()
    }

    pub fn len(&self) -> u64 {
        self.entry_count + u64::from(self.default_route.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> FibStats {
        let mut next_hops = 0;
        for bucket in self.entries.values() {
            for entry in bucket {
                next_hops += entry.next_hops.len() as u64;
            }
        }
        if let Some(entry) = &self.default_route {
            next_hops += entry.next_hops.len() as u64;
        }
        FibStats {
            entries: self.len(),
            next_hops,
            default_route: self.default_route.is_some(),
        }
    }
}

/// FIB shared read-mostly across shards. Route updates take the write
/// lock and bump a generation counter; the per-packet path holds the
/// read lock just long enough for one lookup.
#[derive(Debug, Default)]
pub struct SharedFib {
    inner: RwLock<Fib>,
    generation: AtomicU64,
}

impl SharedFib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&self, prefix: Name, face: FaceId, weight: u8) -> Result<(), FibError> {
        let uri = prefix.to_uri();
        let result = match self.inner.write() {
            Ok(mut fib) => fib.add_route(prefix, face, weight),
            Err(_) => {
                warn!("fib write lock poisoned, dropping route update");
                Err(FibError::Poisoned)
            }
        };
        if result.is_ok() {
            self.bump();
            info!("route added: {} -> {} weight {}", uri, face, weight);
        }
        result
    }

    pub fn remove_route(&self, prefix: &Name, face: FaceId) -> Result<(), FibError> {
        let result = match self.inner.write() {
            Ok(mut fib) => fib.remove_route(prefix, face),
            Err(_) => {
                warn!("fib write lock poisoned, dropping route update");
                Err(FibError::Poisoned)
            }
        };
        if result.is_ok() {
            self.bump();
            info!("route removed: {} -> {}", prefix.to_uri(), face);
        }
        result
    }

    pub fn clear_face(&self, face: FaceId) -> usize {
        let removed = match self.inner.write() {
            Ok(mut fib) => fib.clear_face(face),
            Err(_) => {
                warn!("fib write lock poisoned, dropping route update");
                0
            }
        };
        if removed > 0 {
            self.bump();
            info!("cleared {} next hops for {}", removed, face);
        }
        removed
    }

    /// One-shot lookup plus next-hop selection under a single read lock.
    pub fn lookup_next_hop(
        &self,
        hashes: &PrefixHashes,
        name: &Name,
        faces: &FaceRegistry,
    ) -> Option<FaceId> {
        match self.inner.read() {
            Ok(fib) => fib
                .lookup(hashes, name)
                .and_then(|entry| entry.select_next_hop(faces)),
            Err(_) => {
                warn!("fib read lock poisoned, treating as no route");
                None
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self.inner.read() {
            Ok(fib) => fib.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> FibStats {
        match self.inner.read() {
            Ok(fib) => fib.stats(),
            Err(_) => FibStats::default(),
        }
    }

    /// Readers compare generations to notice route changes without
    /// holding the lock.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use icnfwd_core::face::FaceAddr;
    use icnfwd_core::hash::hash_prefixes;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn registry_with(count: u32) -> (FaceRegistry, Vec<FaceId>) {
        let registry = FaceRegistry::new();
        let ids = (0..count)
            .map(|i| {
                registry.add(FaceAddr {
                    local: SocketAddr::from(([127, 0, 0, 1], 6363)),
                    remote: SocketAddr::from(([127, 0, 0, 1], 9000 + i as u16)),
                })
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (registry, ids) = registry_with(2);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();
        fib.add_route(name("/a/b"), ids[1], 10).unwrap();

        let target = name("/a/b/c");
        let hashes = hash_prefixes(&target);
        let entry = fib.lookup(&hashes, &target).unwrap();
        assert_eq!(entry.prefix, name("/a/b"));
        assert_eq!(entry.select_next_hop(&registry), Some(ids[1]));
    }

    #[test]
    fn test_falls_back_to_shorter_prefix() {
        let (_registry, ids) = registry_with(1);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();

        let target = name("/a/x/y/z");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        assert_eq!(entry.prefix, name("/a"));
    }

    #[test]
    fn test_no_route_for_unrelated_name() {
        let (_registry, ids) = registry_with(1);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();

        let target = name("/b/c");
        assert!(fib.lookup(&hash_prefixes(&target), &target).is_none());
    }

    #[test]
    fn test_default_route_catches_everything() {
        let (registry, ids) = registry_with(1);
        let mut fib = Fib::new();
        fib.add_route(name("/"), ids[0], 1).unwrap();

        let target = name("/anything/at/all");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        assert!(entry.prefix.is_empty());
        assert_eq!(entry.select_next_hop(&registry), Some(ids[0]));
    }

    #[test]
    fn test_highest_weight_up_face_wins_first_on_tie() {
        let (registry, ids) = registry_with(3);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();
        fib.add_route(name("/a"), ids[1], 20).unwrap();
        fib.add_route(name("/a"), ids[2], 20).unwrap();

        let target = name("/a/data");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        // ids[1] and ids[2] tie at 20; the first one added wins.
        assert_eq!(entry.select_next_hop(&registry), Some(ids[1]));
    }

    #[test]
    fn test_down_faces_are_skipped() {
        let (registry, ids) = registry_with(2);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 30).unwrap();
        fib.add_route(name("/a"), ids[1], 10).unwrap();

        registry.set_admin_up(ids[0], false);
        let target = name("/a/data");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        assert_eq!(entry.select_next_hop(&registry), Some(ids[1]));

        registry.set_admin_up(ids[1], false);
        assert_eq!(entry.select_next_hop(&registry), None);
    }

    #[test]
    fn test_hello_down_face_is_not_selected() {
        let (registry, ids) = registry_with(1);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();

        registry.set_hello_down(ids[0], true);
        let target = name("/a/data");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        assert_eq!(entry.select_next_hop(&registry), None);
    }

    #[test]
    fn test_adding_same_face_updates_weight() {
        let (_registry, ids) = registry_with(1);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();
        fib.add_route(name("/a"), ids[0], 42).unwrap();

        let target = name("/a");
        let entry = fib.lookup(&hash_prefixes(&target), &target).unwrap();
        assert_eq!(entry.next_hops.len(), 1);
        assert_eq!(entry.next_hops[0].weight, 42);
        assert_eq!(fib.len(), 1);
    }

    #[test]
    fn test_next_hop_set_is_bounded() {
        let mut fib = Fib::new();
        for i in 0..MAX_NEXT_HOPS {
            fib.add_route(name("/a"), FaceId(i as u32 + 1), 1).unwrap();
        }
        assert_eq!(
            fib.add_route(name("/a"), FaceId(99), 1),
            Err(FibError::NextHopsFull)
        );
    }

    #[test]
    fn test_prefix_depth_is_bounded() {
        let mut fib = Fib::new();
        let deep = name("/1/2/3/4/5/6/7/8/9");
        assert_eq!(
            fib.add_route(deep, FaceId(1), 1),
            Err(FibError::PrefixTooLong)
        );
    }

    #[test]
    fn test_remove_route_drops_empty_entry() {
        let (_registry, ids) = registry_with(2);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();
        fib.add_route(name("/a"), ids[1], 20).unwrap();

        fib.remove_route(&name("/a"), ids[0]).unwrap();
        assert_eq!(fib.len(), 1);
        fib.remove_route(&name("/a"), ids[1]).unwrap();
        assert_eq!(fib.len(), 0);
        assert_eq!(
            fib.remove_route(&name("/a"), ids[1]),
            Err(FibError::NoSuchRoute)
        );
    }

    #[test]
    fn test_clear_face_sweeps_all_routes() {
        let (_registry, ids) = registry_with(2);
        let mut fib = Fib::new();
        fib.add_route(name("/a"), ids[0], 10).unwrap();
        fib.add_route(name("/b"), ids[0], 10).unwrap();
        fib.add_route(name("/b"), ids[1], 10).unwrap();
        fib.add_route(name("/"), ids[0], 1).unwrap();

        assert_eq!(fib.clear_face(ids[0]), 3);
        let stats = fib.stats();
        assert_eq!(stats.entries, 1);
        assert!(!stats.default_route);
        let target = name("/b/x");
        assert!(fib.lookup(&hash_prefixes(&target), &target).is_some());
    }

    #[test]
    fn test_shared_fib_bumps_generation_on_mutation() {
        let (registry, ids) = registry_with(1);
        let fib = SharedFib::new();
        assert_eq!(fib.generation(), 0);

        fib.add_route(name("/a"), ids[0], 10).unwrap();
        assert_eq!(fib.generation(), 1);

        let target = name("/a/data");
        assert_eq!(
            fib.lookup_next_hop(&hash_prefixes(&target), &target, &registry),
            Some(ids[0])
        );

        fib.remove_route(&name("/a"), ids[0]).unwrap();
        assert_eq!(fib.generation(), 2);
        assert_eq!(
            fib.lookup_next_hop(&hash_prefixes(&target), &target, &registry),
            None
        );
    }
}
