use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Face identifier. Id 0 is reserved and never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl FaceId {
    pub const INVALID: FaceId = FaceId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face{}", self.0)
    }
}

/// Local/remote endpoint pair identifying one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceAddr {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

/// Snapshot of one face's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceState {
    pub id: FaceId,
    pub addr: FaceAddr,
    /// Administratively enabled.
    pub admin_up: bool,
    /// Marked down by the liveness protocol.
    pub hello_down: bool,
}

impl FaceState {
    /// A face carries traffic only when administratively up and not
    /// declared dead by the liveness protocol.
    pub fn is_usable(&self) -> bool {
        self.admin_up && !self.hello_down
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: HashMap<FaceId, FaceState>,
    by_addr: HashMap<FaceAddr, FaceId>,
    next_id: u32,
}

/// Registry of known faces, shared read-mostly across every shard.
///
/// The link layer owns face lifecycle; the forwarding path only reads.
/// Mutations bump a generation counter so long-lived readers can notice
/// change without holding the lock.
#[derive(Debug)]
pub struct FaceRegistry {
    inner: RwLock<RegistryInner>,
    generation: AtomicU64,
}

impl FaceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_id: HashMap::new(),
                by_addr: HashMap::new(),
                next_id: 1,
            }),
            generation: AtomicU64::new(1),
        }
    }

    /// Register a face for an endpoint pair, or return the existing id if
    /// the pair is already known. New faces start admin-up.
    pub fn add(&self, addr: FaceAddr) -> FaceId {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(&existing) = inner.by_addr.get(&addr) {
                return existing;
            }
            let id = FaceId(inner.next_id);
            inner.next_id += 1;
            inner.by_addr.insert(addr, id);
            inner.by_id.insert(
                id,
                FaceState {
                    id,
                    addr,
                    admin_up: true,
                    hello_down: false,
                },
            );
            self.bump_generation();
            info!("registered {} ({} -> {})", id, addr.local, addr.remote);
            id
        } else {
            warn!("face registry lock poisoned on add");
            FaceId::INVALID
        }
    }

    /// Remove a face. Returns its last state when it existed.
    pub fn remove(&self, id: FaceId) -> Option<FaceState> {
        if let Ok(mut inner) = self.inner.write() {
            let state = inner.by_id.remove(&id)?;
            inner.by_addr.remove(&state.addr);
            self.bump_generation();
            info!("removed {}", id);
            Some(state)
        } else {
            None
        }
    }

    pub fn find_by_id(&self, id: FaceId) -> Option<FaceState> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.by_id.get(&id).cloned())
    }

    pub fn find_by_addr(&self, addr: &FaceAddr) -> Option<FaceId> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.by_addr.get(addr).copied())
    }

    /// Flip the administrative state. Returns false for unknown faces.
    pub fn set_admin_up(&self, id: FaceId, up: bool) -> bool {
        self.update_state(id, |state| {
            if state.admin_up != up {
                info!("{} admin {}", id, if up { "up" } else { "down" });
            }
            state.admin_up = up;
        })
    }

    /// Flip the liveness-down flag. Returns false for unknown faces.
    pub fn set_hello_down(&self, id: FaceId, down: bool) -> bool {
        self.update_state(id, |state| {
            if state.hello_down != down {
                info!("{} hello {}", id, if down { "down" } else { "up" });
            }
            state.hello_down = down;
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every registered face, in no particular order.
    pub fn ids(&self) -> Vec<FaceId> {
        self.inner
            .read()
            .map(|inner| inner.by_id.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Monotonic counter bumped on every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn update_state(&self, id: FaceId, f: impl FnOnce(&mut FaceState)) -> bool {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(state) = inner.by_id.get_mut(&id) {
                f(state);
                self.bump_generation();
                return true;
            }
        }
        false
    }
}

impl Default for FaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
