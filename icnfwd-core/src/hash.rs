use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;

use crate::name::Name;

/// Number of leading prefix lengths tracked by a single hashing pass.
/// Longer names still get a correct full-name hash; only the first
/// `MAX_PREFIX_COMPONENTS` prefix hashes are retained, which matches the
/// longest prefix the FIB accepts.
pub const MAX_PREFIX_COMPONENTS: usize = 8;

/// 64-bit hash of a full name. Table keys, never trusted alone: every
/// lookup re-verifies the full name against the stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameHash(pub u64);

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Full-name hash plus the hash of every leading prefix, computed in one
/// incremental pass over the components.
#[derive(Debug, Clone)]
pub struct PrefixHashes {
    full: NameHash,
    prefixes: Vec<NameHash>,
    component_count: usize,
}

impl PrefixHashes {
    pub fn full(&self) -> NameHash {
        self.full
    }

    /// Number of prefix hashes retained (`min(component_count, 8)`).
    pub fn prefix_count(&self) -> usize {
        self.prefixes.len()
    }

    /// Hash of the prefix formed by the first `components` components.
    pub fn prefix(&self, components: usize) -> Option<NameHash> {
        if components == 0 {
            return None;
        }
        self.prefixes.get(components - 1).copied()
    }

    pub fn component_count(&self) -> usize {
        self.component_count
    }
}

// Components are length-framed into the hasher so that component
// boundaries are unambiguous: ["ab","c"] and ["a","bc"] must not collide
// by construction.
fn write_component(hasher: &mut DefaultHasher, component: &[u8]) {
    hasher.write_u64(component.len() as u64);
    hasher.write(component);
}

/// Hash a full name. Deterministic: equal names hash equal across calls,
/// shards and processes.
pub fn hash_name(name: &Name) -> NameHash {
    let mut hasher = DefaultHasher::new();
    for component in &name.components {
        write_component(&mut hasher, component);
    }
    NameHash(hasher.finish())
}

/// Hash a name and all of its leading prefixes in one pass. The hasher
/// state is snapshotted at each component boundary, so the prefix hashes
/// cost no extra passes over the bytes.
pub fn hash_prefixes(name: &Name) -> PrefixHashes {
    let component_count = name.components.len();
    let mut prefixes = Vec::with_capacity(component_count.min(MAX_PREFIX_COMPONENTS));
    let mut hasher = DefaultHasher::new();

    for (i, component) in name.components.iter().enumerate() {
        write_component(&mut hasher, component);
        if i < MAX_PREFIX_COMPONENTS {
            prefixes.push(NameHash(hasher.clone().finish()));
        }
    }

    PrefixHashes {
        full: NameHash(hasher.finish()),
        prefixes,
        component_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = Name::from_uri("/video/hd/segment1").unwrap();
        let b = Name::from_uri("/video/hd/segment1").unwrap();
        assert_eq!(hash_name(&a), hash_name(&b));
    }

    #[test]
    fn test_hash_differs_across_names() {
        let a = Name::from_uri("/video/hd/segment1").unwrap();
        let b = Name::from_uri("/video/hd/segment2").unwrap();
        assert_ne!(hash_name(&a), hash_name(&b));
    }

    #[test]
    fn test_component_boundaries_framed() {
        let mut a = Name::new();
        a.append_str("ab").append_str("c");
        let mut b = Name::new();
        b.append_str("a").append_str("bc");
        assert_ne!(hash_name(&a), hash_name(&b));
    }

    #[test]
    fn test_prefix_hashes_match_standalone_hashes() {
        let name = Name::from_uri("/a/b/c/d").unwrap();
        let hashes = hash_prefixes(&name);

        assert_eq!(hashes.full(), hash_name(&name));
        assert_eq!(hashes.prefix_count(), 4);
        for len in 1..=4 {
            assert_eq!(
                hashes.prefix(len).unwrap(),
                hash_name(&name.prefix(len)),
                "prefix of length {len}"
            );
        }
        assert_eq!(hashes.prefix(0), None);
        assert_eq!(hashes.prefix(5), None);
    }

    #[test]
    fn test_long_name_caps_prefixes_not_full_hash() {
        let mut name = Name::new();
        for i in 0..12 {
            name.append_str(&format!("c{i}"));
        }
        let hashes = hash_prefixes(&name);
        assert_eq!(hashes.prefix_count(), MAX_PREFIX_COMPONENTS);
        assert_eq!(hashes.component_count(), 12);
        assert_eq!(hashes.full(), hash_name(&name));
        assert_eq!(
            hashes.prefix(MAX_PREFIX_COMPONENTS).unwrap(),
            hash_name(&name.prefix(MAX_PREFIX_COMPONENTS))
        );
    }

    #[test]
    fn test_empty_name_hashes() {
        let empty = Name::new();
        let hashes = hash_prefixes(&empty);
        assert_eq!(hashes.prefix_count(), 0);
        assert_eq!(hashes.full(), hash_name(&empty));
    }
}
