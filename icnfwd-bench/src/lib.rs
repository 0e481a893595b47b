use icnfwd_core::name::Name;

/// Deterministic corpus of hierarchical names for benchmark input. All
/// names share the `/bench` root so one route covers the whole corpus.
pub fn sample_names(count: usize) -> Vec<Name> {
    let mut rng = fastrand::Rng::with_seed(0x1cf0_5eed);
    (0..count)
        .map(|i| {
            let mut name = Name::new();
            name.append_str("bench");
            name.append_str(&format!("app{}", i % 32));
            let depth = 1 + rng.usize(..3);
            for level in 0..depth {
                name.append_str(&format!("c{}-{}", level, rng.u32(..1_000_000)));
            }
            name.append_str(&format!("seg{}", i));
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_names_are_stable_and_distinct() {
        let a = sample_names(64);
        let b = sample_names(64);
        assert_eq!(a, b);
        for name in &a {
            assert_eq!(name.component(0), Some(b"bench".as_slice()));
        }
        let mut uris: Vec<String> = a.iter().map(|n| n.to_uri()).collect();
        uris.sort();
        uris.dedup();
        assert_eq!(uris.len(), 64);
    }
}
