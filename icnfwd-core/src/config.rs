use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::name::{Name, NameParseError};

/// Tunables for one forwarder instance. Every shard shares the same
/// config; per-shard state (tables, counters) is sized from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Pending-Interest lifetime applied when the packet carries none.
    pub pit_lifetime_default_ms: u64,
    /// Lower clamp for explicit non-zero Interest lifetimes.
    pub pit_lifetime_min_ms: u64,
    /// Upper clamp for explicit Interest lifetimes.
    pub pit_lifetime_max_ms: u64,
    /// Cache residency applied when content carries no cache time.
    pub cs_lifetime_default_ms: u64,
    /// Lower clamp for explicit non-zero cache times.
    pub cs_lifetime_min_ms: u64,
    /// Upper clamp for explicit cache times.
    pub cs_lifetime_max_ms: u64,
    /// Per-shard content-store capacity. 0 disables caching entirely.
    pub cs_max_entries: u64,
    /// Requester faces recorded per pending Interest before further
    /// same-name Interests are dropped.
    pub pit_aggregation_capacity: usize,
    /// Per-shard PIT/CS table pool capacity (both entry kinds share it).
    pub pcs_max_entries: u32,
    /// Number of forwarding shards. 0 picks a power of two from the
    /// available CPUs.
    pub shard_count: usize,
    /// This forwarder's own name, the target for echo/traceroute
    /// requests. Unset means control requests are never "for us".
    pub node_name: Option<String>,
    pub hello: HelloConfig,
}

/// Liveness-protocol settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloConfig {
    pub enabled: bool,
    /// Prefix under which probe names are formed.
    pub name_prefix: String,
    /// Consecutive unanswered probes before a face is declared down.
    pub misses_down: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            pit_lifetime_default_ms: 4000,
            pit_lifetime_min_ms: 200,
            pit_lifetime_max_ms: 60_000,
            cs_lifetime_default_ms: 300_000,
            cs_lifetime_min_ms: 1000,
            cs_lifetime_max_ms: 3_600_000,
            cs_max_entries: 4096,
            pit_aggregation_capacity: 8,
            pcs_max_entries: 65_536,
            shard_count: 0,
            node_name: None,
            hello: HelloConfig::default(),
        }
    }
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_prefix: "/local/hello".to_string(),
            misses_down: 3,
        }
    }
}

impl ForwarderConfig {
    /// Small tables and a single shard, convenient under test.
    pub fn for_tests() -> Self {
        Self {
            cs_max_entries: 64,
            pcs_max_entries: 256,
            shard_count: 1,
            ..Self::default()
        }
    }

    /// Check internal consistency. Called once at startup; the forwarding
    /// path assumes a validated config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_lifetimes(
            "pit",
            self.pit_lifetime_min_ms,
            self.pit_lifetime_default_ms,
            self.pit_lifetime_max_ms,
        )?;
        check_lifetimes(
            "cs",
            self.cs_lifetime_min_ms,
            self.cs_lifetime_default_ms,
            self.cs_lifetime_max_ms,
        )?;
        if self.pit_aggregation_capacity == 0 {
            return Err(ConfigError::AggregationCapacity(
                self.pit_aggregation_capacity,
            ));
        }
        if self.pcs_max_entries == 0 {
            return Err(ConfigError::TableCapacity(self.pcs_max_entries));
        }
        self.parsed_node_name()?;
        Name::from_uri(&self.hello.name_prefix)
            .map_err(|e| ConfigError::HelloPrefix(self.hello.name_prefix.clone(), e))?;
        Ok(())
    }

    /// The configured node name, parsed. `None` when unset.
    pub fn parsed_node_name(&self) -> Result<Option<Name>, ConfigError> {
        match &self.node_name {
            Some(uri) => {
                let name =
                    Name::from_uri(uri).map_err(|e| ConfigError::NodeName(uri.clone(), e))?;
                if name.is_empty() {
                    return Err(ConfigError::NodeNameEmpty);
                }
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    /// Effective pending-Interest lifetime for one packet. Absent means
    /// the default; explicit non-zero values clamp into the configured
    /// bounds; an explicit zero is preserved, which creates the entry
    /// already expired ("forward but expect no reply").
    pub fn effective_pit_lifetime_ms(&self, requested: Option<u64>) -> u64 {
        clamp_lifetime(
            requested,
            self.pit_lifetime_default_ms,
            self.pit_lifetime_min_ms,
            self.pit_lifetime_max_ms,
        )
    }

    /// Effective cache residency for one content object; same rules as
    /// the pending-Interest lifetime.
    pub fn effective_cs_lifetime_ms(&self, requested: Option<u64>) -> u64 {
        clamp_lifetime(
            requested,
            self.cs_lifetime_default_ms,
            self.cs_lifetime_min_ms,
            self.cs_lifetime_max_ms,
        )
    }
}

fn clamp_lifetime(requested: Option<u64>, default: u64, min: u64, max: u64) -> u64 {
    match requested {
        None => default,
        Some(0) => 0,
        Some(ms) => ms.clamp(min, max),
    }
}

fn check_lifetimes(which: &'static str, min: u64, default: u64, max: u64) -> Result<(), ConfigError> {
    if min == 0 || min > default || default > max {
        return Err(ConfigError::LifetimeBounds {
            which,
            min,
            default,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{which} lifetime bounds invalid: min={min} default={default} max={max}")]
    LifetimeBounds {
        which: &'static str,
        min: u64,
        default: u64,
        max: u64,
    },
    #[error("aggregation capacity must be at least 1, got {0}")]
    AggregationCapacity(usize),
    #[error("table capacity must be at least 1, got {0}")]
    TableCapacity(u32),
    #[error("node name {0:?} invalid: {1}")]
    NodeName(String, #[source] NameParseError),
    #[error("node name must have at least one component")]
    NodeNameEmpty,
    #[error("hello prefix {0:?} invalid: {1}")]
    HelloPrefix(String, #[source] NameParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ForwarderConfig::default().validate().unwrap();
        ForwarderConfig::for_tests().validate().unwrap();
    }

    #[test]
    fn test_lifetime_order_enforced() {
        let mut cfg = ForwarderConfig::default();
        cfg.pit_lifetime_min_ms = cfg.pit_lifetime_max_ms + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::LifetimeBounds { which: "pit", .. })
        ));

        let mut cfg = ForwarderConfig::default();
        cfg.cs_lifetime_min_ms = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::LifetimeBounds { which: "cs", .. })
        ));
    }

    #[test]
    fn test_lifetime_clamping() {
        let cfg = ForwarderConfig::default();
        // Absent takes the default.
        assert_eq!(
            cfg.effective_pit_lifetime_ms(None),
            cfg.pit_lifetime_default_ms
        );
        // Explicit values clamp into [min, max].
        assert_eq!(cfg.effective_pit_lifetime_ms(Some(1)), cfg.pit_lifetime_min_ms);
        assert_eq!(
            cfg.effective_pit_lifetime_ms(Some(u64::MAX)),
            cfg.pit_lifetime_max_ms
        );
        assert_eq!(cfg.effective_pit_lifetime_ms(Some(5000)), 5000);
        // Explicit zero survives unclamped.
        assert_eq!(cfg.effective_pit_lifetime_ms(Some(0)), 0);
        assert_eq!(cfg.effective_cs_lifetime_ms(Some(0)), 0);
    }

    #[test]
    fn test_node_name_parsing() {
        let mut cfg = ForwarderConfig::default();
        assert_eq!(cfg.parsed_node_name().unwrap(), None);

        cfg.node_name = Some("/edge/fwdr7".to_string());
        assert_eq!(
            cfg.parsed_node_name().unwrap(),
            Some(Name::from_uri("/edge/fwdr7").unwrap())
        );

        cfg.node_name = Some("not-a-name".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_capacities_rejected() {
        let mut cfg = ForwarderConfig::default();
        cfg.pit_aggregation_capacity = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::AggregationCapacity(0))
        ));

        let mut cfg = ForwarderConfig::default();
        cfg.pcs_max_entries = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::TableCapacity(0))));
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let cfg = ForwarderConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ForwarderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
