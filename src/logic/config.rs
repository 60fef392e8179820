//! Security Configuration
//!
//! Aggregate of the per-component threshold structs. Built with
//! `Default` for tests and `from_env()` for deployments; every detector
//! takes its slice at construction so suites can run isolated instances.

use serde::{Deserialize, Serialize};

use crate::logic::behavior::types::BehaviorConfig;
use crate::logic::cache::CacheConfig;
use crate::logic::external_intel::ApiConfig;
use crate::logic::link_guard::types::LinkConfig;
use crate::logic::raid::types::RaidConfig;
use crate::logic::risk::types::RiskConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    pub behavior: BehaviorConfig,
    pub raid: RaidConfig,
    pub risk: RiskConfig,
    pub link: LinkConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
}

impl SecurityConfig {
    /// Defaults with environment-variable overrides applied.
    pub fn from_env() -> Self {
        Self {
            behavior: BehaviorConfig::from_env(),
            raid: RaidConfig::from_env(),
            risk: RiskConfig::from_env(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = SecurityConfig::default();
        assert!(cfg.risk.max_points > 0);
        assert!(cfg.raid.lockdown_joins > cfg.raid.alert_joins);
        assert!(cfg.link.confidence_floor > 0.0 && cfg.link.confidence_floor <= 1.0);
        assert_eq!(cfg.cache.ttl_for("link_scan"), cfg.link.ttl_secs);
    }
}
