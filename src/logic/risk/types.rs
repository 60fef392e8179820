//! Risk Score Types & Thresholds
//!
//! Threshold constants and the per-actor score record. No aggregation
//! logic here - that lives in the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Fraction of the point budget at which a warning is recommended
pub const WARN_RATIO: f32 = 0.5;

/// Fraction of the point budget at which a timeout is recommended
pub const TIMEOUT_RATIO: f32 = 0.8;

/// Points shed per full day without a new violation
pub const DECAY_PER_DAY: u32 = 2;

// ============================================================================
// TYPES
// ============================================================================

/// Moderation standing of an actor within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    Active,
    Quarantined,
    Banned,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Active => "active",
            RiskStatus::Quarantined => "quarantined",
            RiskStatus::Banned => "banned",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "quarantined" => RiskStatus::Quarantined,
            "banned" => RiskStatus::Banned,
            _ => RiskStatus::Active,
        }
    }
}

/// Escalation recommendation, ordered least to most severe.
///
/// The derived `Ord` is the tie-break order: when two paths recommend
/// different actions for the same actor, the greater one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationTier {
    Monitor,
    Warn,
    Timeout,
    Ban,
}

impl EscalationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTier::Monitor => "monitor",
            EscalationTier::Warn => "warn",
            EscalationTier::Timeout => "timeout",
            EscalationTier::Ban => "ban",
        }
    }
}

/// Accumulated risk state for one (group, actor) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub points: u32,
    pub total_violations: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub status: RiskStatus,
}

impl Default for RiskScore {
    fn default() -> Self {
        Self {
            points: 0,
            total_violations: 0,
            last_violation_at: None,
            status: RiskStatus::Active,
        }
    }
}

impl RiskScore {
    /// Points after linear decay, without mutating the stored value.
    ///
    /// Decay is anchored on `last_violation_at`: a new violation resets the
    /// anchor, so repeated reads never double-count elapsed days.
    pub fn effective_points(&self, now: DateTime<Utc>, decay_per_day: u32) -> u32 {
        let Some(last) = self.last_violation_at else {
            return self.points;
        };
        let days = (now - last).num_days().max(0) as u32;
        self.points.saturating_sub(days.saturating_mul(decay_per_day))
    }
}

/// Result of a point increment.
#[derive(Debug, Clone, Serialize)]
pub struct RiskUpdate {
    pub new_total: u32,
    pub tier: EscalationTier,
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Point budget; reaching it means a ban recommendation
    pub max_points: u32,
    /// Linear decay per full day without violations
    pub decay_per_day: u32,
    pub warn_ratio: f32,
    pub timeout_ratio: f32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_points: constants::DEFAULT_MAX_DANGER_POINTS,
            decay_per_day: DECAY_PER_DAY,
            warn_ratio: WARN_RATIO,
            timeout_ratio: TIMEOUT_RATIO,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        Self {
            max_points: constants::get_max_danger_points(),
            ..Default::default()
        }
    }

    /// Map a post-increment total to an escalation tier.
    pub fn tier_for(&self, points: u32) -> EscalationTier {
        let max = self.max_points as f32;
        let p = points as f32;
        if p >= max {
            EscalationTier::Ban
        } else if p >= max * self.timeout_ratio {
            EscalationTier::Timeout
        } else if p >= max * self.warn_ratio {
            EscalationTier::Warn
        } else {
            EscalationTier::Monitor
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tier_boundaries() {
        let cfg = RiskConfig::default(); // max 10
        assert_eq!(cfg.tier_for(4), EscalationTier::Monitor);
        assert_eq!(cfg.tier_for(5), EscalationTier::Warn);
        assert_eq!(cfg.tier_for(8), EscalationTier::Timeout);
        assert_eq!(cfg.tier_for(10), EscalationTier::Ban);
        assert_eq!(cfg.tier_for(14), EscalationTier::Ban);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(EscalationTier::Ban > EscalationTier::Timeout);
        assert!(EscalationTier::Timeout > EscalationTier::Warn);
        assert!(EscalationTier::Warn > EscalationTier::Monitor);
    }

    #[test]
    fn test_decay_is_anchored() {
        let now = Utc::now();
        let score = RiskScore {
            points: 8,
            total_violations: 3,
            last_violation_at: Some(now - Duration::days(3)),
            status: RiskStatus::Active,
        };
        // 3 full days at 2 points/day
        assert_eq!(score.effective_points(now, 2), 2);
        // Reading again at the same instant gives the same answer
        assert_eq!(score.effective_points(now, 2), 2);
        // Floored at zero
        assert_eq!(score.effective_points(now + Duration::days(30), 2), 0);
    }

    #[test]
    fn test_no_decay_without_violations() {
        let score = RiskScore::default();
        assert_eq!(score.effective_points(Utc::now(), 2), 0);
    }
}
