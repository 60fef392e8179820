//! Raid Detector Types
//!
//! Join window records and the per-group lockdown state machine types.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::logic::{ActorId, GroupId};

// ============================================================================
// EVENTS
// ============================================================================

/// A member-join event from the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinEvent {
    pub group: GroupId,
    pub actor: ActorId,
    pub account_age_days: u32,
    pub has_avatar: bool,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// Window entry; only what join-rate analysis needs.
#[derive(Debug, Clone)]
pub struct JoinRecord {
    pub joined_at: DateTime<Utc>,
    pub account_age_days: u32,
}

/// Trailing join window for one group. Never persisted.
#[derive(Debug, Default)]
pub struct JoinWindow {
    records: VecDeque<JoinRecord>,
}

impl JoinWindow {
    pub fn push(&mut self, record: JoinRecord) {
        self.records.push_back(record);
    }

    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.records.front() {
            if front.joined_at < cutoff {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fraction of joins in the window from accounts younger than
    /// `max_age_days`.
    pub fn new_account_ratio(&self, max_age_days: u32) -> f32 {
        if self.records.is_empty() {
            return 0.0;
        }
        let young = self
            .records
            .iter()
            .filter(|r| r.account_age_days < max_age_days)
            .count();
        young as f32 / self.records.len() as f32
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Group protection states: NORMAL -> ALERT -> LOCKDOWN within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaidState {
    Normal,
    Alert,
    Lockdown,
}

impl RaidState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaidState::Normal => "normal",
            RaidState::Alert => "alert",
            RaidState::Lockdown => "lockdown",
        }
    }
}

/// Per-group lockdown bookkeeping. `generation` fences deferred
/// auto-revert tasks: a superseding trigger bumps it, so a stale expiry
/// fires as a no-op.
#[derive(Debug, Clone)]
pub struct LockdownState {
    pub state: RaidState,
    pub entered_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

impl Default for LockdownState {
    fn default() -> Self {
        Self {
            state: RaidState::Normal,
            entered_at: None,
            expires_at: None,
            generation: 0,
        }
    }
}

/// What the detector did with a join event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaidAction {
    None,
    Alerted,
    LockdownStarted,
    LockdownExtended,
}

/// Returned to the caller for every processed join.
#[derive(Debug, Clone, Serialize)]
pub struct RaidAssessment {
    pub is_raid: bool,
    pub state: RaidState,
    pub joins_in_window: usize,
    pub new_account_ratio: f32,
    /// Per-member risk factors ("new_account", "default_avatar", ...)
    pub risk_factors: Vec<String>,
    pub action: RaidAction,
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidConfig {
    /// Trailing join window in seconds
    pub window_secs: i64,
    /// Joins per window for the ALERT transition
    pub alert_joins: usize,
    /// Joins per window for the LOCKDOWN transition
    pub lockdown_joins: usize,
    /// Account age below which a join counts as a new account
    pub new_account_days: u32,
    /// New-account fraction that forces LOCKDOWN on its own
    pub new_account_ratio: f32,
    /// Minimum window size before the ratio trigger applies
    pub min_ratio_sample: usize,
    /// Lockdown duration before auto-revert
    pub lockdown_secs: u64,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            alert_joins: 10,
            lockdown_joins: 20,
            new_account_days: 7,
            new_account_ratio: 0.7,
            min_ratio_sample: 5,
            lockdown_secs: constants::DEFAULT_LOCKDOWN_SECS,
        }
    }
}

impl RaidConfig {
    pub fn from_env() -> Self {
        Self {
            lockdown_secs: constants::get_lockdown_secs(),
            ..Default::default()
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
    fn test_window_prune_and_ratio() {
        let mut w = JoinWindow::default();
        let now = Utc::now();
        for i in 0..4 {
            w.push(JoinRecord {
                joined_at: now - Duration::seconds(90 - i * 30),
                account_age_days: if i % 2 == 0 { 1 } else { 100 },
            });
        }
        w.prune(now - Duration::seconds(60));
        assert_eq!(w.len(), 2);

        let mut w = JoinWindow::default();
        for age in [1, 2, 3, 100] {
            w.push(JoinRecord {
                joined_at: now,
                account_age_days: age,
            });
        }
        assert!((w.new_account_ratio(7) - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_window_ratio() {
        let w = JoinWindow::default();
        assert_eq!(w.new_account_ratio(7), 0.0);
    }
}
