//! Raid Detector - Join-Rate State Machine
//!
//! Per-group NORMAL -> ALERT -> LOCKDOWN state machine over a trailing
//! join window. Entering lockdown raises join friction through the
//! injected gate exactly once per cycle; auto-revert is a fenced
//! scheduler task. A failed gate call keeps the internal state and raises
//! a manual-intervention alert instead of silently reverting.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use crate::logic::notify::{JoinGate, Notifier};
use crate::logic::scheduler::Scheduler;
use crate::logic::GroupId;

use types::{
    JoinEvent, JoinRecord, JoinWindow, LockdownState, RaidAction, RaidAssessment, RaidConfig,
    RaidState,
};

// ============================================================================
// PER-GROUP STATE
// ============================================================================

struct GroupState {
    joins: JoinWindow,
    lockdown: LockdownState,
}

impl GroupState {
    fn new() -> Self {
        Self {
            joins: JoinWindow::default(),
            lockdown: LockdownState::default(),
        }
    }
}

type SharedGroups = Arc<RwLock<HashMap<GroupId, Arc<Mutex<GroupState>>>>>;

// ============================================================================
// DETECTOR
// ============================================================================

pub struct RaidDetector {
    groups: SharedGroups,
    gate: Arc<dyn JoinGate>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<Scheduler>,
    config: RaidConfig,
}

impl RaidDetector {
    pub fn new(
        gate: Arc<dyn JoinGate>,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<Scheduler>,
        config: RaidConfig,
    ) -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            gate,
            notifier,
            scheduler,
            config,
        }
    }

    fn group(&self, group: GroupId) -> Arc<Mutex<GroupState>> {
        if let Some(g) = self.groups.read().get(&group) {
            return g.clone();
        }
        self.groups
            .write()
            .entry(group)
            .or_insert_with(|| Arc::new(Mutex::new(GroupState::new())))
            .clone()
    }

    /// Process one join event through the state machine.
    pub fn process_join(&self, event: &JoinEvent) -> RaidAssessment {
        self.process_join_at(event, Utc::now())
    }

    pub fn process_join_at(&self, event: &JoinEvent, now: DateTime<Utc>) -> RaidAssessment {
        let state = self.group(event.group);
        let mut state = state.lock();

        // Lazy expiry in case the deferred revert has not fired yet
        self.expire_if_due(event.group, &mut state, now);

        state.joins.push(JoinRecord {
            joined_at: event.timestamp,
            account_age_days: event.account_age_days,
        });
        state.joins.prune(now - Duration::seconds(self.config.window_secs));

        let joins_in_window = state.joins.len();
        let new_ratio = state.joins.new_account_ratio(self.config.new_account_days);
        let risk_factors = member_risk_factors(event, self.config.new_account_days);

        let rate_lockdown = joins_in_window >= self.config.lockdown_joins;
        let ratio_lockdown = joins_in_window >= self.config.min_ratio_sample
            && new_ratio >= self.config.new_account_ratio;
        let alert = joins_in_window >= self.config.alert_joins;

        let action = if rate_lockdown || ratio_lockdown {
            self.enter_or_extend_lockdown(event.group, &mut state, now)
        } else if alert {
            self.enter_alert(event.group, &mut state, now)
        } else {
            // Below the alert threshold, an alert cycle winds down
            if state.lockdown.state == RaidState::Alert {
                state.lockdown = LockdownState {
                    generation: state.lockdown.generation,
                    ..LockdownState::default()
                };
            }
            RaidAction::None
        };

        RaidAssessment {
            is_raid: matches!(action, RaidAction::LockdownStarted | RaidAction::LockdownExtended)
                || state.lockdown.state == RaidState::Lockdown,
            state: state.lockdown.state,
            joins_in_window,
            new_account_ratio: new_ratio,
            risk_factors,
            action,
        }
    }

    /// Enter lockdown, or extend it if already active. The gate is raised
    /// exactly once per cycle; re-entry only moves `expires_at`.
    fn enter_or_extend_lockdown(
        &self,
        group: GroupId,
        state: &mut GroupState,
        now: DateTime<Utc>,
    ) -> RaidAction {
        let expires_at = now + Duration::seconds(self.config.lockdown_secs as i64);

        if state.lockdown.state == RaidState::Lockdown {
            state.lockdown.expires_at = Some(expires_at);
            state.lockdown.generation = self.schedule_expiry(group);
            log::info!("[RAID] group {} lockdown extended to {}", group, expires_at);
            return RaidAction::LockdownExtended;
        }

        state.lockdown = LockdownState {
            state: RaidState::Lockdown,
            entered_at: Some(now),
            expires_at: Some(expires_at),
            generation: 0,
        };

        // The one external side effect of the cycle
        match self.gate.raise(group) {
            Ok(()) => {
                log::warn!("[RAID] group {} locked down until {}", group, expires_at);
                self.notifier.alert(
                    group,
                    json!({
                        "event": "lockdown_enabled",
                        "expires_at": expires_at.to_rfc3339(),
                    }),
                );
            }
            Err(e) => {
                // State stays LOCKDOWN; a human has to finish the job
                log::error!("[RAID] group {} gate raise failed: {}", group, e);
                self.notifier.alert(
                    group,
                    json!({
                        "event": "lockdown_manual_intervention",
                        "error": e.to_string(),
                    }),
                );
            }
        }

        state.lockdown.generation = self.schedule_expiry(group);
        RaidAction::LockdownStarted
    }

    fn enter_alert(&self, group: GroupId, state: &mut GroupState, now: DateTime<Utc>) -> RaidAction {
        if state.lockdown.state == RaidState::Normal {
            state.lockdown.state = RaidState::Alert;
            state.lockdown.entered_at = Some(now);
            log::info!("[RAID] group {} join rate elevated, alerting", group);
            self.notifier.alert(
                group,
                json!({
                    "event": "join_rate_alert",
                }),
            );
        }
        RaidAction::Alerted
    }

    /// Fenced auto-revert. The closure re-checks the window: if the group
    /// is still over threshold, the cycle restarts instead of reverting.
    fn schedule_expiry(&self, group: GroupId) -> u64 {
        let groups = self.groups.clone();
        let gate = self.gate.clone();
        let notifier = self.notifier.clone();
        let config = self.config.clone();
        self.scheduler.schedule(
            &lockdown_key(group),
            StdDuration::from_secs(self.config.lockdown_secs),
            move || {
                revert_lockdown(&groups, &gate, &notifier, &config, group);
            },
        )
    }

    /// Lazy revert path for when a reader observes an expired lockdown
    /// before the scheduled task has fired.
    fn expire_if_due(&self, group: GroupId, state: &mut GroupState, now: DateTime<Utc>) {
        if state.lockdown.state != RaidState::Lockdown {
            return;
        }
        let Some(expires_at) = state.lockdown.expires_at else {
            return;
        };
        if now < expires_at {
            return;
        }
        // Fence out the pending scheduled revert, then do it here
        self.scheduler.cancel(&lockdown_key(group));
        restore_gate(&*self.gate, &*self.notifier, group);
        state.lockdown = LockdownState::default();
    }

    /// Current state for a group, applying lazy expiry.
    pub fn state_at(&self, group: GroupId, now: DateTime<Utc>) -> RaidState {
        let state = self.group(group);
        let mut state = state.lock();
        self.expire_if_due(group, &mut state, now);
        state.lockdown.state
    }

    pub fn state(&self, group: GroupId) -> RaidState {
        self.state_at(group, Utc::now())
    }

    /// Groups currently in lockdown.
    pub fn active_lockdowns(&self) -> usize {
        self.groups
            .read()
            .values()
            .filter(|g| g.lock().lockdown.state == RaidState::Lockdown)
            .count()
    }
}

fn lockdown_key(group: GroupId) -> String {
    format!("raid-lockdown:{}", group)
}

/// Per-member risk factors, independent of the window analysis.
fn member_risk_factors(event: &JoinEvent, new_account_days: u32) -> Vec<String> {
    let mut factors = Vec::new();
    if event.account_age_days < new_account_days {
        factors.push("new_account".to_string());
    }
    if !event.has_avatar {
        factors.push("default_avatar".to_string());
    }
    let suspicious_chars = event
        .username
        .chars()
        .filter(|c| !c.is_alphanumeric() && !matches!(c, ' ' | '_' | '-' | '.'))
        .count();
    if suspicious_chars >= 3 {
        factors.push("suspicious_username".to_string());
    }
    factors
}

/// Deferred revert body; also used when the cycle has to restart.
fn revert_lockdown(
    groups: &SharedGroups,
    gate: &Arc<dyn JoinGate>,
    notifier: &Arc<dyn Notifier>,
    config: &RaidConfig,
    group: GroupId,
) {
    let Some(state) = groups.read().get(&group).cloned() else {
        return;
    };
    let mut state = state.lock();
    if state.lockdown.state != RaidState::Lockdown {
        return;
    }

    let now = Utc::now();
    state.joins.prune(now - Duration::seconds(config.window_secs));
    if state.joins.len() >= config.lockdown_joins {
        // Still under attack: keep the cycle going without touching the gate
        state.lockdown.expires_at = Some(now + Duration::seconds(config.lockdown_secs as i64));
        log::warn!("[RAID] group {} still over threshold at expiry, cycle restarted", group);
        return;
    }

    restore_gate(&**gate, &**notifier, group);
    state.lockdown = LockdownState::default();
}

fn restore_gate(gate: &dyn JoinGate, notifier: &dyn Notifier, group: GroupId) {
    match gate.restore(group) {
        Ok(()) => {
            log::info!("[RAID] group {} lockdown lifted", group);
            notifier.alert(group, json!({"event": "lockdown_disabled"}));
        }
        Err(e) => {
            log::error!("[RAID] group {} gate restore failed: {}", group, e);
            notifier.alert(
                group,
                json!({
                    "event": "lockdown_restore_failed",
                    "error": e.to_string(),
                }),
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
