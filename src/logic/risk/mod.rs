//! Risk Score Aggregator
//!
//! Per-(group, actor) accumulator translating violations into an
//! escalation tier. Same-key updates serialize on a per-key lock and are
//! mirrored to the durable store with an atomic increment-or-insert;
//! different keys proceed in parallel. Points decay linearly per elapsed
//! day without new violations, floored at zero.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::logic::scheduler::Scheduler;
use crate::logic::store::SqliteStore;
use crate::logic::{ActorId, GroupId};

use types::{RiskConfig, RiskScore, RiskStatus, RiskUpdate};

type RiskKey = (GroupId, ActorId);

pub struct RiskTracker {
    entries: RwLock<HashMap<RiskKey, Arc<Mutex<RiskScore>>>>,
    store: Arc<SqliteStore>,
    scheduler: Arc<Scheduler>,
    config: RiskConfig,
}

impl RiskTracker {
    pub fn new(store: Arc<SqliteStore>, scheduler: Arc<Scheduler>, config: RiskConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Get or create the entry for a key, hydrating from the durable
    /// store on first touch.
    fn entry(&self, key: RiskKey) -> Arc<Mutex<RiskScore>> {
        if let Some(e) = self.entries.read().get(&key) {
            return e.clone();
        }

        let loaded = match self.store.get_risk(key.0, key.1) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                log::warn!("risk hydrate failed for {:?}: {}", key, e);
                RiskScore::default()
            }
        };

        let mut map = self.entries.write();
        map.entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone()
    }

    /// Add points for a violation and derive the escalation tier from the
    /// post-increment total. Linearizable per key: concurrent callers on
    /// the same key serialize, none of their increments is lost.
    pub fn add_points(&self, group: GroupId, actor: ActorId, points: u32, reason: &str) -> RiskUpdate {
        self.add_points_at(group, actor, points, reason, Utc::now())
    }

    pub fn add_points_at(
        &self,
        group: GroupId,
        actor: ActorId,
        points: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> RiskUpdate {
        let entry = self.entry((group, actor));
        let mut score = entry.lock();

        let base = score.effective_points(now, self.config.decay_per_day);
        let decayed = base < score.points;
        let new_total = base.saturating_add(points).min(self.config.max_points);

        score.points = new_total;
        score.total_violations += 1;
        score.last_violation_at = Some(now);

        // Mirror to the durable store while holding the key lock. Memory
        // stays the source of truth on failure.
        let result = if decayed {
            self.store.put_risk(group, actor, &score)
        } else {
            self.store
                .increment_risk(group, actor, points, self.config.max_points, now)
        };
        if let Err(e) = result {
            log::error!("risk write failed for {}:{}: {}", group, actor, e);
        }

        let tier = self.config.tier_for(new_total);
        log::info!(
            "[RISK] {}:{} +{} ({}) -> {} [{}]",
            group,
            actor,
            points,
            reason,
            new_total,
            tier.as_str()
        );
        RiskUpdate { new_total, tier }
    }

    /// Current score with decay applied to the returned copy.
    pub fn get(&self, group: GroupId, actor: ActorId) -> RiskScore {
        self.get_at(group, actor, Utc::now())
    }

    pub fn get_at(&self, group: GroupId, actor: ActorId, now: DateTime<Utc>) -> RiskScore {
        let entry = self.entry((group, actor));
        let score = entry.lock();
        let mut snapshot = score.clone();
        snapshot.points = score.effective_points(now, self.config.decay_per_day);
        snapshot
    }

    /// Zero points and violations. Threat records keep the history; any
    /// pending quarantine release is fenced out.
    pub fn reset(&self, group: GroupId, actor: ActorId) {
        let entry = self.entry((group, actor));
        {
            let mut score = entry.lock();
            score.points = 0;
            score.total_violations = 0;
            score.last_violation_at = None;
            score.status = RiskStatus::Active;
        }
        self.scheduler.cancel(&quarantine_key(group, actor));
        if let Err(e) = self.store.reset_risk(group, actor) {
            log::error!("risk reset write failed for {}:{}: {}", group, actor, e);
        }
        log::info!("[RISK] {}:{} reset", group, actor);
    }

    /// Temporary quarantine with a fenced, cancellable release.
    pub fn quarantine(&self, group: GroupId, actor: ActorId, duration: StdDuration) {
        let entry = self.entry((group, actor));
        {
            let mut score = entry.lock();
            score.status = RiskStatus::Quarantined;
            if let Err(e) = self.store.put_risk(group, actor, &score) {
                log::error!("quarantine write failed for {}:{}: {}", group, actor, e);
            }
        }

        let release_entry = entry.clone();
        let store = self.store.clone();
        self.scheduler
            .schedule(&quarantine_key(group, actor), duration, move || {
                let mut score = release_entry.lock();
                if score.status == RiskStatus::Quarantined {
                    score.status = RiskStatus::Active;
                    if let Err(e) = store.put_risk(group, actor, &score) {
                        log::error!("quarantine release write failed: {}", e);
                    }
                    log::info!("[RISK] {}:{} quarantine released", group, actor);
                }
            });
        log::info!("[RISK] {}:{} quarantined for {:?}", group, actor, duration);
    }

    /// Mark an external executor outcome (ban carried out).
    pub fn set_status(&self, group: GroupId, actor: ActorId, status: RiskStatus) {
        let entry = self.entry((group, actor));
        let mut score = entry.lock();
        score.status = status;
        if let Err(e) = self.store.put_risk(group, actor, &score) {
            log::error!("status write failed for {}:{}: {}", group, actor, e);
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.read().len()
    }
}

fn quarantine_key(group: GroupId, actor: ActorId) -> String {
    format!("quarantine:{}:{}", group, actor)
}

// ============================================================================
// TESTS
// ============================================================================
