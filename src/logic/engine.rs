//! Security Core - Detection Engine Facade
//!
//! Owns every detection subsystem and routes incoming activity to them:
//! messages through the behavior watchdog and link guardian, joins
//! through the raid detector, with violations flowing into the risk
//! tracker and qualifying incidents into the threat analyzer. The host
//! talks to this type only.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::logic::behavior::types::{
    ActivityEvent, ActorBehaviorSummary, BehaviorReport, EditedEvent, Violation, ViolationKind,
    ViolationSeverity,
};
use crate::logic::behavior::BehaviorWatchdog;
use crate::logic::cache::TtlCache;
use crate::logic::config::SecurityConfig;
use crate::logic::external_intel::ReputationApi;
use crate::logic::link_guard::types::{LinkThreatLevel, ScanError, ScanResult};
use crate::logic::link_guard::{extract_urls, LinkGuardian, ScanStats};
use crate::logic::notify::{JoinGate, Notifier};
use crate::logic::raid::types::{JoinEvent, RaidAction, RaidAssessment, RaidState};
use crate::logic::raid::RaidDetector;
use crate::logic::risk::types::{EscalationTier, RiskScore};
use crate::logic::risk::RiskTracker;
use crate::logic::scheduler::Scheduler;
use crate::logic::store::{GroupSettings, SqliteStore};
use crate::logic::threat::{RawThreat, ThreatAnalysis, ThreatAnalyzer, ThreatRecord};
use crate::logic::{ActorId, GroupId};

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CoreStats {
    pub links: ScanStats,
    pub tracked_actors: usize,
    pub tracked_risk_keys: usize,
    pub active_lockdowns: usize,
    pub cached_entries: usize,
    pub pending_deferred_actions: usize,
}

// ============================================================================
// CORE
// ============================================================================

pub struct SecurityCore {
    config: SecurityConfig,
    store: Arc<SqliteStore>,
    cache: Arc<TtlCache>,
    scheduler: Arc<Scheduler>,
    notifier: Arc<dyn Notifier>,
    links: LinkGuardian,
    behavior: BehaviorWatchdog,
    raids: RaidDetector,
    risk: RiskTracker,
    threats: ThreatAnalyzer,
}

impl SecurityCore {
    pub fn new(
        store: Arc<SqliteStore>,
        api: Option<Arc<dyn ReputationApi>>,
        notifier: Arc<dyn Notifier>,
        gate: Arc<dyn JoinGate>,
        config: SecurityConfig,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new());
        let cache = Arc::new(TtlCache::new(Some(store.clone()), config.cache.clone()));
        let links = LinkGuardian::new(
            cache.clone(),
            store.clone(),
            api,
            config.link.clone(),
        );
        let behavior = BehaviorWatchdog::new(config.behavior.clone());
        let raids = RaidDetector::new(
            gate,
            notifier.clone(),
            scheduler.clone(),
            config.raid.clone(),
        );
        let risk = RiskTracker::new(store.clone(), scheduler.clone(), config.risk.clone());
        let threats = ThreatAnalyzer::new(store.clone());

        log::info!(
            "security core initialized (max points {}, lockdown {}s)",
            config.risk.max_points,
            config.raid.lockdown_secs
        );

        Self {
            config,
            store,
            cache,
            scheduler,
            notifier,
            links,
            behavior,
            raids,
            risk,
            threats,
        }
    }

    // ------------------------------------------------------------------
    // Link scanning
    // ------------------------------------------------------------------

    /// Direct URL verdict. Pure with respect to risk: attribution happens
    /// on the message-analysis path.
    pub fn scan_url(&self, url: &str, group: GroupId) -> Result<ScanResult, ScanError> {
        self.scan_url_at(url, group, Utc::now())
    }

    pub fn scan_url_at(
        &self,
        url: &str,
        group: GroupId,
        now: DateTime<Utc>,
    ) -> Result<ScanResult, ScanError> {
        if !self.group_flag(group, |s| s.link_scan_enabled) {
            let norm = crate::logic::link_guard::normalize::normalize(url)?;
            let hash = crate::logic::link_guard::normalize::url_hash(&norm.url);
            return Ok(ScanResult {
                url: norm.url,
                url_hash: hash,
                is_safe: true,
                threat_level: LinkThreatLevel::Safe,
                confidence: 0.0,
                threats: Vec::new(),
                sources: vec!["scanning_disabled".to_string()],
                cached: false,
            });
        }
        self.links.scan_at(url, now)
    }

    pub fn add_to_blacklist(&self, domain: &str) {
        self.links.add_to_blacklist(domain);
    }

    pub fn add_to_allowlist(&self, domain: &str) {
        self.links.add_to_allowlist(domain);
    }

    // ------------------------------------------------------------------
    // Message analysis
    // ------------------------------------------------------------------

    /// Analyze a posted message: behavioral checks plus link scans, then
    /// risk aggregation and threat recording.
    pub fn analyze_activity(&self, event: &ActivityEvent) -> BehaviorReport {
        self.analyze_activity_at(event, Utc::now())
    }

    pub fn analyze_activity_at(&self, event: &ActivityEvent, now: DateTime<Utc>) -> BehaviorReport {
        if !self.group_flag(event.group, |s| s.behavior_monitoring) {
            return BehaviorReport::clean(
                self.risk.get_at(event.group, event.actor, now).points,
            );
        }

        let mut violations = self.behavior.analyze_at(event, now);

        if self.group_flag(event.group, |s| s.link_scan_enabled) {
            self.scan_message_links(event, now, &mut violations);
        }

        if violations.is_empty() {
            return BehaviorReport::clean(self.risk.get_at(event.group, event.actor, now).points);
        }

        let total_points: u32 = violations.iter().map(|v| v.points).sum();
        let summary: Vec<&str> = violations.iter().map(|v| v.kind.as_str()).collect();
        let summary = summary.join(", ");

        let update = self
            .risk
            .add_points_at(event.group, event.actor, total_points, &summary, now);

        // One indicator per violation kind, order preserved
        let mut indicators: Vec<String> = Vec::new();
        for v in &violations {
            let ind = v.kind.indicator().to_string();
            if !indicators.contains(&ind) {
                indicators.push(ind);
            }
        }
        let worst = violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(ViolationSeverity::Low);
        let confidence = match worst {
            ViolationSeverity::High => 0.8,
            ViolationSeverity::Medium => 0.6,
            ViolationSeverity::Low => 0.4,
        };

        let raw = RawThreat {
            group: event.group,
            actor: event.actor,
            indicators,
            evidence: Some(truncate(&event.content, 200)),
            confidence,
            detail: format!("Violations: {} | Points: {}", summary, total_points),
        };
        self.threats.record_at(&raw, now);

        // Conflicting recommendations resolve most-severe-wins: the
        // cumulative tier and the single-event tier are both considered
        let event_tier = self.risk.config().tier_for(total_points);
        let action = update.tier.max(event_tier);

        if action >= EscalationTier::Timeout {
            self.notifier.alert(
                event.group,
                json!({
                    "event": "behavior_escalation",
                    "actor": event.actor,
                    "action": action.as_str(),
                    "points": update.new_total,
                    "violations": summary,
                }),
            );
        }

        BehaviorReport {
            is_suspicious: true,
            violations,
            total_points,
            risk_total: update.new_total,
            recommended_action: action,
        }
    }

    /// Edited messages are re-analyzed on their after-content.
    pub fn handle_edit(&self, event: &EditedEvent) -> BehaviorReport {
        self.analyze_activity(&event.as_activity())
    }

    fn scan_message_links(
        &self,
        event: &ActivityEvent,
        now: DateTime<Utc>,
        violations: &mut Vec<Violation>,
    ) {
        let urls = extract_urls(&event.content, self.config.link.max_links_per_message);
        for url in urls {
            match self.links.scan_at(&url, now) {
                Ok(result) if !result.is_safe => {
                    violations.push(Violation {
                        kind: ViolationKind::SuspiciousLink,
                        points: self.config.behavior.weights.suspicious_links,
                        severity: ViolationSeverity::High,
                        detail: format!("{} ({})", result.url, result.threat_level.as_str()),
                    });
                }
                Ok(_) => {}
                Err(e) => log::debug!("skipping unscannable url in message: {}", e),
            }
        }
    }

    // ------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------

    pub fn process_join(&self, event: &JoinEvent) -> RaidAssessment {
        self.process_join_at(event, Utc::now())
    }

    pub fn process_join_at(&self, event: &JoinEvent, now: DateTime<Utc>) -> RaidAssessment {
        if !self.group_flag(event.group, |s| s.anti_raid_enabled) {
            return RaidAssessment {
                is_raid: false,
                state: RaidState::Normal,
                joins_in_window: 0,
                new_account_ratio: 0.0,
                risk_factors: Vec::new(),
                action: RaidAction::None,
            };
        }

        let assessment = self.raids.process_join_at(event, now);

        if assessment.action == RaidAction::LockdownStarted {
            let raw = RawThreat {
                group: event.group,
                actor: event.actor,
                indicators: vec!["raid".to_string(), "mass_join".to_string()],
                evidence: Some(format!(
                    "{} joins in window, new-account ratio {:.2}",
                    assessment.joins_in_window, assessment.new_account_ratio
                )),
                confidence: 0.9,
                detail: "join-rate lockdown triggered".to_string(),
            };
            self.threats.record_at(&raw, now);
        }

        assessment
    }

    pub fn raid_state(&self, group: GroupId) -> RaidState {
        self.raids.state(group)
    }

    // ------------------------------------------------------------------
    // Risk
    // ------------------------------------------------------------------

    pub fn get_risk(&self, group: GroupId, actor: ActorId) -> RiskScore {
        self.risk.get(group, actor)
    }

    pub fn reset_risk(&self, group: GroupId, actor: ActorId) {
        self.risk.reset(group, actor);
        self.behavior.forget(group, actor);
    }

    pub fn quarantine(&self, group: GroupId, actor: ActorId, duration: std::time::Duration) {
        self.risk.quarantine(group, actor, duration);
    }

    // ------------------------------------------------------------------
    // Threats
    // ------------------------------------------------------------------

    /// Record an externally detected threat (file scan, manual report).
    pub fn record_threat(&self, raw: &RawThreat) -> Uuid {
        let (record, _) = self.threats.record(raw);
        record.id
    }

    pub fn get_analysis(&self, threat_id: Uuid) -> Option<ThreatAnalysis> {
        self.threats.analysis(threat_id)
    }

    pub fn get_threat(&self, threat_id: Uuid) -> Option<ThreatRecord> {
        self.threats.threat(threat_id)
    }

    /// An actor's threat history over the trailing `days`.
    pub fn threats_for(&self, group: GroupId, actor: ActorId, days: i64) -> Vec<ThreatRecord> {
        match self
            .store
            .threats_by_source(group, actor, Utc::now() - Duration::days(days))
        {
            Ok(list) => list,
            Err(e) => {
                log::warn!("threat history read failed for {}:{}: {}", group, actor, e);
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Reporting & maintenance
    // ------------------------------------------------------------------

    pub fn behavior_report(&self, group: GroupId, actor: ActorId) -> ActorBehaviorSummary {
        let now = Utc::now();
        let score = self.risk.get_at(group, actor, now);
        let (recent_messages, active_channels) = self.behavior.window_stats(group, actor, now);
        ActorBehaviorSummary {
            group,
            actor,
            danger_points: score.points,
            total_violations: score.total_violations,
            last_violation_at: score.last_violation_at,
            status: score.status.as_str().to_string(),
            recent_messages,
            active_channels,
        }
    }

    /// Periodic maintenance: sweep expired cache entries and idle
    /// windows. The host calls this from its own timer.
    pub fn cleanup(&self) {
        let removed = self.cache.cleanup();
        let dropped = self.behavior.cleanup_at(Utc::now());
        log::debug!(
            "maintenance pass: {} cache entries, {} idle windows",
            removed,
            dropped
        );
    }

    pub fn stats(&self) -> CoreStats {
        CoreStats {
            links: self.links.stats(),
            tracked_actors: self.behavior.tracked_actors(),
            tracked_risk_keys: self.risk.tracked_keys(),
            active_lockdowns: self.raids.active_lockdowns(),
            cached_entries: self.cache.memory_len(),
            pending_deferred_actions: self.scheduler.pending(),
        }
    }

    /// Stop background work. Also runs on drop.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        log::info!("security core shut down");
    }

    fn group_flag<F: Fn(&GroupSettings) -> bool>(&self, group: GroupId, flag: F) -> bool {
        flag(&self.group_settings(group))
    }

    /// Per-group settings, served through the short-TTL cache class.
    /// Fail open: a settings read problem must not disable detection.
    fn group_settings(&self, group: GroupId) -> GroupSettings {
        let key = group.to_string();
        if let Some(value) = self.cache.get("group_settings", &key) {
            if let Ok(settings) = serde_json::from_value(value) {
                return settings;
            }
        }
        match self.store.group_settings(group) {
            Ok(settings) => {
                if let Ok(value) = serde_json::to_value(&settings) {
                    self.cache.set("group_settings", &key, value);
                }
                settings
            }
            Err(e) => {
                log::warn!("group settings read failed for {}: {}", group, e);
                GroupSettings::defaults(group)
            }
        }
    }
}

impl Drop for SecurityCore {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::notify::{NullGate, NullNotifier};
    use crate::logic::threat::ThreatCategory;

    fn core() -> SecurityCore {
        let _ = env_logger::builder().is_test(true).try_init();
        SecurityCore::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            None,
            Arc::new(NullNotifier),
            Arc::new(NullGate),
            SecurityConfig::default(),
        )
    }

    fn message(group: u64, actor: u64, content: &str, ts: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            group,
            actor,
            channel: 1,
            content: content.to_string(),
            mentions: 0,
            timestamp: ts,
        }
    }

    #[test]
    fn test_clean_message_is_not_suspicious() {
        let core = core();
        let now = Utc::now();
        let report = core.analyze_activity_at(&message(1, 2, "good morning folks", now), now);
        assert!(!report.is_suspicious);
        assert_eq!(report.recommended_action, EscalationTier::Monitor);
        assert_eq!(core.get_risk(1, 2).points, 0);
    }

    #[test]
    fn test_blacklisted_link_end_to_end() {
        let core = core();
        core.add_to_blacklist("evil.example");
        let now = Utc::now();

        let report = core.analyze_activity_at(
            &message(1, 2, "check this out https://evil.example/claim", now),
            now,
        );

        // The scan verdict itself
        let scan = core.scan_url("https://evil.example/claim", 1).unwrap();
        assert!(!scan.is_safe);
        assert_eq!(scan.threat_level, LinkThreatLevel::High);

        // Risk went up by the link-violation weight
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::SuspiciousLink));
        assert_eq!(core.get_risk(1, 2).points, 7);

        // A suspicious-link threat record is retrievable with an analysis
        let history = core.threats_for(1, 2, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].category, ThreatCategory::SuspiciousLink);
        assert!(core.get_analysis(history[0].id).is_some());
    }

    #[test]
    fn test_escalation_to_ban_over_repeated_violations() {
        let core = core();
        let now = Utc::now();
        let mut action = EscalationTier::Monitor;
        for i in 0..3 {
            let ts = now + Duration::seconds(i);
            let report = core.analyze_activity_at(
                &message(1, 2, "free nitro! claim now at www.grab-it.example", ts),
                ts,
            );
            action = report.recommended_action;
        }
        // 5 points per event reaches the 10-point budget on the second hit
        assert_eq!(action, EscalationTier::Ban);
        assert_eq!(core.get_risk(1, 2).points, 10);
    }

    #[test]
    fn test_join_lockdown_records_threat() {
        let core = core();
        let now = Utc::now();
        for i in 0..20 {
            let ts = now + chrono::Duration::seconds(i as i64);
            core.process_join_at(
                &JoinEvent {
                    group: 5,
                    actor: i,
                    account_age_days: 100,
                    has_avatar: true,
                    username: "member".to_string(),
                    timestamp: ts,
                },
                ts,
            );
        }
        assert_eq!(core.raid_state(5), RaidState::Lockdown);

        let history = core.threats_for(5, 19, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].category, ThreatCategory::RaidAttempt);
    }

    #[test]
    fn test_reset_risk_clears_points_not_history() {
        let core = core();
        let now = Utc::now();
        core.analyze_activity_at(&message(1, 2, "free nitro for everyone", now), now);
        assert!(core.get_risk(1, 2).points > 0);

        core.reset_risk(1, 2);
        assert_eq!(core.get_risk(1, 2).points, 0);
        // The threat log still remembers
        assert_eq!(core.threats_for(1, 2, 1).len(), 1);
    }

    #[test]
    fn test_group_settings_disable_link_scanning() {
        let core = core();
        core.add_to_blacklist("evil.example");

        let mut settings = core.store.group_settings(1).unwrap();
        settings.link_scan_enabled = false;
        core.store.update_group_settings(&settings).unwrap();

        let scan = core.scan_url("https://evil.example/x", 1).unwrap();
        assert!(scan.is_safe);
        assert!(scan.sources.contains(&"scanning_disabled".to_string()));

        // Behavior checks still run, link checks do not
        let now = Utc::now();
        let report = core.analyze_activity_at(
            &message(1, 2, "https://evil.example/x", now),
            now,
        );
        assert!(!report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::SuspiciousLink));
    }

    #[test]
    fn test_behavior_report_surface() {
        let core = core();
        let now = Utc::now();
        core.analyze_activity_at(&message(1, 2, "free nitro here", now), now);

        let summary = core.behavior_report(1, 2);
        assert_eq!(summary.danger_points, 5);
        assert_eq!(summary.total_violations, 1);
        assert_eq!(summary.recent_messages, 1);
        assert_eq!(summary.status, "active");
    }

    #[test]
    fn test_stats_surface() {
        let core = core();
        let now = Utc::now();
        core.analyze_activity_at(&message(1, 2, "hello", now), now);
        let stats = core.stats();
        assert_eq!(stats.tracked_actors, 1);
        assert_eq!(stats.active_lockdowns, 0);
    }
}
