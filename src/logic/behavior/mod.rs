//! Behavior Watchdog - Suspicious Activity Detection
//!
//! Maintains one sliding window per (group, actor) and runs the
//! independent rule checks on every event. Each check yields at most one
//! violation; aggregation into risk points and the escalation decision
//! happen in the engine via the risk tracker.

pub mod rules;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use crate::logic::{ActorId, GroupId};

use types::{
    content_fingerprint, ActivityEvent, ActivityWindow, BehaviorConfig, StoredEvent, Violation,
    ViolationKind, ViolationSeverity,
};

type WindowKey = (GroupId, ActorId);

pub struct BehaviorWatchdog {
    windows: RwLock<HashMap<WindowKey, Arc<Mutex<ActivityWindow>>>>,
    config: BehaviorConfig,
}

impl BehaviorWatchdog {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Get or lazily create the window for a key. The outer map is held
    /// only long enough to clone the entry Arc; same-key analysis
    /// serializes on the entry lock, different keys run in parallel.
    fn window(&self, key: WindowKey) -> Arc<Mutex<ActivityWindow>> {
        if let Some(w) = self.windows.read().get(&key) {
            return w.clone();
        }
        let mut map = self.windows.write();
        map.entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(ActivityWindow::new(self.config.max_events))))
            .clone()
    }

    /// Analyze one event: append to the actor's window, prune, then run
    /// the independent checks.
    pub fn analyze(&self, event: &ActivityEvent) -> Vec<Violation> {
        self.analyze_at(event, Utc::now())
    }

    pub fn analyze_at(&self, event: &ActivityEvent, now: DateTime<Utc>) -> Vec<Violation> {
        let fingerprint = content_fingerprint(&event.content);
        let window = self.window((event.group, event.actor));
        let mut window = window.lock();

        window.push(StoredEvent {
            fingerprint: fingerprint.clone(),
            channel: event.channel,
            mentions: event.mentions,
            timestamp: event.timestamp,
        });
        window.prune(now - self.config.retention_horizon());

        let mut violations = Vec::new();
        let weights = &self.config.weights;

        // 1. Suspicious keywords (one violation, worst severity wins)
        let matched = rules::match_content(&event.content);
        if !matched.is_empty() {
            let severity = matched
                .iter()
                .map(|r| r.severity)
                .max()
                .unwrap_or(ViolationSeverity::Medium);
            let labels: Vec<&str> = matched.iter().map(|r| r.label).collect();
            violations.push(Violation {
                kind: ViolationKind::SuspiciousKeywords,
                points: weights.suspicious_keywords,
                severity,
                detail: labels.join(", "),
            });
        }

        // 2. Duplicate content: >= threshold identical fingerprints in the
        // sub-window, current event included. Exactly threshold-1 stays
        // clean.
        let dup_since = now - Duration::minutes(self.config.duplicate_window_mins);
        let duplicates = window.duplicates_since(&fingerprint, dup_since);
        if duplicates >= self.config.duplicate_threshold {
            violations.push(Violation {
                kind: ViolationKind::DuplicateMessages,
                points: weights.duplicate_messages,
                severity: ViolationSeverity::Medium,
                detail: format!("{} identical messages", duplicates),
            });
        }

        // 3. Rapid posting in the trailing minute
        let recent = window.count_since(now - Duration::seconds(60));
        if recent > self.config.max_messages_per_minute as usize {
            violations.push(Violation {
                kind: ViolationKind::RapidPosting,
                points: weights.rapid_posting,
                severity: ViolationSeverity::Medium,
                detail: format!("{} messages in 60s", recent),
            });
        }

        // 4. Channel hopping
        let hop_since = now - Duration::minutes(self.config.channel_hop_window_mins);
        let channels = window.channels_since(hop_since);
        if channels >= self.config.channel_hop_threshold {
            violations.push(Violation {
                kind: ViolationKind::ChannelHopping,
                points: weights.channel_hopping,
                severity: ViolationSeverity::Medium,
                detail: format!("{} channels in {}m", channels, self.config.channel_hop_window_mins),
            });
        }

        // 5. Mass mentions in this single event
        if event.mentions >= self.config.mass_mention_threshold {
            violations.push(Violation {
                kind: ViolationKind::MassMentions,
                points: weights.mass_mentions,
                severity: ViolationSeverity::High,
                detail: format!("{} mentions", event.mentions),
            });
        }

        // 6. Encoded content
        if rules::has_base64_run(&event.content) {
            violations.push(Violation {
                kind: ViolationKind::EncodedContent,
                points: weights.encoded_content,
                severity: ViolationSeverity::Medium,
                detail: "base64 run".to_string(),
            });
        } else if rules::low_whitespace_density(&event.content) {
            violations.push(Violation {
                kind: ViolationKind::EncodedContent,
                points: weights.encoded_content,
                severity: ViolationSeverity::Low,
                detail: "low whitespace density".to_string(),
            });
        }

        violations
    }

    /// Window stats for the reporting surface.
    pub fn window_stats(&self, group: GroupId, actor: ActorId, now: DateTime<Utc>) -> (usize, usize) {
        let key = (group, actor);
        let Some(window) = self.windows.read().get(&key).cloned() else {
            return (0, 0);
        };
        let mut window = window.lock();
        window.prune(now - self.config.retention_horizon());
        let messages = window.len();
        let channels = window.channels_since(now - self.config.retention_horizon());
        (messages, channels)
    }

    /// Drop an actor's window (used on score reset).
    pub fn forget(&self, group: GroupId, actor: ActorId) {
        self.windows.write().remove(&(group, actor));
    }

    /// Drop windows that have gone idle past the retention horizon.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.retention_horizon();
        let mut map = self.windows.write();
        let before = map.len();
        map.retain(|_, window| {
            let mut w = window.lock();
            w.prune(cutoff);
            !w.is_empty()
        });
        before - map.len()
    }

    pub fn tracked_actors(&self) -> usize {
        self.windows.read().len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(actor: ActorId, channel: u64, content: &str, ts: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            group: 1,
            actor,
            channel,
            content: content.to_string(),
            mentions: 0,
            timestamp: ts,
        }
    }

    fn has(violations: &[Violation], kind: ViolationKind) -> bool {
        violations.iter().any(|v| v.kind == kind)
    }

    #[test]
    fn test_duplicate_boundary_two_clean_three_fires() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();

        let v1 = w.analyze_at(&event(1, 1, "buy my stuff", now), now);
        assert!(!has(&v1, ViolationKind::DuplicateMessages));

        let v2 = w.analyze_at(&event(1, 1, "buy my stuff", now + Duration::seconds(5)), now + Duration::seconds(5));
        assert!(!has(&v2, ViolationKind::DuplicateMessages));

        let v3 = w.analyze_at(&event(1, 1, "buy my stuff", now + Duration::seconds(10)), now + Duration::seconds(10));
        assert!(has(&v3, ViolationKind::DuplicateMessages));
    }

    #[test]
    fn test_duplicates_outside_subwindow_ignored() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        w.analyze_at(&event(1, 1, "hello there", now - Duration::minutes(15)), now - Duration::minutes(15));
        w.analyze_at(&event(1, 1, "hello there", now - Duration::minutes(12)), now - Duration::minutes(12));
        let v = w.analyze_at(&event(1, 1, "hello there", now), now);
        assert!(!has(&v, ViolationKind::DuplicateMessages));
    }

    #[test]
    fn test_rapid_posting() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        let mut fired = false;
        for i in 0..12 {
            let ts = now + Duration::seconds(i * 2);
            let v = w.analyze_at(&event(1, 1, &format!("message {}", i), ts), ts);
            fired |= has(&v, ViolationKind::RapidPosting);
        }
        assert!(fired);
    }

    #[test]
    fn test_channel_hopping() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        let mut last = Vec::new();
        for ch in 1..=5u64 {
            let ts = now + Duration::seconds(ch as i64);
            last = w.analyze_at(&event(1, ch, &format!("hi {}", ch), ts), ts);
        }
        assert!(has(&last, ViolationKind::ChannelHopping));
    }

    #[test]
    fn test_mass_mentions() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        let mut ev = event(1, 1, "everyone look", now);
        ev.mentions = 5;
        let v = w.analyze_at(&ev, now);
        assert!(has(&v, ViolationKind::MassMentions));

        let mut ev = event(1, 1, "small ping", now + Duration::seconds(1));
        ev.mentions = 4;
        let v = w.analyze_at(&ev, now + Duration::seconds(1));
        assert!(!has(&v, ViolationKind::MassMentions));
    }

    #[test]
    fn test_keyword_check_yields_single_violation() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        let v = w.analyze_at(
            &event(1, 1, "congratulations! click here for free nitro", now),
            now,
        );
        let keyword_count = v
            .iter()
            .filter(|x| x.kind == ViolationKind::SuspiciousKeywords)
            .count();
        assert_eq!(keyword_count, 1);
        // Worst matching rule drives the severity
        assert_eq!(v[0].severity, ViolationSeverity::High);
    }

    #[test]
    fn test_encoded_content() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        let v = w.analyze_at(
            &event(1, 1, "run this: c2VjcmV0IHBheWxvYWQgZGF0YSBoZXJl", now),
            now,
        );
        assert!(has(&v, ViolationKind::EncodedContent));
    }

    #[test]
    fn test_actors_are_independent() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        for (i, actor) in [(0i64, 1u64), (1, 2), (2, 3)] {
            let ts = now + Duration::seconds(i);
            let v = w.analyze_at(&event(actor, 1, "same spam text", ts), ts);
            // Each actor has posted it once; nobody trips the duplicate check
            assert!(!has(&v, ViolationKind::DuplicateMessages));
        }
        assert_eq!(w.tracked_actors(), 3);
    }

    #[test]
    fn test_cleanup_drops_idle_windows() {
        let w = BehaviorWatchdog::new(BehaviorConfig::default());
        let now = Utc::now();
        w.analyze_at(&event(1, 1, "old message", now - Duration::hours(30)), now - Duration::hours(30));
        w.analyze_at(&event(2, 1, "fresh message", now), now);
        assert_eq!(w.tracked_actors(), 2);

        let dropped = w.cleanup_at(now);
        assert_eq!(dropped, 1);
        assert_eq!(w.tracked_actors(), 1);
    }
}
