//! Behavior Watchdog Types
//!
//! Events, sliding windows and violation records. The checks themselves
//! live in the watchdog; the pattern table in `rules`.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants;
use crate::logic::risk::types::EscalationTier;
use crate::logic::{ActorId, ChannelId, GroupId};

// ============================================================================
// EVENTS
// ============================================================================

/// A posted message as delivered by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub group: GroupId,
    pub actor: ActorId,
    pub channel: ChannelId,
    pub content: String,
    /// User + role mentions in the message
    pub mentions: u32,
    pub timestamp: DateTime<Utc>,
}

/// An edited message; the after-content is re-analyzed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditedEvent {
    pub group: GroupId,
    pub actor: ActorId,
    pub channel: ChannelId,
    pub before: String,
    pub after: String,
    pub mentions: u32,
    pub timestamp: DateTime<Utc>,
}

impl EditedEvent {
    pub fn as_activity(&self) -> ActivityEvent {
        ActivityEvent {
            group: self.group,
            actor: self.actor,
            channel: self.channel,
            content: self.after.clone(),
            mentions: self.mentions,
            timestamp: self.timestamp,
        }
    }
}

/// Content fingerprint: SHA-256 of the lowercased, trimmed content,
/// truncated to 16 hex chars. Identical spam payloads collide by design.
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().to_lowercase().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

// ============================================================================
// SLIDING WINDOW
// ============================================================================

/// One retained event inside an actor's window. Only the fingerprint of
/// the content is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub fingerprint: String,
    pub channel: ChannelId,
    pub mentions: u32,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-pruned window of one actor's recent activity.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    events: VecDeque<StoredEvent>,
    max_events: usize,
}

impl ActivityWindow {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(64)),
            max_events,
        }
    }

    /// Append an event, dropping the oldest once the size bound is hit.
    pub fn push(&mut self, event: StoredEvent) {
        if self.events.len() == self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Drop events older than the retention horizon.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.events.front() {
            if front.timestamp < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest_at(&self) -> Option<DateTime<Utc>> {
        self.events.back().map(|e| e.timestamp)
    }

    /// Events since `since` (inclusive of the current one).
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.events.iter().filter(|e| e.timestamp > since).count()
    }

    /// Distinct channels posted to since `since`.
    pub fn channels_since(&self, since: DateTime<Utc>) -> usize {
        self.events
            .iter()
            .filter(|e| e.timestamp > since)
            .map(|e| e.channel)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Occurrences of the given fingerprint since `since`.
    pub fn duplicates_since(&self, fingerprint: &str, since: DateTime<Utc>) -> usize {
        self.events
            .iter()
            .filter(|e| e.timestamp > since && e.fingerprint == fingerprint)
            .count()
    }
}

// ============================================================================
// VIOLATIONS
// ============================================================================

/// Behavior violation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    SuspiciousKeywords,
    DuplicateMessages,
    RapidPosting,
    ChannelHopping,
    MassMentions,
    EncodedContent,
    SuspiciousLink,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::SuspiciousKeywords => "suspicious_keywords",
            ViolationKind::DuplicateMessages => "duplicate_messages",
            ViolationKind::RapidPosting => "rapid_posting",
            ViolationKind::ChannelHopping => "channel_hopping",
            ViolationKind::MassMentions => "mass_mentions",
            ViolationKind::EncodedContent => "encoded_content",
            ViolationKind::SuspiciousLink => "suspicious_links",
        }
    }

    /// Indicator label used for threat correlation.
    pub fn indicator(&self) -> &'static str {
        match self {
            ViolationKind::SuspiciousKeywords => "phishing",
            ViolationKind::DuplicateMessages => "spam",
            ViolationKind::RapidPosting => "flood",
            ViolationKind::ChannelHopping => "flood",
            ViolationKind::MassMentions => "spam",
            ViolationKind::EncodedContent => "obfuscation",
            ViolationKind::SuspiciousLink => "suspicious_link",
        }
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
}

impl ViolationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationSeverity::Low => "low",
            ViolationSeverity::Medium => "medium",
            ViolationSeverity::High => "high",
        }
    }
}

/// One rule check outcome; each check yields at most one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub points: u32,
    pub severity: ViolationSeverity,
    pub detail: String,
}

/// Outcome of analyzing a single event, including the post-increment
/// risk total and the escalation recommendation derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct BehaviorReport {
    pub is_suspicious: bool,
    pub violations: Vec<Violation>,
    /// Points added by this event
    pub total_points: u32,
    /// Actor's cumulative risk total after this event
    pub risk_total: u32,
    pub recommended_action: EscalationTier,
}

impl BehaviorReport {
    pub fn clean(risk_total: u32) -> Self {
        Self {
            is_suspicious: false,
            violations: Vec::new(),
            total_points: 0,
            risk_total,
            recommended_action: EscalationTier::Monitor,
        }
    }
}

/// Point-in-time summary of one actor (reporting surface).
#[derive(Debug, Clone, Serialize)]
pub struct ActorBehaviorSummary {
    pub group: GroupId,
    pub actor: ActorId,
    pub danger_points: u32,
    pub total_violations: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub status: String,
    pub recent_messages: usize,
    pub active_channels: usize,
}

// ============================================================================
// CONFIG
// ============================================================================

/// Points per violation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationWeights {
    pub suspicious_keywords: u32,
    pub duplicate_messages: u32,
    pub rapid_posting: u32,
    pub channel_hopping: u32,
    pub mass_mentions: u32,
    pub encoded_content: u32,
    pub suspicious_links: u32,
}

impl Default for ViolationWeights {
    fn default() -> Self {
        Self {
            suspicious_keywords: 5,
            duplicate_messages: 4,
            rapid_posting: 2,
            channel_hopping: 3,
            mass_mentions: 6,
            encoded_content: 4,
            suspicious_links: 7,
        }
    }
}

impl ViolationWeights {
    pub fn for_kind(&self, kind: ViolationKind) -> u32 {
        match kind {
            ViolationKind::SuspiciousKeywords => self.suspicious_keywords,
            ViolationKind::DuplicateMessages => self.duplicate_messages,
            ViolationKind::RapidPosting => self.rapid_posting,
            ViolationKind::ChannelHopping => self.channel_hopping,
            ViolationKind::MassMentions => self.mass_mentions,
            ViolationKind::EncodedContent => self.encoded_content,
            ViolationKind::SuspiciousLink => self.suspicious_links,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Size bound per actor window
    pub max_events: usize,
    /// Retention horizon for window entries
    pub retention_hours: i64,
    /// Rapid-posting limit per trailing minute
    pub max_messages_per_minute: u32,
    /// Identical messages within the sub-window before a violation
    pub duplicate_threshold: usize,
    pub duplicate_window_mins: i64,
    /// Distinct channels within the hop window before a violation
    pub channel_hop_threshold: usize,
    pub channel_hop_window_mins: i64,
    /// Mentions in a single event before a violation
    pub mass_mention_threshold: u32,
    pub weights: ViolationWeights,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_events: 50,
            retention_hours: 24,
            max_messages_per_minute: constants::DEFAULT_MAX_MESSAGES_PER_MINUTE,
            duplicate_threshold: 3,
            duplicate_window_mins: 10,
            channel_hop_threshold: 5,
            channel_hop_window_mins: 5,
            mass_mention_threshold: 5,
            weights: ViolationWeights::default(),
        }
    }
}

impl BehaviorConfig {
    pub fn from_env() -> Self {
        Self {
            max_messages_per_minute: constants::get_max_messages_per_minute(),
            ..Default::default()
        }
    }

    pub fn retention_horizon(&self) -> Duration {
        Duration::hours(self.retention_hours)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_normalizes_case_and_whitespace() {
        assert_eq!(
            content_fingerprint("Free Nitro!  "),
            content_fingerprint("free nitro!")
        );
        assert_ne!(content_fingerprint("a"), content_fingerprint("b"));
        assert_eq!(content_fingerprint("x").len(), 16);
    }

    #[test]
    fn test_window_size_bound() {
        let mut w = ActivityWindow::new(3);
        let now = Utc::now();
        for i in 0..5 {
            w.push(StoredEvent {
                fingerprint: format!("f{}", i),
                channel: 1,
                mentions: 0,
                timestamp: now + Duration::seconds(i),
            });
        }
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn test_window_prune() {
        let mut w = ActivityWindow::new(50);
        let now = Utc::now();
        for i in 0..10 {
            w.push(StoredEvent {
                fingerprint: "f".to_string(),
                channel: 1,
                mentions: 0,
                timestamp: now + Duration::minutes(i),
            });
        }
        w.prune(now + Duration::minutes(5));
        assert_eq!(w.len(), 5);
    }

    #[test]
    fn test_channels_since() {
        let mut w = ActivityWindow::new(50);
        let now = Utc::now();
        for ch in [1u64, 2, 3, 2, 1] {
            w.push(StoredEvent {
                fingerprint: "f".to_string(),
                channel: ch,
                mentions: 0,
                timestamp: now,
            });
        }
        assert_eq!(w.channels_since(now - Duration::minutes(5)), 3);
    }
}
