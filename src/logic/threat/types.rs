//! Threat Analysis Types
//!
//! Core types for threat records and derived analyses. No logic here -
//! categorization and scoring live in `taxonomy` and the analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::{ActorId, GroupId};

// ============================================================================
// TAXONOMY
// ============================================================================

/// Fixed threat taxonomy, in categorization priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatCategory {
    RaidAttempt,
    MaliciousFile,
    Spam,
    SuspiciousLink,
    SuspiciousBehavior,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::RaidAttempt => "raid_attempt",
            ThreatCategory::MaliciousFile => "malicious_file",
            ThreatCategory::Spam => "spam",
            ThreatCategory::SuspiciousLink => "suspicious_link",
            ThreatCategory::SuspiciousBehavior => "suspicious_behavior",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "raid_attempt" => ThreatCategory::RaidAttempt,
            "malicious_file" => ThreatCategory::MaliciousFile,
            "spam" => ThreatCategory::Spam,
            "suspicious_link" => ThreatCategory::SuspiciousLink,
            _ => ThreatCategory::SuspiciousBehavior,
        }
    }
}

/// Severity buckets for analyzed threats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatSeverity::Low => "low",
            ThreatSeverity::Medium => "medium",
            ThreatSeverity::High => "high",
            ThreatSeverity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "critical" => ThreatSeverity::Critical,
            "high" => ThreatSeverity::High,
            "medium" => ThreatSeverity::Medium,
            _ => ThreatSeverity::Low,
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A detection handed in for recording and analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawThreat {
    pub group: GroupId,
    pub actor: ActorId,
    /// Indicator labels from the detecting subsystem ("raid", "spam",
    /// "phishing", ...); these drive categorization and correlation.
    pub indicators: Vec<String>,
    /// Supporting evidence (offending content, URL, join-burst summary)
    pub evidence: Option<String>,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    pub detail: String,
}

/// Immutable, append-only record of a detected threat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub id: Uuid,
    pub group: GroupId,
    pub actor: ActorId,
    pub category: ThreatCategory,
    pub severity: ThreatSeverity,
    pub detail: String,
    pub indicators: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Derived analysis for one threat record. Recomputable; not a source of
/// truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAnalysis {
    pub threat_id: Uuid,
    pub category: ThreatCategory,
    pub severity: ThreatSeverity,
    pub confidence: f32,
    /// Up to 5 most recent related threat ids
    pub related: Vec<Uuid>,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Per-category scoring profile.
#[derive(Debug, Clone, Copy)]
pub struct CategoryProfile {
    /// Severity weight multiplier
    pub weight: f32,
    /// Occurrences before the category is considered established
    pub threshold: u32,
    /// Correlation / repeat-count lookback window, in seconds
    pub decay_secs: i64,
}
