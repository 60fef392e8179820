//! Link Guardian Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// VERDICT TYPES
// ============================================================================

/// Merged safety classification of a URL, least to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkThreatLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl LinkThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkThreatLevel::Safe => "safe",
            LinkThreatLevel::Low => "low",
            LinkThreatLevel::Medium => "medium",
            LinkThreatLevel::High => "high",
        }
    }
}

/// Result of a full URL scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Normalized form of the scanned URL
    pub url: String,
    pub url_hash: String,
    pub is_safe: bool,
    pub threat_level: LinkThreatLevel,
    /// Confidence in the verdict, [0, 1]
    pub confidence: f32,
    /// Threat labels from heuristics and external engines
    pub threats: Vec<String>,
    /// Which sources contributed ("heuristics", "blacklist", "reputation_api")
    pub sources: Vec<String>,
    /// Served from cache without a fresh scan
    pub cached: bool,
}

/// Persisted reputation verdict, keyed by the hash of the normalized URL.
///
/// Written once per lookup via idempotent upsert; never served past
/// `cached_at + ttl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkReputationRecord {
    pub url_hash: String,
    pub url: String,
    pub is_malicious: bool,
    pub confidence: f32,
    pub sources: Vec<String>,
    pub threat_names: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

impl LinkReputationRecord {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        (now - self.cached_at).num_seconds() > ttl_secs
    }

    /// Rehydrate a cached record into a scan result.
    pub fn to_scan_result(&self) -> ScanResult {
        let threat_level = if !self.is_malicious {
            LinkThreatLevel::Safe
        } else if self.confidence >= 0.7 {
            LinkThreatLevel::High
        } else {
            LinkThreatLevel::Medium
        };
        ScanResult {
            url: self.url.clone(),
            url_hash: self.url_hash.clone(),
            is_safe: !self.is_malicious,
            threat_level,
            confidence: self.confidence,
            threats: self.threat_names.clone(),
            sources: self.sources.clone(),
            cached: true,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Scan error types. Only explicit API misuse reaches the caller;
/// external failures degrade the verdict instead.
#[derive(Debug, Clone)]
pub enum ScanError {
    InvalidUrl { reason: String },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::InvalidUrl { reason } => write!(f, "invalid url: {}", reason),
        }
    }
}

impl std::error::Error for ScanError {}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Reputation record TTL in seconds
    pub ttl_secs: i64,
    /// External source confidence floor; a source below it cannot flip the
    /// merged verdict to unsafe on its own
    pub confidence_floor: f32,
    /// Confidence penalty applied when the external API fails
    pub api_degrade: f32,
    /// Maximum distinct links scanned per message
    pub max_links_per_message: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            confidence_floor: 0.5,
            api_degrade: 0.2,
            max_links_per_message: 5,
        }
    }
}
