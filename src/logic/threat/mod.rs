//! Threat Analyzer
//!
//! Classifies raw detections into the fixed taxonomy, scores severity,
//! correlates related incidents out of the append-only threat log and
//! emits recommendations.
//!
//! ## Structure
//! - `types`: records, analyses, taxonomy enums
//! - `taxonomy`: category table, severity scoring, recommendation table

pub mod taxonomy;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::logic::store::SqliteStore;

pub use types::{RawThreat, ThreatAnalysis, ThreatCategory, ThreatRecord, ThreatSeverity};

/// Correlation scans at most this many recent records.
const CORRELATION_SCAN_LIMIT: usize = 200;

/// Cap on related threats returned per analysis.
const MAX_RELATED: usize = 5;

pub struct ThreatAnalyzer {
    store: Arc<SqliteStore>,
}

impl ThreatAnalyzer {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Record a raw detection and produce its analysis. The record is
    /// appended to the threat log; the analysis is persisted keyed by the
    /// new threat id.
    pub fn record(&self, raw: &RawThreat) -> (ThreatRecord, ThreatAnalysis) {
        self.record_at(raw, Utc::now())
    }

    pub fn record_at(&self, raw: &RawThreat, now: DateTime<Utc>) -> (ThreatRecord, ThreatAnalysis) {
        let category = taxonomy::categorize(&raw.indicators);
        let profile = taxonomy::profile(category);
        let window_start = now - Duration::seconds(profile.decay_secs);

        // Repeats: prior records from the same source inside the window
        let repeat_count = match self.store.count_threats_by_source(raw.group, raw.actor, window_start)
        {
            Ok(n) => n,
            Err(e) => {
                log::warn!("repeat-count query failed: {}", e);
                0
            }
        };

        let confidence = derive_confidence(raw, repeat_count);
        let score = taxonomy::severity_score(
            raw.indicators.len(),
            repeat_count,
            confidence,
            profile.weight,
        );
        let severity = taxonomy::severity_bucket(score);

        let related = self.correlate(raw, window_start);

        let record = ThreatRecord {
            id: Uuid::new_v4(),
            group: raw.group,
            actor: raw.actor,
            category,
            severity,
            detail: raw.detail.clone(),
            indicators: raw.indicators.clone(),
            created_at: now,
            resolved_at: None,
        };
        if let Err(e) = self.store.add_threat(&record) {
            log::error!("failed to append threat record {}: {}", record.id, e);
        }

        let analysis = ThreatAnalysis {
            threat_id: record.id,
            category,
            severity,
            confidence,
            related,
            recommendations: taxonomy::recommendations(category, severity),
            analyzed_at: now,
        };
        if let Err(e) = self.store.put_analysis(&analysis) {
            log::error!("failed to persist analysis for {}: {}", record.id, e);
        }

        log::info!(
            "[THREAT] {} {}/{} for {}:{} (score {:.1}, {} related)",
            record.id,
            category.as_str(),
            severity.as_str(),
            raw.group,
            raw.actor,
            score,
            analysis.related.len()
        );
        (record, analysis)
    }

    /// Related incidents: same source, or sharing at least two
    /// indicators, inside the category window; newest first, capped.
    fn correlate(&self, raw: &RawThreat, window_start: DateTime<Utc>) -> Vec<Uuid> {
        let recent = match self.store.recent_threats(window_start, CORRELATION_SCAN_LIMIT) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("correlation query failed: {}", e);
                return Vec::new();
            }
        };

        recent
            .iter()
            .filter(|rec| is_related(raw, rec))
            .take(MAX_RELATED)
            .map(|rec| rec.id)
            .collect()
    }

    pub fn analysis(&self, threat_id: Uuid) -> Option<ThreatAnalysis> {
        match self.store.get_analysis(threat_id) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("analysis read failed for {}: {}", threat_id, e);
                None
            }
        }
    }

    pub fn threat(&self, threat_id: Uuid) -> Option<ThreatRecord> {
        match self.store.get_threat(threat_id) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("threat read failed for {}: {}", threat_id, e);
                None
            }
        }
    }
}

/// Same source, or two or more shared indicators.
fn is_related(raw: &RawThreat, prior: &ThreatRecord) -> bool {
    if raw.group == prior.group && raw.actor == prior.actor {
        return true;
    }
    let shared = raw
        .indicators
        .iter()
        .filter(|i| prior.indicators.contains(i))
        .count();
    shared >= 2
}

/// Confidence from the evidence the detector attached: indicators,
/// explicit evidence, repetition; averaged over contributing factors.
fn derive_confidence(raw: &RawThreat, repeat_count: u32) -> f32 {
    let mut confidence = 0.0f32;
    let mut factors = 0u32;

    if !raw.indicators.is_empty() {
        confidence += raw.indicators.len() as f32 * 0.2;
        factors += 1;
    }
    if raw.evidence.is_some() {
        confidence += 0.3;
        factors += 1;
    }
    if repeat_count > 0 {
        confidence += 0.25;
        factors += 1;
    }

    let derived = (confidence / factors.max(1) as f32).min(1.0);
    derived.max(raw.confidence.clamp(0.0, 1.0))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ThreatAnalyzer {
        ThreatAnalyzer::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    fn raw(group: u64, actor: u64, indicators: &[&str]) -> RawThreat {
        RawThreat {
            group,
            actor,
            indicators: indicators.iter().map(|s| s.to_string()).collect(),
            evidence: None,
            confidence: 0.5,
            detail: "test detection".to_string(),
        }
    }

    #[test]
    fn test_record_and_retrieve_analysis() {
        let a = analyzer();
        let (record, analysis) = a.record(&raw(1, 2, &["raid", "mass_join"]));
        assert_eq!(record.category, ThreatCategory::RaidAttempt);
        assert_eq!(analysis.threat_id, record.id);

        let loaded = a.analysis(record.id).unwrap();
        assert_eq!(loaded.category, ThreatCategory::RaidAttempt);
        assert_eq!(loaded.recommendations, analysis.recommendations);
    }

    #[test]
    fn test_repeats_raise_severity() {
        let a = analyzer();
        let mut first_severity = None;
        let mut last_severity = ThreatSeverity::Low;
        for _ in 0..6 {
            let (record, _) = a.record(&raw(1, 2, &["suspicious_link", "phishing"]));
            first_severity.get_or_insert(record.severity);
            last_severity = record.severity;
        }
        assert!(last_severity > first_severity.unwrap());
    }

    #[test]
    fn test_correlation_by_source_and_indicators() {
        let a = analyzer();
        let (first, _) = a.record(&raw(1, 2, &["spam", "flood"]));

        // Same source, different indicators
        let (_, analysis) = a.record(&raw(1, 2, &["phishing"]));
        assert!(analysis.related.contains(&first.id));

        // Different source, two shared indicators
        let (_, analysis) = a.record(&raw(9, 9, &["spam", "flood"]));
        assert!(analysis.related.contains(&first.id));

        // Different source, one shared indicator: unrelated
        let (_, analysis) = a.record(&raw(7, 7, &["spam", "weird_hours"]));
        assert!(!analysis.related.contains(&first.id));
    }

    #[test]
    fn test_related_capped_at_five() {
        let a = analyzer();
        for _ in 0..8 {
            a.record(&raw(1, 2, &["spam", "flood"]));
        }
        let (_, analysis) = a.record(&raw(1, 2, &["spam", "flood"]));
        assert_eq!(analysis.related.len(), 5);
    }

    #[test]
    fn test_confidence_floors_at_detector_value() {
        let mut r = raw(1, 2, &["spam"]);
        r.confidence = 0.9;
        let a = analyzer();
        let (_, analysis) = a.record_at(&r, Utc::now());
        assert!(analysis.confidence >= 0.9);
    }

    #[test]
    fn test_high_severity_gets_mitigation_recommendation() {
        let a = analyzer();
        let mut r = raw(1, 2, &["malware", "virus", "dropper"]);
        r.confidence = 1.0;
        r.evidence = Some("file hash".to_string());
        let (record, analysis) = a.record(&r);
        assert!(record.severity >= ThreatSeverity::High);
        assert!(analysis.recommendations[0].contains("immediate action"));
    }
}
