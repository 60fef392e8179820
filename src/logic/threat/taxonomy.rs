//! Threat Taxonomy & Recommendation Tables
//!
//! Categorization priority, per-category scoring profiles and the fixed
//! recommendation table. Pure lookup logic, no state.

use super::types::{CategoryProfile, ThreatCategory, ThreatSeverity};

// ============================================================================
// CATEGORY PROFILES
// ============================================================================

const HOUR: i64 = 3600;
const DAY: i64 = 24 * HOUR;

/// Scoring profile per category. Heavier categories score higher and
/// correlate over a longer window.
pub fn profile(category: ThreatCategory) -> CategoryProfile {
    match category {
        ThreatCategory::Spam => CategoryProfile {
            weight: 1.0,
            threshold: 5,
            decay_secs: DAY,
        },
        ThreatCategory::SuspiciousLink => CategoryProfile {
            weight: 2.0,
            threshold: 3,
            decay_secs: 7 * DAY,
        },
        ThreatCategory::RaidAttempt => CategoryProfile {
            weight: 3.0,
            threshold: 2,
            decay_secs: 14 * DAY,
        },
        ThreatCategory::MaliciousFile => CategoryProfile {
            weight: 4.0,
            threshold: 1,
            decay_secs: 30 * DAY,
        },
        ThreatCategory::SuspiciousBehavior => CategoryProfile {
            weight: 2.0,
            threshold: 4,
            decay_secs: 3 * DAY,
        },
    }
}

// ============================================================================
// CATEGORIZATION
// ============================================================================

/// Assign the first category whose indicator set matches, in fixed
/// priority order. A raid indicator always outranks a spam indicator.
pub fn categorize(indicators: &[String]) -> ThreatCategory {
    let has = |needle: &str| indicators.iter().any(|i| i == needle);

    if has("raid") || has("mass_join") {
        return ThreatCategory::RaidAttempt;
    }
    if has("malware") || has("virus") {
        return ThreatCategory::MaliciousFile;
    }
    if has("spam") || has("flood") {
        return ThreatCategory::Spam;
    }
    if has("suspicious_link") || has("phishing") {
        return ThreatCategory::SuspiciousLink;
    }
    ThreatCategory::SuspiciousBehavior
}

// ============================================================================
// SEVERITY
// ============================================================================

/// Severity score: indicators carry full category weight, repeats half,
/// and the whole thing is scaled by detector confidence.
pub fn severity_score(
    indicator_count: usize,
    repeat_count: u32,
    confidence: f32,
    weight: f32,
) -> f32 {
    let mut score = indicator_count as f32 * weight + repeat_count as f32 * (weight / 2.0);
    score *= (confidence.clamp(0.0, 1.0) + 1.0) / 2.0;
    score
}

/// Bucket a severity score.
pub fn severity_bucket(score: f32) -> ThreatSeverity {
    if score >= 15.0 {
        ThreatSeverity::Critical
    } else if score >= 10.0 {
        ThreatSeverity::High
    } else if score >= 5.0 {
        ThreatSeverity::Medium
    } else {
        ThreatSeverity::Low
    }
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

/// Fixed recommendation table keyed by (category, severity).
pub fn recommendations(category: ThreatCategory, severity: ThreatSeverity) -> Vec<String> {
    let mut recs = Vec::new();

    match severity {
        ThreatSeverity::Critical | ThreatSeverity::High => {
            recs.push("Take immediate action to contain the threat".to_string());

            match category {
                ThreatCategory::RaidAttempt => {
                    recs.push("Raise the group verification level".to_string());
                    recs.push("Review the group's security settings".to_string());
                    recs.push("Temporarily restrict new member joins".to_string());
                }
                ThreatCategory::MaliciousFile => {
                    recs.push("Delete the flagged file immediately".to_string());
                    recs.push("Rescan the group for duplicate uploads".to_string());
                    recs.push("Update the blocked-file list".to_string());
                }
                ThreatCategory::SuspiciousLink => {
                    recs.push("Remove the message and blacklist the domain".to_string());
                    recs.push("Notify members who clicked the link".to_string());
                }
                ThreatCategory::Spam | ThreatCategory::SuspiciousBehavior => {
                    recs.push("Timeout the actor pending review".to_string());
                }
            }
        }
        ThreatSeverity::Medium => {
            recs.push("Monitor the situation closely".to_string());

            if category == ThreatCategory::SuspiciousBehavior {
                recs.push("Log the actor's recent activity".to_string());
                recs.push("Review the actor's permissions".to_string());
            }
        }
        ThreatSeverity::Low => {
            recs.push("Document the threat for future review".to_string());
        }
    }

    recs
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn inds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_priority_order() {
        // A raid indicator outranks everything else present
        let c = categorize(&inds(&["spam", "raid", "phishing"]));
        assert_eq!(c, ThreatCategory::RaidAttempt);

        let c = categorize(&inds(&["phishing", "malware"]));
        assert_eq!(c, ThreatCategory::MaliciousFile);

        let c = categorize(&inds(&["flood", "suspicious_link"]));
        assert_eq!(c, ThreatCategory::Spam);
    }

    #[test]
    fn test_fallback_category() {
        assert_eq!(
            categorize(&inds(&["weird_hours"])),
            ThreatCategory::SuspiciousBehavior
        );
        assert_eq!(categorize(&[]), ThreatCategory::SuspiciousBehavior);
    }

    #[test]
    fn test_severity_buckets() {
        // 3 indicators * weight 4 = 12, scaled by (1+1)/2 = 12 -> High
        let score = severity_score(3, 0, 1.0, 4.0);
        assert_eq!(severity_bucket(score), ThreatSeverity::High);

        // Low confidence halves the scale: 12 * 0.5 = 6 -> Medium
        let score = severity_score(3, 0, 0.0, 4.0);
        assert_eq!(severity_bucket(score), ThreatSeverity::Medium);

        // Repeats push it over the critical line: (2*3 + 4*1.5) * 1 = 12,
        // plus two more indicators of weight 3 -> 18
        let score = severity_score(4, 4, 1.0, 3.0);
        assert!(severity_bucket(score) == ThreatSeverity::Critical);

        assert_eq!(severity_bucket(0.0), ThreatSeverity::Low);
    }

    #[test]
    fn test_high_severity_always_has_mitigation() {
        for cat in [
            ThreatCategory::RaidAttempt,
            ThreatCategory::MaliciousFile,
            ThreatCategory::Spam,
            ThreatCategory::SuspiciousLink,
            ThreatCategory::SuspiciousBehavior,
        ] {
            for sev in [ThreatSeverity::High, ThreatSeverity::Critical] {
                let recs = recommendations(cat, sev);
                assert!(recs[0].contains("immediate action"), "{:?}/{:?}", cat, sev);
                assert!(recs.len() >= 2);
            }
        }
    }

    #[test]
    fn test_category_windows() {
        assert!(profile(ThreatCategory::MaliciousFile).decay_secs
            > profile(ThreatCategory::Spam).decay_secs);
    }
}
