//! Suspicious Content Rules
//!
//! Uniform pattern table for the keyword check, compiled once, evaluated
//! in a single pass. Adding a pattern is one table row.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::ViolationSeverity;

// ============================================================================
// RULE TABLE
// ============================================================================

pub struct ContentRule {
    pub pattern: &'static str,
    pub label: &'static str,
    pub severity: ViolationSeverity,
}

pub const CONTENT_RULES: &[ContentRule] = &[
    ContentRule {
        pattern: r"(?i)(free\s+nitro|discord\s+gift)",
        label: "gift_scam",
        severity: ViolationSeverity::High,
    },
    ContentRule {
        pattern: r"(?i)(click\s+here|claim\s+now|claim\s+your\s+prize)",
        label: "call_to_action_bait",
        severity: ViolationSeverity::Medium,
    },
    ContentRule {
        pattern: r"(?i)(verify\s+(your\s+)?account|account\s+suspended)",
        label: "account_phishing",
        severity: ViolationSeverity::High,
    },
    ContentRule {
        pattern: r"(?i)(congratulations|you\s+won)",
        label: "prize_bait",
        severity: ViolationSeverity::Medium,
    },
    ContentRule {
        pattern: r"(?i)(limited\s+time|act\s+fast|urgent\s+action)",
        label: "urgency_pressure",
        severity: ViolationSeverity::Medium,
    },
    ContentRule {
        pattern: r"(?i)(free\s+bitcoin|crypto\s+giveaway)",
        label: "crypto_scam",
        severity: ViolationSeverity::High,
    },
    ContentRule {
        pattern: r"(?i)(password|login\s+here)",
        label: "credential_bait",
        severity: ViolationSeverity::Medium,
    },
];

static COMPILED: Lazy<Vec<(Regex, &'static ContentRule)>> = Lazy::new(|| {
    CONTENT_RULES
        .iter()
        .filter_map(|rule| match Regex::new(rule.pattern) {
            Ok(re) => Some((re, rule)),
            Err(e) => {
                log::error!("invalid content rule '{}': {}", rule.label, e);
                None
            }
        })
        .collect()
});

/// All matching rules for a message, in table order.
pub fn match_content(content: &str) -> Vec<&'static ContentRule> {
    COMPILED
        .iter()
        .filter(|(re, _)| re.is_match(content))
        .map(|(_, rule)| *rule)
        .collect()
}

// ============================================================================
// ENCODED-CONTENT HEURISTICS
// ============================================================================

static BASE64_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").expect("base64 regex"));

/// Long run of base64-alphabet characters.
pub fn has_base64_run(content: &str) -> bool {
    BASE64_RUN.is_match(content)
}

/// Long content with almost no whitespace reads as an encoded blob.
pub fn low_whitespace_density(content: &str) -> bool {
    if content.len() <= 50 {
        return false;
    }
    let spaces = content.chars().filter(|c| c.is_whitespace()).count();
    (spaces as f32 / content.len() as f32) < 0.1
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_scam_matches() {
        let matches = match_content("get your FREE NITRO today!!");
        assert!(matches.iter().any(|r| r.label == "gift_scam"));
    }

    #[test]
    fn test_multiple_rules_match() {
        let matches = match_content("congratulations, click here to verify account");
        let labels: Vec<_> = matches.iter().map(|r| r.label).collect();
        assert!(labels.contains(&"prize_bait"));
        assert!(labels.contains(&"call_to_action_bait"));
        assert!(labels.contains(&"account_phishing"));
    }

    #[test]
    fn test_clean_content() {
        assert!(match_content("anyone up for a game tonight?").is_empty());
    }

    #[test]
    fn test_base64_run() {
        assert!(has_base64_run("payload: aGVsbG8gd29ybGQgdGhpcyBpcyBsb25n=="));
        assert!(!has_base64_run("short aGVsbG8"));
    }

    #[test]
    fn test_whitespace_density() {
        let blob = "x".repeat(80);
        assert!(low_whitespace_density(&blob));
        assert!(!low_whitespace_density("normal sentence with plenty of spaces in it, honestly"));
        // Boundary: 50 chars or fewer never triggers
        assert!(!low_whitespace_density(&"y".repeat(50)));
    }
}
