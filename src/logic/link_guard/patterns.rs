//! Link Heuristic Rules
//!
//! Uniform rule table evaluated in one pass, plus the known-safe domain
//! set. Data-driven so new patterns are one table row, not a new branch.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::LinkThreatLevel;

// ============================================================================
// RULE TABLE
// ============================================================================

pub struct LinkRule {
    pub pattern: &'static str,
    pub label: &'static str,
    pub level: LinkThreatLevel,
    /// Confidence contribution when this rule matches
    pub weight: f32,
}

pub const LINK_RULES: &[LinkRule] = &[
    LinkRule {
        pattern: r"(?i)//(bit\.ly|tinyurl\.com|goo\.gl|t\.co|is\.gd|cutt\.ly)/",
        label: "url_shortener",
        level: LinkThreatLevel::Low,
        weight: 0.3,
    },
    LinkRule {
        pattern: r"(?i)discord(app)?\.gift",
        label: "gift_bait",
        level: LinkThreatLevel::High,
        weight: 0.85,
    },
    LinkRule {
        pattern: r"(?i)free[-_.]?nitro",
        label: "nitro_bait",
        level: LinkThreatLevel::High,
        weight: 0.85,
    },
    LinkRule {
        pattern: r"(?i)steam[a-z0-9-]*\.(com|net|ru)/.*(gift|trade|community)",
        label: "steam_bait",
        level: LinkThreatLevel::Medium,
        weight: 0.6,
    },
    LinkRule {
        pattern: r"^https?://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
        label: "ip_literal_host",
        level: LinkThreatLevel::Medium,
        weight: 0.5,
    },
    LinkRule {
        pattern: r"(?i)\.(tk|ml|ga|cf|gq)(:\d+)?(/|$)",
        label: "throwaway_tld",
        level: LinkThreatLevel::Medium,
        weight: 0.5,
    },
    LinkRule {
        pattern: r"(?i)(verify|login|signin|password|recover)[a-z0-9-]*\.(xyz|top|click|link)",
        label: "credential_bait",
        level: LinkThreatLevel::Medium,
        weight: 0.6,
    },
];

static COMPILED: Lazy<Vec<(Regex, &'static LinkRule)>> = Lazy::new(|| {
    LINK_RULES
        .iter()
        .filter_map(|rule| match Regex::new(rule.pattern) {
            Ok(re) => Some((re, rule)),
            Err(e) => {
                log::error!("invalid link rule '{}': {}", rule.label, e);
                None
            }
        })
        .collect()
});

/// Every rule the URL matches, in table order.
pub fn match_rules(url: &str) -> Vec<&'static LinkRule> {
    COMPILED
        .iter()
        .filter(|(re, _)| re.is_match(url))
        .map(|(_, rule)| *rule)
        .collect()
}

// ============================================================================
// DOMAIN SETS
// ============================================================================

static SAFE_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "discord.com",
        "discordapp.com",
        "discord.gg",
        "github.com",
        "youtube.com",
        "youtu.be",
        "google.com",
        "stackoverflow.com",
        "wikipedia.org",
        "reddit.com",
    ])
});

/// Known-safe host, exact or subdomain of a safe domain.
pub fn is_safe_domain(host: &str) -> bool {
    SAFE_DOMAINS.contains(host)
        || SAFE_DOMAINS
            .iter()
            .any(|safe| host.len() > safe.len() && host.ends_with(safe)
                && host.as_bytes()[host.len() - safe.len() - 1] == b'.')
}

/// Domain-shape heuristic: hosts that are mostly digits are usually
/// machine-generated throwaways.
pub fn suspicious_domain_shape(host: &str) -> bool {
    let digits = host.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f32 > host.len() as f32 * 0.3
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_bait_rule() {
        let matches = match_rules("https://discord.gift/free");
        assert!(matches.iter().any(|r| r.label == "gift_bait"));
        assert!(matches.iter().any(|r| r.level == LinkThreatLevel::High));
    }

    #[test]
    fn test_shortener_is_low() {
        let matches = match_rules("https://bit.ly/3xyz");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].level, LinkThreatLevel::Low);
    }

    #[test]
    fn test_ip_literal_and_tld() {
        assert!(match_rules("http://192.168.13.37/payload")
            .iter()
            .any(|r| r.label == "ip_literal_host"));
        assert!(match_rules("https://a8f3kq9.tk/x")
            .iter()
            .any(|r| r.label == "throwaway_tld"));
    }

    #[test]
    fn test_clean_url_matches_nothing() {
        assert!(match_rules("https://github.com/rust-lang/rust").is_empty());
    }

    #[test]
    fn test_safe_domain_suffix_match() {
        assert!(is_safe_domain("github.com"));
        assert!(is_safe_domain("gist.github.com"));
        // Lookalike must not pass the suffix check
        assert!(!is_safe_domain("evilgithub.com"));
    }

    #[test]
    fn test_domain_shape() {
        assert!(suspicious_domain_shape("99194-13.biz"));
        assert!(!suspicious_domain_shape("example.com"));
    }
}
