//! Link Guardian - URL Reputation Checking
//!
//! Resolves a URL to a safety verdict: cache, then local heuristics, then
//! a rate-limited external lookup merged by confidence-weighted OR.
//! External failures degrade confidence; they never fail the scan.

pub mod normalize;
pub mod patterns;
pub mod types;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;

use crate::logic::cache::TtlCache;
use crate::logic::external_intel::ReputationApi;
use crate::logic::store::SqliteStore;

use normalize::{normalize, url_hash};
use types::{LinkConfig, LinkReputationRecord, LinkThreatLevel, ScanError, ScanResult};

/// Cache class for reputation records
const CACHE_CLASS: &str = "link_scan";

// ============================================================================
// STATS
// ============================================================================

#[derive(Default)]
struct ScanCounters {
    scans: AtomicU64,
    cache_hits: AtomicU64,
    malicious_found: AtomicU64,
    api_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub scans: u64,
    pub cache_hits: u64,
    pub malicious_found: u64,
    pub api_errors: u64,
    pub blacklisted_domains: usize,
    pub allowlisted_domains: usize,
}

// ============================================================================
// GUARDIAN
// ============================================================================

pub struct LinkGuardian {
    cache: Arc<TtlCache>,
    store: Arc<SqliteStore>,
    api: Option<Arc<dyn ReputationApi>>,
    config: LinkConfig,
    blacklist: RwLock<HashSet<String>>,
    allowlist: RwLock<HashSet<String>>,
    counters: ScanCounters,
}

impl LinkGuardian {
    pub fn new(
        cache: Arc<TtlCache>,
        store: Arc<SqliteStore>,
        api: Option<Arc<dyn ReputationApi>>,
        config: LinkConfig,
    ) -> Self {
        Self {
            cache,
            store,
            api,
            config,
            blacklist: RwLock::new(HashSet::new()),
            allowlist: RwLock::new(HashSet::new()),
            counters: ScanCounters::default(),
        }
    }

    /// Add a domain to the runtime blacklist.
    pub fn add_to_blacklist(&self, domain: &str) {
        self.blacklist.write().insert(domain.to_lowercase());
        log::info!("domain '{}' blacklisted", domain);
    }

    /// Add a domain to the runtime allowlist.
    pub fn add_to_allowlist(&self, domain: &str) {
        self.allowlist.write().insert(domain.to_lowercase());
        log::info!("domain '{}' allowlisted", domain);
    }

    /// Full scan of one URL.
    pub fn scan(&self, raw_url: &str) -> Result<ScanResult, ScanError> {
        self.scan_at(raw_url, Utc::now())
    }

    pub fn scan_at(&self, raw_url: &str, now: DateTime<Utc>) -> Result<ScanResult, ScanError> {
        let norm = normalize(raw_url)?;
        let hash = url_hash(&norm.url);
        self.counters.scans.fetch_add(1, Ordering::Relaxed);

        // Tier 1 + 2: TTL cache (memory, then cache table)
        if let Some(value) = self.cache.get_at(CACHE_CLASS, &hash, now) {
            if let Ok(record) = serde_json::from_value::<LinkReputationRecord>(value) {
                if !record.is_expired(now, self.config.ttl_secs) {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(record.to_scan_result());
                }
            }
        }

        // Tier 3: the permanent scanned-links table
        match self.store.get_link(&hash) {
            Ok(Some(record)) if !record.is_expired(now, self.config.ttl_secs) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.promote(&hash, &record, now);
                return Ok(record.to_scan_result());
            }
            Ok(_) => {}
            Err(e) => log::warn!("scanned-links read failed for {}: {}", hash, e),
        }

        // Fresh scan
        let result = self.evaluate(&norm.url, &norm.host, &hash, now);

        let record = LinkReputationRecord {
            url_hash: hash.clone(),
            url: norm.url,
            is_malicious: !result.is_safe,
            confidence: result.confidence,
            sources: result.sources.clone(),
            threat_names: result.threats.clone(),
            cached_at: now,
        };
        if let Err(e) = self.store.upsert_link(&record) {
            log::error!("failed to persist scan result for {}: {}", record.url, e);
        }
        self.promote(&hash, &record, now);

        if !result.is_safe {
            self.counters.malicious_found.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[LINK] {} flagged {} ({:.2}): {:?}",
                record.url,
                result.threat_level.as_str(),
                result.confidence,
                result.threats
            );
        }
        Ok(result)
    }

    /// Heuristics plus the optional external merge.
    fn evaluate(&self, url: &str, host: &str, hash: &str, _now: DateTime<Utc>) -> ScanResult {
        let mut threats: Vec<String> = Vec::new();
        let mut sources = vec!["heuristics".to_string()];
        let mut level = LinkThreatLevel::Safe;
        let mut confidence: f32 = 0.5;
        let mut allowlisted = false;

        if self.blacklist.read().contains(host) {
            threats.push("blacklisted_domain".to_string());
            sources.push("blacklist".to_string());
            level = LinkThreatLevel::High;
            confidence = 0.95;
        } else if patterns::is_safe_domain(host) || self.allowlist.read().contains(host) {
            sources.push("allowlist".to_string());
            confidence = 0.9;
            allowlisted = true;
        } else {
            let matched = patterns::match_rules(url);
            for rule in &matched {
                threats.push(rule.label.to_string());
                if rule.level > level {
                    level = rule.level;
                }
                confidence = confidence.max(rule.weight);
            }
            if matched.len() > 1 {
                confidence = (confidence + 0.1 * (matched.len() - 1) as f32).min(0.95);
            }
            if matched.is_empty() && patterns::suspicious_domain_shape(host) {
                threats.push("suspicious_domain".to_string());
                level = LinkThreatLevel::Medium;
                confidence = 0.4;
            }
        }

        // External reputation merge: any source flagging malicious above
        // the floor makes the merged verdict unsafe
        if let Some(api) = &self.api {
            if !allowlisted {
                match api.lookup(hash) {
                    Ok(report) => {
                        sources.push("reputation_api".to_string());
                        let api_confidence = report.confidence();
                        if report.is_malicious() && api_confidence >= self.config.confidence_floor
                        {
                            level = LinkThreatLevel::High;
                        }
                        for name in report.threat_names {
                            if !threats.contains(&name) {
                                threats.push(name);
                            }
                        }
                        confidence = confidence.max(api_confidence);
                    }
                    Err(e) => {
                        self.counters.api_errors.fetch_add(1, Ordering::Relaxed);
                        log::warn!("reputation lookup failed, heuristic-only verdict: {}", e);
                        confidence = (confidence - self.config.api_degrade).max(0.1);
                    }
                }
            }
        }

        let is_safe = level < LinkThreatLevel::Medium;
        ScanResult {
            url: url.to_string(),
            url_hash: hash.to_string(),
            is_safe,
            threat_level: level,
            confidence,
            threats,
            sources,
            cached: false,
        }
    }

    fn promote(&self, hash: &str, record: &LinkReputationRecord, now: DateTime<Utc>) {
        match serde_json::to_value(record) {
            Ok(value) => self.cache.set_at(CACHE_CLASS, hash, value, now),
            Err(e) => log::warn!("failed to serialize reputation record: {}", e),
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            scans: self.counters.scans.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            malicious_found: self.counters.malicious_found.load(Ordering::Relaxed),
            api_errors: self.counters.api_errors.load(Ordering::Relaxed),
            blacklisted_domains: self.blacklist.read().len(),
            allowlisted_domains: self.allowlist.read().len(),
        }
    }
}

// ============================================================================
// URL EXTRACTION
// ============================================================================

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"')]+"#).expect("url regex"));

/// Distinct URLs in a message, in order of appearance, bounded.
pub fn extract_urls(content: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .filter(|u| seen.insert(u.clone()))
        .take(max)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::cache::CacheConfig;
    use crate::logic::external_intel::{ApiError, ReputationReport};
    use std::sync::atomic::AtomicU32;

    struct StubApi {
        calls: AtomicU32,
        response: Result<ReputationReport, ApiError>,
    }

    impl StubApi {
        fn flagging(positives: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: Ok(ReputationReport {
                    resource: String::new(),
                    engines_checked: 60,
                    positive_detections: positives,
                    threat_names: vec!["Trojan.GenericKD".to_string()],
                }),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: Err(ApiError::NetworkError {
                    message: "timeout".to_string(),
                }),
            }
        }
    }

    impl ReputationApi for StubApi {
        fn lookup(&self, resource: &str) -> Result<ReputationReport, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().map(|mut r| {
                r.resource = resource.to_string();
                r
            })
        }
    }

    fn guardian(api: Option<Arc<dyn ReputationApi>>) -> LinkGuardian {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cache = Arc::new(TtlCache::new(Some(store.clone()), CacheConfig::default()));
        LinkGuardian::new(cache, store, api, LinkConfig::default())
    }

    #[test]
    fn test_blacklisted_domain_is_high() {
        let g = guardian(None);
        g.add_to_blacklist("evil.example");
        let result = g.scan("https://evil.example/promo").unwrap();
        assert!(!result.is_safe);
        assert_eq!(result.threat_level, LinkThreatLevel::High);
        assert!(result.threats.contains(&"blacklisted_domain".to_string()));
    }

    #[test]
    fn test_safe_domain_skips_rules() {
        let g = guardian(None);
        let result = g.scan("https://github.com/rust-lang/rust").unwrap();
        assert!(result.is_safe);
        assert_eq!(result.threat_level, LinkThreatLevel::Safe);
        assert!(result.sources.contains(&"allowlist".to_string()));
    }

    #[test]
    fn test_gift_bait_is_unsafe() {
        let g = guardian(None);
        let result = g.scan("https://discord.gift/free-nitro").unwrap();
        assert!(!result.is_safe);
        assert_eq!(result.threat_level, LinkThreatLevel::High);
    }

    #[test]
    fn test_second_scan_hits_cache() {
        let g = guardian(None);
        let first = g.scan("https://some-random-site.example/page").unwrap();
        assert!(!first.cached);
        let second = g.scan("https://Some-Random-Site.example/page/").unwrap();
        assert!(second.cached);
        assert_eq!(g.stats().cache_hits, 1);
    }

    #[test]
    fn test_ttl_expiry_triggers_rescan() {
        let api = Arc::new(StubApi::flagging(0));
        let g = guardian(Some(api.clone()));
        let t0 = Utc::now();
        g.scan_at("https://site.example/x", t0).unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        // Within TTL: cache answer, no second API call
        g.scan_at("https://site.example/x", t0 + chrono::Duration::seconds(3600))
            .unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        // One second past TTL: fresh lookup
        g.scan_at("https://site.example/x", t0 + chrono::Duration::seconds(3601))
            .unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_api_verdict_merges_by_confidence() {
        let g = guardian(Some(Arc::new(StubApi::flagging(20))));
        let result = g.scan("https://innocent-looking.example/page").unwrap();
        assert!(!result.is_safe);
        assert_eq!(result.threat_level, LinkThreatLevel::High);
        assert!(result.threats.contains(&"Trojan.GenericKD".to_string()));
        assert!(result.sources.contains(&"reputation_api".to_string()));
    }

    #[test]
    fn test_weak_api_signal_does_not_flip() {
        // 1/60 engines is below the confidence floor
        let g = guardian(Some(Arc::new(StubApi::flagging(1))));
        let result = g.scan("https://innocent-looking.example/page").unwrap();
        assert!(result.is_safe);
    }

    #[test]
    fn test_api_failure_degrades_not_fails() {
        let g = guardian(Some(Arc::new(StubApi::failing())));
        let result = g.scan("https://innocent-looking.example/page").unwrap();
        assert!(result.is_safe);
        assert!(result.confidence <= 0.31);
        assert_eq!(g.stats().api_errors, 1);
    }

    #[test]
    fn test_invalid_url_is_typed_error() {
        let g = guardian(None);
        assert!(matches!(
            g.scan("not a url at all"),
            Err(ScanError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_extract_urls() {
        let urls = extract_urls(
            "look at https://a.example/x and www.b.example plus https://a.example/x again",
            5,
        );
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://a.example/x");
    }
}
