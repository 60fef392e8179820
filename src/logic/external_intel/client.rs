//! Reputation API Client
//!
//! Blocking HTTP client for the external URL-reputation service, plus the
//! process-wide token bucket every lookup shares.
//!
//! Features:
//! - Fixed-window rate limiting (free tier: 4 req/min)
//! - Fail-fast or bounded-wait behavior on an empty bucket
//! - Bounded retry with backoff for transient failures

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::types::{ApiConfig, ApiError, ApiResponse, RateLimitMode, ReputationReport};

// ============================================================================
// TRAIT
// ============================================================================

/// External reputation lookup seam. The link guardian only sees this
/// trait; tests inject stubs.
pub trait ReputationApi: Send + Sync {
    fn lookup(&self, resource: &str) -> Result<ReputationReport, ApiError>;
}

// ============================================================================
// RATE LIMITER
// ============================================================================

struct BucketState {
    used: u32,
    window_start: Instant,
}

/// Process-wide fixed-window token bucket. All lookups draw from the same
/// budget; exhaustion either fails fast or blocks for a bounded wait -
/// never silently bypassed.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    condvar: Condvar,
    capacity: u32,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateLimiter {
    pub fn new(capacity: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                used: 0,
                window_start: Instant::now(),
            }),
            condvar: Condvar::new(),
            capacity,
        }
    }

    /// Take a token or report how long until the window resets.
    pub fn try_acquire(&self) -> Result<(), u64> {
        let mut state = self.state.lock();
        Self::roll_window(&mut state);
        if state.used < self.capacity {
            state.used += 1;
            Ok(())
        } else {
            let elapsed = state.window_start.elapsed();
            let remaining = WINDOW.saturating_sub(elapsed);
            Err(remaining.as_secs().max(1))
        }
    }

    /// Take a token according to the configured mode.
    pub fn acquire(&self, mode: RateLimitMode) -> Result<(), ApiError> {
        match mode {
            RateLimitMode::FailFast => self
                .try_acquire()
                .map_err(|retry_after| ApiError::RateLimited { retry_after }),
            RateLimitMode::Wait { max_wait_secs } => {
                let deadline = Instant::now() + Duration::from_secs(max_wait_secs);
                let mut state = self.state.lock();
                loop {
                    Self::roll_window(&mut state);
                    if state.used < self.capacity {
                        state.used += 1;
                        return Ok(());
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        let remaining = WINDOW.saturating_sub(state.window_start.elapsed());
                        return Err(ApiError::RateLimited {
                            retry_after: remaining.as_secs().max(1),
                        });
                    }
                    let window_reset = WINDOW.saturating_sub(state.window_start.elapsed());
                    let wait = window_reset.min(deadline - now);
                    self.condvar.wait_for(&mut state, wait);
                }
            }
        }
    }

    fn roll_window(state: &mut BucketState) {
        if state.window_start.elapsed() >= WINDOW {
            state.window_start = Instant::now();
            state.used = 0;
        }
    }

    pub fn used_this_window(&self) -> u32 {
        let mut state = self.state.lock();
        Self::roll_window(&mut state);
        state.used
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// Blocking reputation client. Resources are looked up by the hash of the
/// normalized URL (`GET {base}/urls/{hash}`).
pub struct HttpReputationApi {
    api_key: String,
    config: ApiConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpReputationApi {
    pub fn new(api_key: String, config: ApiConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api_key,
            config,
            limiter,
        }
    }

    fn request(&self, resource: &str) -> Result<ReputationReport, ApiError> {
        let url = format!("{}/urls/{}", self.config.base_url, resource);
        let response = ureq::get(&url)
            .set("x-apikey", &self.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .call();

        match response {
            Ok(resp) => {
                let body = resp
                    .into_string()
                    .map_err(|e| ApiError::ParseError { message: e.to_string() })?;
                let parsed: ApiResponse = serde_json::from_str(&body)
                    .map_err(|e| ApiError::ParseError { message: e.to_string() })?;
                Ok(parse_report(parsed, resource))
            }
            Err(ureq::Error::Status(401, _)) => Err(ApiError::InvalidApiKey),
            Err(ureq::Error::Status(404, _)) => Err(ApiError::NotFound),
            Err(ureq::Error::Status(429, _)) => Err(ApiError::RateLimited { retry_after: 60 }),
            Err(ureq::Error::Status(code, _)) if code >= 500 => Err(ApiError::Other {
                message: format!("server error {}", code),
            }),
            Err(e) => Err(ApiError::NetworkError { message: e.to_string() }),
        }
    }
}

impl ReputationApi for HttpReputationApi {
    fn lookup(&self, resource: &str) -> Result<ReputationReport, ApiError> {
        let mut attempt = 0u32;
        loop {
            // Every attempt draws from the shared budget; retries are
            // requests too
            self.limiter.acquire(self.config.mode)?;
            match self.request(resource) {
                Ok(report) => return Ok(report),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "reputation lookup attempt {} failed ({}), retrying",
                        attempt,
                        e
                    );
                    std::thread::sleep(Duration::from_millis(500 * attempt as u64));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn parse_report(resp: ApiResponse, resource: &str) -> ReputationReport {
    let attrs = resp.data.attributes;

    let (engines, positives) = match &attrs.last_analysis_stats {
        Some(stats) => (
            stats.malicious + stats.suspicious + stats.undetected + stats.harmless,
            stats.malicious + stats.suspicious,
        ),
        None => (0, 0),
    };

    let mut threat_names = Vec::new();
    if let Some(results) = attrs.last_analysis_results {
        for (_, engine) in results {
            if engine.category == "malicious" || engine.category == "suspicious" {
                if let Some(name) = engine.result {
                    threat_names.push(name);
                }
            }
        }
    }

    ReputationReport {
        resource: resource.to_string(),
        engines_checked: engines,
        positive_detections: positives,
        threat_names,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_exhaustion_fails_fast() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        let retry_after = limiter.try_acquire().unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
        assert_eq!(limiter.used_this_window(), 2);
    }

    #[test]
    fn test_acquire_fail_fast_maps_to_rate_limited() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.acquire(RateLimitMode::FailFast).is_ok());
        match limiter.acquire(RateLimitMode::FailFast) {
            Err(ApiError::RateLimited { retry_after }) => assert!(retry_after >= 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let limiter = RateLimiter::new(1);
        limiter.try_acquire().unwrap();
        let start = Instant::now();
        let result = limiter.acquire(RateLimitMode::Wait { max_wait_secs: 1 });
        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
        // Waited roughly the bound, not the full window
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_parse_report() {
        let body = r#"{
            "data": {
                "id": "abc",
                "attributes": {
                    "last_analysis_stats": {
                        "malicious": 3, "suspicious": 1,
                        "undetected": 50, "harmless": 6
                    },
                    "last_analysis_results": {
                        "EngineA": {"category": "malicious", "result": "phishing"},
                        "EngineB": {"category": "harmless", "result": null}
                    }
                }
            }
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        let report = parse_report(parsed, "abc");
        assert_eq!(report.engines_checked, 60);
        assert_eq!(report.positive_detections, 4);
        assert_eq!(report.threat_names, vec!["phishing".to_string()]);
    }
}
