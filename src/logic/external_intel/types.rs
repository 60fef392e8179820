//! External Intelligence Types

use serde::{Deserialize, Serialize};

use crate::constants;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Parsed verdict from the external reputation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationReport {
    /// The resource that was looked up (URL hash)
    pub resource: String,
    /// Total engines that scanned the resource
    pub engines_checked: u32,
    /// Engines that flagged it malicious or suspicious
    pub positive_detections: u32,
    /// Detection names from the flagging engines
    pub threat_names: Vec<String>,
}

impl ReputationReport {
    /// Detection ratio (0.0 - 1.0)
    pub fn detection_ratio(&self) -> f32 {
        if self.engines_checked == 0 {
            return 0.0;
        }
        self.positive_detections as f32 / self.engines_checked as f32
    }

    pub fn is_malicious(&self) -> bool {
        self.positive_detections > 0
    }

    /// Source confidence: scales with how many engines agree, saturating
    /// once a quarter of them flag the resource.
    pub fn confidence(&self) -> f32 {
        (self.detection_ratio() * 4.0).min(1.0)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Reputation API error types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiError {
    /// API key rejected
    InvalidApiKey,
    /// Local or remote rate limit exceeded
    RateLimited { retry_after: u64 },
    /// Resource unknown to the service
    NotFound,
    /// Network error
    NetworkError { message: String },
    /// Parse error
    ParseError { message: String },
    /// Other error
    Other { message: String },
}

impl ApiError {
    /// Transient errors are worth a bounded retry; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::NetworkError { .. } | ApiError::Other { .. })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InvalidApiKey => write!(f, "Invalid reputation API key"),
            ApiError::RateLimited { retry_after } => {
                write!(f, "Rate limited, retry after {} seconds", retry_after)
            }
            ApiError::NotFound => write!(f, "Resource not found on reputation service"),
            ApiError::NetworkError { message } => write!(f, "Network error: {}", message),
            ApiError::ParseError { message } => write!(f, "Parse error: {}", message),
            ApiError::Other { message } => write!(f, "Error: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// CONFIG
// ============================================================================

/// What happens when the local token bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateLimitMode {
    /// Return `RateLimited` immediately; caller degrades to heuristics
    FailFast,
    /// Block up to `max_wait_secs` for a token, then fail
    Wait { max_wait_secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Process-wide budget shared by all lookups
    pub requests_per_minute: u32,
    pub mode: RateLimitMode,
    /// Bounded retries for transient failures
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.virustotal.com/api/v3".to_string(),
            requests_per_minute: constants::DEFAULT_API_REQUESTS_PER_MINUTE,
            mode: RateLimitMode::FailFast,
            max_retries: 2,
            timeout_secs: 10,
        }
    }
}

// ============================================================================
// API RESPONSE TYPES (for parsing)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub data: ApiData,
}

#[derive(Debug, Deserialize)]
pub struct ApiData {
    pub id: String,
    pub attributes: ApiAttributes,
}

#[derive(Debug, Deserialize)]
pub struct ApiAttributes {
    pub last_analysis_stats: Option<ApiStats>,
    pub last_analysis_results: Option<std::collections::HashMap<String, ApiEngineResult>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStats {
    pub malicious: u32,
    pub suspicious: u32,
    pub undetected: u32,
    pub harmless: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiEngineResult {
    pub category: String,
    pub result: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_ratio_and_confidence() {
        let report = ReputationReport {
            resource: "h".to_string(),
            engines_checked: 60,
            positive_detections: 15,
            threat_names: vec![],
        };
        assert!((report.detection_ratio() - 0.25).abs() < 0.01);
        assert!((report.confidence() - 1.0).abs() < 0.01);
        assert!(report.is_malicious());
    }

    #[test]
    fn test_zero_engines() {
        let report = ReputationReport {
            resource: "h".to_string(),
            engines_checked: 0,
            positive_detections: 0,
            threat_names: vec![],
        };
        assert_eq!(report.detection_ratio(), 0.0);
        assert!(!report.is_malicious());
    }
}
