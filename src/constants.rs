//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment variables override these at construction time.

/// Points at which an actor is banned (100% of the risk budget)
pub const DEFAULT_MAX_DANGER_POINTS: u32 = 10;

/// Messages per minute before the rapid-posting check fires
pub const DEFAULT_MAX_MESSAGES_PER_MINUTE: u32 = 10;

/// Seconds a group stays in lockdown before auto-revert
pub const DEFAULT_LOCKDOWN_SECS: u64 = 300;

/// External reputation API budget (free tier: 4 req/min)
pub const DEFAULT_API_REQUESTS_PER_MINUTE: u32 = 4;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "chat-security-core";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get the maximum danger points from environment or use default
pub fn get_max_danger_points() -> u32 {
    std::env::var("MAX_DANGER_POINTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_DANGER_POINTS)
}

/// Get the rapid-posting limit from environment or use default
pub fn get_max_messages_per_minute() -> u32 {
    std::env::var("MAX_MESSAGES_PER_MINUTE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_MESSAGES_PER_MINUTE)
}

/// Get the lockdown duration from environment or use default
pub fn get_lockdown_secs() -> u64 {
    std::env::var("LOCKDOWN_DURATION")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LOCKDOWN_SECS)
}

/// Get the reputation API key, if one is configured
pub fn get_reputation_api_key() -> Option<String> {
    std::env::var("LINK_REPUTATION_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Default database location under the local data directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("chat-security")
        .join("security.db")
}
