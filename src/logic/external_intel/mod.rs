//! External Intelligence Module - URL Reputation Integration
//!
//! Connects the link guardian to an external reputation service. The
//! whole module sits behind the `ReputationApi` trait so scans work
//! identically with the HTTP client, a stub, or nothing configured.
//!
//! # Components
//! - `client.rs`: blocking HTTP client + process-wide rate limiter
//! - `types.rs`: wire types, reports, errors

pub mod client;
pub mod types;

pub use client::{HttpReputationApi, RateLimiter, ReputationApi};
pub use types::{ApiConfig, ApiError, RateLimitMode, ReputationReport};
