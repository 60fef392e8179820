//! Chat Security Core - Threat Detection Engine
//!
//! Real-time threat detection for chat platforms: link reputation
//! scanning, behavioral pattern detection, raid detection, risk scoring
//! and threat analysis. The host application feeds member activity in
//! through [`SecurityCore`] and receives verdicts and recommended
//! actions back; outbound side effects go through the injected
//! [`Notifier`] and [`JoinGate`] seams.

pub mod constants;
pub mod logic;

pub use logic::behavior::types::{ActivityEvent, ActorBehaviorSummary, BehaviorReport, EditedEvent};
pub use logic::config::SecurityConfig;
pub use logic::engine::{CoreStats, SecurityCore};
pub use logic::external_intel::{ApiConfig, HttpReputationApi, RateLimiter, ReputationApi};
pub use logic::link_guard::types::{LinkThreatLevel, ScanError, ScanResult};
pub use logic::notify::{GateError, JoinGate, Notifier, NullGate, NullNotifier};
pub use logic::raid::types::{JoinEvent, RaidAssessment, RaidState};
pub use logic::risk::types::{EscalationTier, RiskScore};
pub use logic::store::SqliteStore;
pub use logic::threat::{RawThreat, ThreatAnalysis, ThreatRecord};
