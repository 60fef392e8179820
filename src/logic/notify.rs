//! Outbound Notification Seams
//!
//! Detectors never hold a reference back to the delivery client. The host
//! injects these at construction, so the detection subsystems stay free of
//! any dependency on the transport.

use serde_json::Value;

use crate::logic::{ActorId, GroupId};

/// Delivery of alerts to moderators and direct notices to actors.
///
/// Fire-and-forget: implementations log their own failures and never
/// propagate them into the detection path.
pub trait Notifier: Send + Sync {
    /// Post an alert payload to the group's moderation channel.
    fn alert(&self, group: GroupId, payload: Value);

    /// Send a direct notice to a single actor.
    fn direct(&self, actor: ActorId, payload: Value);
}

/// Raises and restores join friction on a group (verification level,
/// invite pause). Failures are surfaced so the raid detector can keep its
/// lockdown state and escalate instead of silently reverting.
pub trait JoinGate: Send + Sync {
    fn raise(&self, group: GroupId) -> Result<(), GateError>;
    fn restore(&self, group: GroupId) -> Result<(), GateError>;
}

/// Join-gate error types
#[derive(Debug, Clone)]
pub enum GateError {
    /// The platform rejected the change (missing permission)
    PermissionDenied,
    /// Transport failure
    Unavailable { message: String },
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::PermissionDenied => write!(f, "permission denied by platform"),
            GateError::Unavailable { message } => write!(f, "gate unavailable: {}", message),
        }
    }
}

impl std::error::Error for GateError {}

/// No-op notifier for tests and headless runs.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn alert(&self, _group: GroupId, _payload: Value) {}
    fn direct(&self, _actor: ActorId, _payload: Value) {}
}

/// No-op join gate that always succeeds.
pub struct NullGate;

impl JoinGate for NullGate {
    fn raise(&self, _group: GroupId) -> Result<(), GateError> {
        Ok(())
    }
    fn restore(&self, _group: GroupId) -> Result<(), GateError> {
        Ok(())
    }
}
