//! Access-status transitions and the decision contract for the gating layer.
//!
//! Enforcement lives outside this crate. `decide` states what the enforcement
//! point is expected to do with each status; nothing here calls it on a
//! request path.

use serde::{Deserialize, Serialize};

use super::types::AccessStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Changed { from: AccessStatus, to: AccessStatus },
    Unchanged(AccessStatus),
}

impl Transition {
    pub fn current(&self) -> AccessStatus {
        match self {
            Transition::Changed { to, .. } => *to,
            Transition::Unchanged(status) => *status,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }
}

impl AccessStatus {
    /// Total: every target is reachable from every state. Operator-driven only.
    pub fn transition(self, target: AccessStatus) -> Transition {
        if self == target {
            Transition::Unchanged(self)
        } else {
            Transition::Changed { from: self, to: target }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Proceed,
    /// Redirect to the authentication flow before proceeding.
    RequireLogin,
    /// Refuse or redirect to the access-denied surface.
    Deny,
}

pub fn decide(status: AccessStatus, authenticated: bool) -> AccessDecision {
    match (status, authenticated) {
        (AccessStatus::Allow, _) => AccessDecision::Proceed,
        (AccessStatus::ForceLogin, true) => AccessDecision::Proceed,
        (AccessStatus::ForceLogin, false) => AccessDecision::RequireLogin,
        (AccessStatus::Block, _) => AccessDecision::Deny,
    }
}
