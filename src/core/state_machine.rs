//! State machine for a login and two-factor verification flow
//!
//! ```text
//! Idle -> AwaitingResponse -> { Authenticated | RequiresTwoFactor | Rejected }
//! RequiresTwoFactor -> AwaitingCodeResponse
//!     -> { Authenticated | RequiresTwoFactor (wrong code) | Rejected }
//! ```
//!
//! `Authenticated` and `Rejected` are terminal until `reset()`.

use crate::classify::rules::OutcomeKind;
use crate::core::error::{DriverError, DriverResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Authentication state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthState {
    Idle,
    AwaitingResponse,
    RequiresTwoFactor,
    AwaitingCodeResponse,
    Authenticated,
    Rejected,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Rejected)
    }

    fn can_transition_to(self, to: AuthState) -> bool {
        use AuthState::*;
        matches!(
            (self, to),
            (Idle, AwaitingResponse)
                | (AwaitingResponse, Authenticated | RequiresTwoFactor | Rejected)
                | (RequiresTwoFactor, AwaitingCodeResponse)
                | (AwaitingCodeResponse, Authenticated | RequiresTwoFactor | Rejected)
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Idle => "idle",
            AuthState::AwaitingResponse => "awaiting-response",
            AuthState::RequiresTwoFactor => "requires-two-factor",
            AuthState::AwaitingCodeResponse => "awaiting-code-response",
            AuthState::Authenticated => "authenticated",
            AuthState::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthTransition {
    /// From state
    pub from: AuthState,

    /// To state
    pub to: AuthState,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Outcome that caused the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
}

/// Tracks one account's authentication flow
#[derive(Debug, Clone)]
pub struct AuthStateMachine {
    current_state: AuthState,
    transitions: Vec<AuthTransition>,
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: AuthState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state, rejecting moves the flow does not allow
    pub fn transition(&mut self, to: AuthState, outcome: Option<OutcomeKind>) -> DriverResult<()> {
        if !self.current_state.can_transition_to(to) {
            return Err(DriverError::invalid(
                "auth_state",
                format!("不允许从 {} 转换到 {}", self.current_state, to),
            ));
        }

        debug!(from = %self.current_state, %to, ?outcome, "auth state transition");
        self.transitions.push(AuthTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
            outcome,
        });
        self.current_state = to;
        Ok(())
    }

    /// Move out of an awaiting state according to a classified outcome
    pub fn complete(&mut self, outcome: OutcomeKind) -> DriverResult<AuthState> {
        let to = match (self.current_state, outcome) {
            (_, OutcomeKind::Success) => AuthState::Authenticated,
            (_, OutcomeKind::RequiresTwoFactor) => AuthState::RequiresTwoFactor,
            (AuthState::AwaitingCodeResponse, OutcomeKind::AuthCodeInvalid) => {
                AuthState::RequiresTwoFactor
            }
            _ => AuthState::Rejected,
        };
        self.transition(to, Some(outcome))?;
        Ok(to)
    }

    /// Get current state
    pub fn state(&self) -> AuthState {
        self.current_state
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    pub fn history(&self) -> &[AuthTransition] {
        &self.transitions
    }

    /// Back to `Idle` for a new attempt
    pub fn reset(&mut self) {
        self.current_state = AuthState::Idle;
        self.transitions.clear();
    }

    /// Re-enter a two-factor challenge issued by an earlier attempt
    ///
    /// Used when a code is submitted after the flow that requested it was
    /// reset or ended, e.g. by a timeout during verification.
    pub fn resume_two_factor(&mut self) {
        if self.current_state != AuthState::RequiresTwoFactor {
            self.reset();
            self.current_state = AuthState::RequiresTwoFactor;
        }
    }

    /// Get elapsed time since the first transition
    pub fn elapsed_ms(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn history_text(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let outcome = t
                    .outcome
                    .map(|o| format!(" ({})", o))
                    .unwrap_or_default();
                format!("{}: {} → {}{}", t.timestamp.to_rfc3339(), t.from, t.to, outcome)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_machine() {
        let machine = AuthStateMachine::new();
        assert_eq!(machine.state(), AuthState::Idle);
        assert!(!machine.is_terminal());
        assert!(machine.history().is_empty());
        assert_eq!(machine.elapsed_ms(), 0);
    }

    #[test]
    fn test_direct_success() {
        let mut machine = AuthStateMachine::new();
        machine.transition(AuthState::AwaitingResponse, None).unwrap();
        assert_eq!(
            machine.complete(OutcomeKind::Success).unwrap(),
            AuthState::Authenticated
        );
        assert!(machine.is_terminal());
        assert_eq!(machine.history().len(), 2);
    }

    #[test]
    fn test_two_factor_flow_with_wrong_code() {
        let mut machine = AuthStateMachine::new();
        machine.transition(AuthState::AwaitingResponse, None).unwrap();
        machine.complete(OutcomeKind::RequiresTwoFactor).unwrap();

        machine.transition(AuthState::AwaitingCodeResponse, None).unwrap();
        assert_eq!(
            machine.complete(OutcomeKind::AuthCodeInvalid).unwrap(),
            AuthState::RequiresTwoFactor
        );

        machine.transition(AuthState::AwaitingCodeResponse, None).unwrap();
        machine.complete(OutcomeKind::Success).unwrap();
        assert_eq!(machine.state(), AuthState::Authenticated);

        let last = machine.history().last().unwrap();
        assert_eq!(last.outcome, Some(OutcomeKind::Success));
        assert!(machine.history_text().contains("awaiting-code-response → authenticated"));
    }

    #[test]
    fn test_failures_reject() {
        for outcome in [
            OutcomeKind::InvalidCredential,
            OutcomeKind::NetworkError,
            OutcomeKind::Timeout,
            OutcomeKind::UnknownError,
        ] {
            let mut machine = AuthStateMachine::new();
            machine.transition(AuthState::AwaitingResponse, None).unwrap();
            assert_eq!(machine.complete(outcome).unwrap(), AuthState::Rejected);
        }
    }

    #[test]
    fn test_invalid_code_outside_verification_rejects() {
        let mut machine = AuthStateMachine::new();
        machine.transition(AuthState::AwaitingResponse, None).unwrap();
        assert_eq!(
            machine.complete(OutcomeKind::AuthCodeInvalid).unwrap(),
            AuthState::Rejected
        );
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut machine = AuthStateMachine::new();
        let err = machine
            .transition(AuthState::Authenticated, None)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(machine.state(), AuthState::Idle);

        assert!(machine.complete(OutcomeKind::Success).is_err());
    }

    #[test]
    fn test_terminal_until_reset() {
        let mut machine = AuthStateMachine::new();
        machine.transition(AuthState::AwaitingResponse, None).unwrap();
        machine.complete(OutcomeKind::InvalidCredential).unwrap();
        assert!(machine.transition(AuthState::AwaitingResponse, None).is_err());

        machine.reset();
        assert_eq!(machine.state(), AuthState::Idle);
        assert!(machine.transition(AuthState::AwaitingResponse, None).is_ok());
    }

    #[test]
    fn test_resume_two_factor() {
        let mut machine = AuthStateMachine::new();
        machine.resume_two_factor();
        assert_eq!(machine.state(), AuthState::RequiresTwoFactor);
        assert!(machine.transition(AuthState::AwaitingCodeResponse, None).is_ok());
    }
}
