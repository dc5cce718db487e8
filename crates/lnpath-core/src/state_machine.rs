use std::fmt;

use crate::error::CoreError;

/// States of a payment as it walks its candidate routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttemptState {
    /// No route has been submitted yet.
    Idle,
    /// A route is in flight at the remote node.
    Attempting,
    /// The remote node returned a valid preimage.
    Succeeded,
    /// The attempt failed in a way another route may fix.
    RetryableFailure,
    /// The attempt failed in a way no other route can fix.
    DefinitiveFailure,
    /// Every candidate route has been used up. Final state.
    Done,
}

impl AttemptState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::DefinitiveFailure | Self::Done
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Attempting => write!(f, "Attempting"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::RetryableFailure => write!(f, "RetryableFailure"),
            Self::DefinitiveFailure => write!(f, "DefinitiveFailure"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Events that drive attempt state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    /// A route was submitted to the payment RPC.
    RouteSubmitted,
    /// The RPC answered with a preimage.
    PreimageReceived,
    /// A hop failed, or the attempt produced no usable result.
    RetryableFailed,
    /// The destination rejected the payment or the failure cannot be routed around.
    DefinitivelyFailed,
    /// No candidate routes remain.
    RoutesExhausted,
}

/// Validates payment attempt transitions.
///
/// Valid transitions:
/// - Idle → Attempting (RouteSubmitted)
/// - Idle → Done (RoutesExhausted)
/// - Attempting → Succeeded (PreimageReceived)
/// - Attempting → RetryableFailure (RetryableFailed)
/// - Attempting → DefinitiveFailure (DefinitivelyFailed)
/// - RetryableFailure → Attempting (RouteSubmitted)
/// - RetryableFailure → Done (RoutesExhausted)
pub struct AttemptStateMachine;

impl AttemptStateMachine {
    /// Attempt a state transition based on an event.
    /// Returns the new state on success, or an error for invalid transitions.
    pub fn transition(current: AttemptState, event: AttemptEvent) -> Result<AttemptState, CoreError> {
        let new_state = match (current, event) {
            (AttemptState::Idle, AttemptEvent::RouteSubmitted) => AttemptState::Attempting,
            (AttemptState::Idle, AttemptEvent::RoutesExhausted) => AttemptState::Done,

            (AttemptState::Attempting, AttemptEvent::PreimageReceived) => AttemptState::Succeeded,
            (AttemptState::Attempting, AttemptEvent::RetryableFailed) => {
                AttemptState::RetryableFailure
            }
            (AttemptState::Attempting, AttemptEvent::DefinitivelyFailed) => {
                AttemptState::DefinitiveFailure
            }

            (AttemptState::RetryableFailure, AttemptEvent::RouteSubmitted) => {
                AttemptState::Attempting
            }
            (AttemptState::RetryableFailure, AttemptEvent::RoutesExhausted) => AttemptState::Done,

            _ => {
                let target = match event {
                    AttemptEvent::RouteSubmitted => AttemptState::Attempting,
                    AttemptEvent::PreimageReceived => AttemptState::Succeeded,
                    AttemptEvent::RetryableFailed => AttemptState::RetryableFailure,
                    AttemptEvent::DefinitivelyFailed => AttemptState::DefinitiveFailure,
                    AttemptEvent::RoutesExhausted => AttemptState::Done,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "attempt state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: AttemptState, event: AttemptEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
