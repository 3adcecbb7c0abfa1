//! Handshake state tracking.

use std::fmt;

use tracing::{info, warn};

/// Progress of the session handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Draining stale bytes from the pipe.
    #[default]
    Flushing,
    /// Start request sent, awaiting the response.
    Starting,
    /// Checking the reported parameters.
    Validating,
    /// Session parameters accepted.
    Established,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Flushing => write!(f, "FLUSHING"),
            HandshakeState::Starting => write!(f, "STARTING"),
            HandshakeState::Validating => write!(f, "VALIDATING"),
            HandshakeState::Established => write!(f, "ESTABLISHED"),
            HandshakeState::Failed => write!(f, "FAILED"),
        }
    }
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Established | HandshakeState::Failed)
    }
}

/// Current handshake state plus the transition log.
#[derive(Debug, Default)]
pub struct HandshakeMachine {
    state: HandshakeState,
    history: Vec<HandshakeState>,
}

impl HandshakeMachine {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Flushing,
            history: vec![HandshakeState::Flushing],
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[HandshakeState] {
        &self.history
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: HandshakeState) {
        info!(from = %self.state, to = %new_state, "Handshake transition");
        self.state = new_state;
        self.history.push(new_state);
    }

    /// Enter `Failed`, recording why.
    pub fn fail(&mut self, reason: &dyn fmt::Display) {
        warn!(from = %self.state, reason = %reason, "Handshake failed");
        self.state = HandshakeState::Failed;
        self.history.push(HandshakeState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_recorded() {
        let mut m = HandshakeMachine::new();
        assert_eq!(m.state(), HandshakeState::Flushing);
        m.goto_state(HandshakeState::Starting);
        m.goto_state(HandshakeState::Validating);
        m.fail(&"unsupported protocol");

        assert_eq!(m.state(), HandshakeState::Failed);
        assert!(m.state().is_terminal());
        assert_eq!(
            m.history(),
            &[
                HandshakeState::Flushing,
                HandshakeState::Starting,
                HandshakeState::Validating,
                HandshakeState::Failed
            ]
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(HandshakeState::Established.to_string(), "ESTABLISHED");
        assert_eq!(HandshakeState::default(), HandshakeState::Flushing);
    }
}
