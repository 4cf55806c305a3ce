//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connect attempts in progress
    Connecting,

    /// Transport established, ready to send
    Connected,

    /// Transport released (terminal)
    Disconnected,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Connecting, Connected) | (_, Disconnected)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether messages can be sent in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Connecting;
        assert!(state.transition(ConnectionState::Connected).is_ok());
        assert!(state.is_connected());
        assert!(state.transition(ConnectionState::Disconnected).is_ok());
        assert!(!state.is_connected());
    }

    #[test]
    fn test_connecting_can_give_up() {
        let mut state = ConnectionState::Connecting;
        assert!(state.transition(ConnectionState::Disconnected).is_ok());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut state = ConnectionState::Disconnected;
        assert!(state.transition(ConnectionState::Disconnected).is_ok());
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let mut state = ConnectionState::Disconnected;
        assert!(state.transition(ConnectionState::Connected).is_err());
        assert!(state.transition(ConnectionState::Connecting).is_err());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ConnectionState::Connected;
        assert!(state.transition(ConnectionState::Connecting).is_err());
        assert_eq!(state, ConnectionState::Connected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
