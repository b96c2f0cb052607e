//! Per-client streaming session state machine.
//!
//! `Idle → StreamOpen → Active → Closed`. Any state may close; `Closed` is
//! terminal. Tool requests are only served in `Active`.

/// Where a streaming session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream yet
    Idle,
    /// Event stream accepted, MCP handshake pending
    StreamOpen,
    /// Handshake complete, tool calls accepted
    Active,
    /// Terminal
    Closed,
}

/// Inputs that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    StreamOpened,
    Initialized,
    Disconnected,
    TransportError,
    Shutdown,
}

impl StreamState {
    /// Next state for `event`, or `None` if the event is not valid here.
    pub fn on(self, event: StreamEvent) -> Option<StreamState> {
        use StreamEvent::*;
        use StreamState::*;
        match (self, event) {
            (Closed, _) => None,
            (_, Disconnected | TransportError | Shutdown) => Some(Closed),
            (Idle, StreamOpened) => Some(StreamOpen),
            (StreamOpen, Initialized) => Some(Active),
            _ => None,
        }
    }

    pub fn accepts_tool_calls(self) -> bool {
        self == StreamState::Active
    }

    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StreamEvent::*;
    use StreamState::*;

    #[test]
    fn test_happy_path() {
        let state = Idle.on(StreamOpened).unwrap();
        assert_eq!(state, StreamOpen);
        let state = state.on(Initialized).unwrap();
        assert_eq!(state, Active);
        assert!(state.accepts_tool_calls());
        assert_eq!(state.on(Disconnected), Some(Closed));
    }

    #[test]
    fn test_any_state_closes() {
        for state in [Idle, StreamOpen, Active] {
            for event in [Disconnected, TransportError, Shutdown] {
                assert_eq!(state.on(event), Some(Closed));
            }
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        for event in [StreamOpened, Initialized, Disconnected, TransportError, Shutdown] {
            assert_eq!(Closed.on(event), None);
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(Idle.on(Initialized), None);
        assert_eq!(StreamOpen.on(StreamOpened), None);
        assert_eq!(Active.on(Initialized), None);
        assert!(!StreamOpen.accepts_tool_calls());
    }
}
