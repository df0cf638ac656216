//! Session states and the forward-only state holder.

use crate::error::TransitionError;
use parking_lot::RwLock;

/// Position of a connection in the XMPP session lifecycle.
///
/// The lifecycle is strictly ordered; declaration order is lifecycle
/// order. A session only advances, with one documented exception:
/// `Started` and `Encrypted` may be re-entered from `Authenticated`
/// when the stream is reopened after a successful authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionState {
    /// Connection accepted, no stream header seen yet.
    Unconnected,
    /// Initial stream header received.
    Initiated,
    /// Stream open, feature negotiation under way.
    Started,
    /// STARTTLS requested; waiting for the transport's TLS signal.
    EncryptionStarted,
    /// TLS established, stream reopened.
    Encrypted,
    /// Authentication succeeded; full stanza processing permitted.
    Authenticated,
    /// Session ended by the server or the peer.
    Ended,
    /// Underlying connection closed.
    Closed,
}

impl SessionState {
    /// Terminal states accept no further stanza processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Closed)
    }

    fn rank(self) -> u8 {
        self as u8
    }
}

/// Mutable protocol state owned 1:1 by a session.
///
/// The holder is passed by handle into every pipeline call; only the
/// state machine performs transitions on it. Transitions enforce the
/// forward-only lifecycle rule.
#[derive(Debug)]
pub struct SessionStateHolder {
    state: RwLock<SessionState>,
}

impl SessionStateHolder {
    /// New holder in [`SessionState::Unconnected`].
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Unconnected),
        }
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Move to `next`, enforcing the lifecycle ordering. Terminal
    /// states refuse any transition; backward moves are refused except
    /// the stream-restart re-entries into `Started`/`Encrypted` from
    /// `Authenticated`.
    pub fn transition_to(&self, next: SessionState) -> Result<(), TransitionError> {
        let mut state = self.state.write();
        let current = *state;
        if current.is_terminal() {
            return Err(TransitionError::Terminal { current });
        }
        let restart_reentry = current == SessionState::Authenticated
            && matches!(next, SessionState::Started | SessionState::Encrypted);
        if next.rank() < current.rank() && !restart_reentry {
            return Err(TransitionError::Backward {
                from: current,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Unconditional move to [`SessionState::Closed`]; used by the
    /// session-abort and connection-teardown paths. Idempotent.
    pub fn close(&self) {
        *self.state.write() = SessionState::Closed;
    }
}

impl Default for SessionStateHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_forward_path() {
        let holder = SessionStateHolder::new();
        for next in [
            SessionState::Initiated,
            SessionState::Started,
            SessionState::EncryptionStarted,
            SessionState::Encrypted,
            SessionState::Authenticated,
        ] {
            holder.transition_to(next).unwrap();
            assert_eq!(holder.state(), next);
        }
    }

    #[test]
    fn refuses_backward_transition() {
        let holder = SessionStateHolder::new();
        holder.transition_to(SessionState::Encrypted).unwrap();
        let err = holder.transition_to(SessionState::Initiated).unwrap_err();
        assert!(matches!(err, TransitionError::Backward { .. }));
        assert_eq!(holder.state(), SessionState::Encrypted);
    }

    #[test]
    fn allows_stream_restart_after_authentication() {
        let holder = SessionStateHolder::new();
        holder.transition_to(SessionState::Authenticated).unwrap();
        holder.transition_to(SessionState::Encrypted).unwrap();
        assert_eq!(holder.state(), SessionState::Encrypted);
        holder.transition_to(SessionState::Authenticated).unwrap();
    }

    #[test]
    fn terminal_states_are_final() {
        let holder = SessionStateHolder::new();
        holder.transition_to(SessionState::Ended).unwrap();
        let err = holder
            .transition_to(SessionState::Authenticated)
            .unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));

        holder.close();
        assert_eq!(holder.state(), SessionState::Closed);
        assert!(holder.transition_to(SessionState::Initiated).is_err());
    }
}
