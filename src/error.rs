//! Unified error handling for the protocol core.
//!
//! Errors fall into the families the admission pipeline distinguishes:
//! recoverable protocol violations (answered with a standard error
//! stanza, processing continues), handler-internal failures (caught and
//! logged at the pipeline boundary, session kept alive), and contract
//! violations (caller or configuration defects that abort the request,
//! never the process).

use crate::session::SessionState;
use thiserror::Error;

/// Address (JID) parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    /// Empty input text.
    #[error("empty address")]
    Empty,
    /// A structurally required part was empty.
    #[error("address has an empty {0} part")]
    EmptyPart(&'static str),
    /// Input text does not form a valid address.
    #[error("malformed address: {0}")]
    Malformed(String),
}

/// Failure reported by the external stream parser.
#[derive(Debug, Clone, Error)]
#[error("stream parsing failed: {reason}")]
pub struct ParseError {
    /// Human-readable description of the malformed input.
    pub reason: String,
}

impl ParseError {
    /// Build a parse error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Recoverable protocol-level violations.
///
/// Each is answered with the standards-defined error stanza shape and
/// processing continues with the next stanza on the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// No handler is registered for the stanza's element and namespace.
    #[error("unsupported stanza type")]
    UnsupportedStanzaType,
    /// A core content stanza arrived before authentication completed.
    #[error("not authorized")]
    NotAuthorized,
    /// The stanza's `from` address does not match the session.
    #[error("wrong from JID")]
    WrongFromJid,
    /// TLS negotiation signals arrived out of order.
    #[error("TLS negotiation out of order")]
    TlsDesync,
    /// A stanza arrived that is not legal in the current session state.
    #[error("stanza not legal in current session state")]
    OutOfOrderStanza,
    /// The stream carried input the parser could not decode.
    #[error("malformed stream input")]
    BadFormat,
}

impl ProtocolViolation {
    /// Static code for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedStanzaType => "unsupported_stanza_type",
            Self::NotAuthorized => "not_authorized",
            Self::WrongFromJid => "wrong_from_jid",
            Self::TlsDesync => "tls_desync",
            Self::OutOfOrderStanza => "out_of_order_stanza",
            Self::BadFormat => "bad_format",
        }
    }
}

/// Handler-internal failures, caught at the admission-pipeline boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An IQ arrived with a `type` the handler does not support.
    #[error("iq stanza type not supported: {0}")]
    UnsupportedIqType(String),
    /// The requested SASL mechanism is not offered by this server.
    #[error("sasl mechanism not available: {0}")]
    UnavailableMechanism(String),
    /// The session's outbound path is gone; the connection has closed.
    #[error("outbound channel closed")]
    OutboundClosed,
    /// Anything else that went wrong inside a handler.
    #[error("internal handler error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Static code for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedIqType(_) => "unsupported_iq_type",
            Self::UnavailableMechanism(_) => "unavailable_mechanism",
            Self::OutboundClosed => "outbound_closed",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Resource binding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Binding requires an authenticated session with a known account.
    #[error("session has no initiating entity; binding requires authentication")]
    NoInitiatingEntity,
}

/// Caller-side or configuration defects.
///
/// These indicate a defect in how the core was wired up, not a peer
/// misbehaving. They abort the current request; the driver logs them
/// loudly and closes that one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// The per-state dispatch table has no worker for this state.
    #[error("no protocol worker registered for state {0:?}")]
    NoWorkerForState(SessionState),
}

/// A session-state transition the lifecycle rules refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The session already reached a terminal state.
    #[error("session is terminal in state {current:?}")]
    Terminal {
        /// The terminal state the session is in.
        current: SessionState,
    },
    /// The requested transition would move backwards in the lifecycle.
    #[error("backward transition {from:?} -> {to:?} refused")]
    Backward {
        /// State the session is currently in.
        from: SessionState,
        /// State the transition asked for.
        to: SessionState,
    },
}
