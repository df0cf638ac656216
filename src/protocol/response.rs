//! Standard error responses for rejected stanzas.

use crate::error::ProtocolViolation;
use crate::session::SessionContext;
use crate::stanza::Stanza;
use tracing::debug;

/// Builds and queues the error stanza for every admission rejection.
///
/// The writer decides *which* error shape a rejection gets; rendering
/// to XML text is the transport's job. Send failures mean the
/// connection is already gone and are logged at debug, nothing more.
#[derive(Debug, Default)]
pub struct ResponseWriter;

impl ResponseWriter {
    /// No handler registered for the stanza's element and namespace.
    pub async fn unsupported_stanza_type(&self, session: &SessionContext) {
        self.send(session, Stanza::stream_error("unsupported-stanza-type"))
            .await;
    }

    /// Core content stanza before authentication (RFC 3920 section 4.3).
    pub async fn not_authorized(&self, session: &SessionContext, stanza: &Stanza) {
        self.send(session, Stanza::error_response(stanza, "auth", "not-authorized"))
            .await;
    }

    /// The `from` address does not belong to this session.
    pub async fn wrong_from_jid(&self, session: &SessionContext, stanza: &Stanza) {
        self.send(
            session,
            Stanza::error_response(stanza, "modify", "unknown-sender"),
        )
        .await;
    }

    /// General protocol violation, mapped to its error shape.
    pub async fn protocol_error(&self, session: &SessionContext, violation: ProtocolViolation) {
        let response = match violation {
            ProtocolViolation::TlsDesync => Stanza::tls_failure(),
            ProtocolViolation::OutOfOrderStanza => Stanza::stream_error("policy-violation"),
            ProtocolViolation::BadFormat => Stanza::stream_error("bad-format"),
            ProtocolViolation::UnsupportedStanzaType => {
                Stanza::stream_error("unsupported-stanza-type")
            }
            ProtocolViolation::NotAuthorized => Stanza::stream_error("not-authorized"),
            ProtocolViolation::WrongFromJid => Stanza::stream_error("invalid-from"),
        };
        self.send(session, response).await;
    }

    /// The stream parser could not decode the peer's input.
    pub async fn parse_failure(&self, session: &SessionContext) {
        self.protocol_error(session, ProtocolViolation::BadFormat)
            .await;
    }

    async fn send(&self, session: &SessionContext, stanza: Stanza) {
        if session.write_stanza(stanza).await.is_err() {
            debug!(session_id = %session.id(), "error response dropped, connection gone");
        }
    }
}
