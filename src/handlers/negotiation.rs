//! Stream, TLS and SASL negotiation handlers.

use crate::addr::Entity;
use crate::error::HandlerError;
use crate::handlers::{HandlerOutcome, StanzaHandler};
use crate::server::ServerRuntimeContext;
use crate::session::{SessionContext, SessionState};
use crate::stanza::{Stanza, XmlElement, ns};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Answers stream headers with the server's own stream open.
///
/// The per-state workers decide which lifecycle transition a stream
/// header causes; this handler only produces the response header, so it
/// serves initial opens and post-TLS / post-auth reopens alike.
pub struct StreamOpenHandler;

#[async_trait]
impl StanzaHandler for StreamOpenHandler {
    fn name(&self) -> &str {
        "stream"
    }

    fn namespace(&self) -> Option<&str> {
        Some(ns::STREAM)
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut builder = Stanza::builder("stream", Some(ns::STREAM))
            .attribute("from", server.domain().to_string())
            .attribute("id", session.id().to_string())
            .attribute("version", "1.0");
        if let Some(from) = stanza.attribute("from") {
            builder = builder.attribute("to", from);
        }
        Ok(HandlerOutcome::reply(builder.build()))
    }
}

/// STARTTLS: acknowledge with `<proceed/>` and park the session in
/// [`SessionState::EncryptionStarted`] until the transport reports the
/// handshake result.
pub struct StartTlsHandler;

#[async_trait]
impl StanzaHandler for StartTlsHandler {
    fn name(&self) -> &str {
        "starttls"
    }

    fn namespace(&self) -> Option<&str> {
        Some(ns::TLS)
    }

    async fn execute(
        &self,
        _stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        debug!(session_id = %session.id(), "starttls accepted, awaiting handshake");
        Ok(
            HandlerOutcome::transition(SessionState::EncryptionStarted)
                .with_response(Stanza::builder("proceed", Some(ns::TLS)).build()),
        )
    }
}

/// Credential verification, supplied by the embedding server.
///
/// The handler owns the SASL framing; mechanism implementations live
/// behind this trait. On success the returned entity identifies the
/// authenticated account.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify the credential payload of an `<auth/>` element for the
    /// given mechanism. `Ok` carries the authenticated account; `Err`
    /// means the credentials were rejected.
    async fn verify(&self, mechanism: &str, payload: &str) -> Result<Entity, HandlerError>;
}

/// SASL `<auth/>` handler.
///
/// Mechanism names are matched case-sensitively against the configured
/// list, so offering `PLAIN` does not admit a request for `plain`. An
/// unknown mechanism is a hard handler failure rather than a SASL
/// failure response, matching the contract that the server never
/// advertised it.
pub struct AuthHandler {
    mechanisms: Vec<String>,
    authenticator: Arc<dyn Authenticator>,
}

impl AuthHandler {
    /// Build the handler with the offered mechanism names and the
    /// credential verifier.
    pub fn new(mechanisms: Vec<String>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            mechanisms,
            authenticator,
        }
    }

    fn sasl_failure() -> Stanza {
        Stanza::builder("failure", Some(ns::SASL))
            .child(XmlElement::new("not-authorized", Some(ns::SASL)))
            .build()
    }
}

#[async_trait]
impl StanzaHandler for AuthHandler {
    fn name(&self) -> &str {
        "auth"
    }

    fn namespace(&self) -> Option<&str> {
        Some(ns::SASL)
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mechanism = stanza.attribute("mechanism").unwrap_or_default();
        if !self.mechanisms.iter().any(|m| m == mechanism) {
            return Err(HandlerError::UnavailableMechanism(mechanism.to_string()));
        }
        match self
            .authenticator
            .verify(mechanism, &stanza.element().text())
            .await
        {
            Ok(entity) => {
                debug!(session_id = %session.id(), account = %entity.bare(), "authenticated");
                session.set_initiating_entity(entity);
                Ok(HandlerOutcome::transition(SessionState::Authenticated)
                    .with_response(Stanza::builder("success", Some(ns::SASL)).build())
                    .with_reopen())
            }
            Err(_) => Ok(HandlerOutcome::reply(Self::sasl_failure())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::HandlerRegistry;

    struct AcceptAll;

    #[async_trait]
    impl Authenticator for AcceptAll {
        async fn verify(&self, _mechanism: &str, _payload: &str) -> Result<Entity, HandlerError> {
            Ok(Entity::parse("me@test/ignored").unwrap())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl Authenticator for RejectAll {
        async fn verify(&self, _mechanism: &str, _payload: &str) -> Result<Entity, HandlerError> {
            Err(HandlerError::Internal("bad credentials".into()))
        }
    }

    fn server() -> Arc<ServerRuntimeContext> {
        ServerRuntimeContext::new(&Config::default(), HandlerRegistry::with_core_handlers())
            .unwrap()
    }

    fn auth_stanza(mechanism: &str) -> Stanza {
        Stanza::builder("auth", Some(ns::SASL))
            .attribute("mechanism", mechanism)
            .text("AGp1bGlldAByMG0zMG15cjBtMzA=")
            .build()
    }

    #[tokio::test]
    async fn unknown_mechanism_is_a_hard_failure() {
        let handler = AuthHandler::new(vec!["PLAIN".into()], Arc::new(AcceptAll));
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);

        // case-sensitive: "plain" was never offered
        let err = handler
            .execute(&auth_stanza("plain"), &server, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnavailableMechanism(m) if m == "plain"));
        assert!(session.initiating_entity().is_none());
    }

    #[tokio::test]
    async fn success_stores_bare_account_and_requests_reopen() {
        let handler = AuthHandler::new(vec!["PLAIN".into()], Arc::new(AcceptAll));
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);

        let outcome = handler
            .execute(&auth_stanza("PLAIN"), &server, &session)
            .await
            .unwrap();
        assert_eq!(outcome.next_state, Some(SessionState::Authenticated));
        assert!(outcome.reopen_stream);
        assert_eq!(outcome.response.as_ref().map(Stanza::name), Some("success"));
        assert_eq!(
            session.initiating_entity(),
            Some(Entity::parse("me@test").unwrap())
        );
    }

    #[tokio::test]
    async fn rejected_credentials_answer_with_sasl_failure() {
        let handler = AuthHandler::new(vec!["PLAIN".into()], Arc::new(RejectAll));
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);

        let outcome = handler
            .execute(&auth_stanza("PLAIN"), &server, &session)
            .await
            .unwrap();
        assert!(outcome.next_state.is_none());
        assert!(!outcome.reopen_stream);
        let failure = outcome.response.unwrap();
        assert_eq!(failure.name(), "failure");
        assert!(failure.element().find_child("not-authorized").is_some());
        assert!(session.initiating_entity().is_none());
    }
}
