//! Resource binding (RFC 3920 section 7).

use crate::error::HandlerError;
use crate::handlers::{HandlerOutcome, StanzaHandler};
use crate::server::ServerRuntimeContext;
use crate::session::SessionContext;
use crate::stanza::{IqType, Stanza, XmlElement, ns};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Binds a resource to the authenticated session and answers with the
/// resulting full address.
///
/// The server always assigns the resource identifier; a client-proposed
/// resource in the request payload is ignored.
pub struct BindHandler;

#[async_trait]
impl StanzaHandler for BindHandler {
    fn name(&self) -> &str {
        "iq"
    }

    fn namespace(&self) -> Option<&str> {
        Some(ns::BIND)
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let iq_type = stanza.attribute("type").and_then(IqType::parse);
        if iq_type != Some(IqType::Set) {
            return Err(HandlerError::UnsupportedIqType(
                stanza.attribute("type").unwrap_or("missing").to_string(),
            ));
        }

        let resource = server
            .registry()
            .bind_session(session)
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        let bare = session
            .initiating_entity()
            .ok_or_else(|| HandlerError::Internal("bind without initiating entity".into()))?;
        let full = bare
            .with_resource(&resource)
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        info!(session_id = %session.id(), address = %full, "resource bound");

        let payload = XmlElement::new("bind", Some(ns::BIND)).with_child(
            XmlElement::new("jid", Some(ns::BIND)).with_text(full.to_string()),
        );
        Ok(HandlerOutcome::reply(Stanza::iq_result(
            stanza,
            Some(payload),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Entity;
    use crate::config::Config;
    use crate::handlers::HandlerRegistry;

    fn server() -> Arc<ServerRuntimeContext> {
        ServerRuntimeContext::new(&Config::default(), HandlerRegistry::with_core_handlers())
            .unwrap()
    }

    fn bind_request(id: &str) -> Stanza {
        Stanza::builder("iq", Some(ns::CLIENT))
            .attribute("type", "set")
            .attribute("id", id)
            .child(XmlElement::new("bind", Some(ns::BIND)))
            .build()
    }

    #[tokio::test]
    async fn bind_set_registers_and_replies_with_full_address() {
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);
        session.set_initiating_entity(Entity::parse("me@test").unwrap());

        let outcome = BindHandler
            .execute(&bind_request("b1"), &server, &session)
            .await
            .unwrap();
        let reply = outcome.response.unwrap();
        assert_eq!(reply.attribute("type"), Some("result"));
        assert_eq!(reply.id(), Some("b1"));

        let jid_text = reply
            .element()
            .find_child("bind")
            .unwrap()
            .find_child("jid")
            .unwrap()
            .text();
        let full = Entity::parse(&jid_text).unwrap();
        assert!(full.is_full());
        assert_eq!(full.bare(), Entity::parse("me@test").unwrap());
        assert_eq!(
            server.registry().bound_resources(&full, false).len(),
            1
        );
    }

    #[tokio::test]
    async fn bind_get_is_refused() {
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);
        session.set_initiating_entity(Entity::parse("me@test").unwrap());

        let request = Stanza::builder("iq", Some(ns::CLIENT))
            .attribute("type", "get")
            .attribute("id", "b2")
            .child(XmlElement::new("bind", Some(ns::BIND)))
            .build();
        let err = BindHandler
            .execute(&request, &server, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnsupportedIqType(t) if t == "get"));
    }

    #[tokio::test]
    async fn bind_without_authentication_fails() {
        let server = server();
        let (session, _holder, _outbound) = SessionContext::new(8);

        let err = BindHandler
            .execute(&bind_request("b3"), &server, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Internal(_)));
    }
}
