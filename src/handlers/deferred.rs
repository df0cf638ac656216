//! Deferred IQ-get execution.
//!
//! IQ-get requests whose answers take real work (directory lookups,
//! disco walks) must not stall the session's inbound loop. A handler
//! wrapped in [`AsyncIqGetHandler`] returns immediately with no
//! synchronous response; a spawned task computes the result payload and
//! queues the reply on the session's outbound path, applying the normal
//! reply-addressing convention. The session keeps processing subsequent
//! stanzas in the meantime.

use crate::error::HandlerError;
use crate::handlers::{HandlerOutcome, StanzaHandler};
use crate::server::ServerRuntimeContext;
use crate::session::SessionContext;
use crate::stanza::{IqType, Stanza, XmlElement};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// An IQ handler whose get-responses are produced off the dispatch path.
#[async_trait]
pub trait DeferredIqHandler: Send + Sync + 'static {
    /// Element name, normally `iq`.
    fn name(&self) -> &str {
        "iq"
    }

    /// Payload namespace this handler serves.
    fn namespace(&self) -> &str;

    /// Compute the result payload for an IQ-get. Runs on a spawned
    /// task, not the session's dispatch path.
    async fn fulfill(
        &self,
        request: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<XmlElement, HandlerError>;

    /// Synchronous handling for the non-get IQ types. The default
    /// refuses them; override for handlers that also accept sets.
    async fn execute_non_get(
        &self,
        iq_type: IqType,
        _request: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        _session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        Err(HandlerError::UnsupportedIqType(iq_type.value().to_string()))
    }
}

/// Adapter that plugs a [`DeferredIqHandler`] into the registry.
pub struct AsyncIqGetHandler<H: DeferredIqHandler> {
    inner: Arc<H>,
}

impl<H: DeferredIqHandler> AsyncIqGetHandler<H> {
    /// Wrap a deferred handler.
    pub fn new(inner: H) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<H: DeferredIqHandler> StanzaHandler for AsyncIqGetHandler<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn namespace(&self) -> Option<&str> {
        Some(self.inner.namespace())
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let iq_type = stanza
            .attribute("type")
            .and_then(IqType::parse)
            .ok_or_else(|| {
                HandlerError::UnsupportedIqType(
                    stanza.attribute("type").unwrap_or("missing").to_string(),
                )
            })?;
        if iq_type != IqType::Get {
            return self
                .inner
                .execute_non_get(iq_type, stanza, server, session)
                .await;
        }

        let task = ResponseTask {
            handler: Arc::clone(&self.inner),
            request: stanza.clone(),
            server: Arc::clone(server),
            session: Arc::clone(session),
        };
        tokio::spawn(task.run());
        Ok(HandlerOutcome::none())
    }
}

struct ResponseTask<H: DeferredIqHandler> {
    handler: Arc<H>,
    request: Stanza,
    server: Arc<ServerRuntimeContext>,
    session: Arc<SessionContext>,
}

impl<H: DeferredIqHandler> ResponseTask<H> {
    async fn run(self) {
        let payload = match self
            .handler
            .fulfill(&self.request, &self.server, &self.session)
            .await
        {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    session_id = %self.session.id(),
                    code = error.error_code(),
                    %error,
                    "deferred iq handler failed"
                );
                return;
            }
        };
        if self.session.state().is_terminal() {
            debug!(session_id = %self.session.id(), "session ended before deferred reply");
            return;
        }
        let reply = Stanza::iq_result(&self.request, Some(payload));
        if self.session.write_stanza(reply).await.is_err() {
            debug!(session_id = %self.session.id(), "connection gone before deferred reply");
        }
    }
}
