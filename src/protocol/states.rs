//! Per-state dispatch strategies.
//!
//! Each lifecycle state gets a worker that knows which stanzas are
//! legal there, runs the resolved handler, and applies the outcome:
//! response out through the session, stream-reopen mark, requested or
//! default state transition.

use crate::error::{HandlerError, ProtocolViolation};
use crate::handlers::{HandlerOutcome, StanzaHandler};
use crate::protocol::response::ResponseWriter;
use crate::server::ServerRuntimeContext;
use crate::session::{SessionContext, SessionState, SessionStateHolder};
use crate::stanza::Stanza;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// State-specific half of the admission pipeline.
#[async_trait]
pub trait StateAwareWorker: Send + Sync {
    /// Process one admitted stanza in this worker's state. Handler
    /// failures propagate to the pipeline's swallow-and-log boundary.
    async fn process(
        &self,
        handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        writer: &ResponseWriter,
    ) -> Result<(), HandlerError>;
}

async fn run_handler(
    handler: &Arc<dyn StanzaHandler>,
    stanza: &Stanza,
    server: &Arc<ServerRuntimeContext>,
    session: &Arc<SessionContext>,
    holder: &Arc<SessionStateHolder>,
    default_next: Option<SessionState>,
) -> Result<(), HandlerError> {
    let outcome = handler.execute(stanza, server, session).await?;
    apply_outcome(session, holder, outcome, default_next).await
}

async fn apply_outcome(
    session: &Arc<SessionContext>,
    holder: &Arc<SessionStateHolder>,
    outcome: HandlerOutcome,
    default_next: Option<SessionState>,
) -> Result<(), HandlerError> {
    if let Some(response) = outcome.response {
        session.write_stanza(response).await?;
    }
    if outcome.reopen_stream {
        session.mark_reopen_stream();
    }
    if let Some(next) = outcome.next_state.or(default_next) {
        if let Err(refused) = holder.transition_to(next) {
            warn!(session_id = %session.id(), %refused, "state transition refused");
        }
    }
    Ok(())
}

/// No stream header seen yet: only a stream open is legal, and it
/// carries the session to `Started` once the server's open is queued.
pub struct UnconnectedWorker;

#[async_trait]
impl StateAwareWorker for UnconnectedWorker {
    async fn process(
        &self,
        handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        writer: &ResponseWriter,
    ) -> Result<(), HandlerError> {
        if stanza.name() != "stream" {
            writer
                .protocol_error(session, ProtocolViolation::OutOfOrderStanza)
                .await;
            return Ok(());
        }
        if let Err(refused) = holder.transition_to(SessionState::Initiated) {
            warn!(session_id = %session.id(), %refused, "state transition refused");
        }
        run_handler(
            handler,
            stanza,
            server,
            session,
            holder,
            Some(SessionState::Started),
        )
        .await
    }
}

/// Stream header seen, server open not yet acknowledged.
pub struct InitiatedWorker;

#[async_trait]
impl StateAwareWorker for InitiatedWorker {
    async fn process(
        &self,
        handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        _writer: &ResponseWriter,
    ) -> Result<(), HandlerError> {
        run_handler(
            handler,
            stanza,
            server,
            session,
            holder,
            Some(SessionState::Started),
        )
        .await
    }
}

/// Plain dispatch, no default transition. Serves `Started`,
/// `Encrypted` and `Authenticated`, where handlers drive any state
/// changes themselves.
pub struct DispatchWorker;

#[async_trait]
impl StateAwareWorker for DispatchWorker {
    async fn process(
        &self,
        handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        _writer: &ResponseWriter,
    ) -> Result<(), HandlerError> {
        run_handler(handler, stanza, server, session, holder, None).await
    }
}

/// Between `<proceed/>` and the transport's handshake signal the peer
/// must send nothing. A stanza here means the negotiation desynced;
/// the session is aborted rather than left in an undefined state.
pub struct EncryptionStartedWorker;

#[async_trait]
impl StateAwareWorker for EncryptionStartedWorker {
    async fn process(
        &self,
        _handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        _holder: &Arc<SessionStateHolder>,
        writer: &ResponseWriter,
    ) -> Result<(), HandlerError> {
        warn!(
            session_id = %session.id(),
            stanza = %stanza.dense(),
            "stanza during TLS handshake, aborting session"
        );
        writer
            .protocol_error(session, ProtocolViolation::TlsDesync)
            .await;
        session.end();
        Ok(())
    }
}

/// Terminal states drop everything.
pub struct TerminalWorker;

#[async_trait]
impl StateAwareWorker for TerminalWorker {
    async fn process(
        &self,
        _handler: &Arc<dyn StanzaHandler>,
        stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        _writer: &ResponseWriter,
    ) -> Result<(), HandlerError> {
        debug!(
            session_id = %session.id(),
            state = ?holder.state(),
            stanza = %stanza.dense(),
            "stanza on ended session dropped"
        );
        Ok(())
    }
}
