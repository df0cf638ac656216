//! The admission pipeline.

use crate::error::{ContractViolation, ProtocolViolation};
use crate::parser::StreamParser;
use crate::protocol::response::ResponseWriter;
use crate::protocol::states::{
    DispatchWorker, EncryptionStartedWorker, InitiatedWorker, StateAwareWorker, TerminalWorker,
    UnconnectedWorker,
};
use crate::server::ServerRuntimeContext;
use crate::session::{SessionContext, SessionState, SessionStateHolder};
use crate::stanza::{CoreStanza, Stanza};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Admits inbound stanzas to their content handlers.
///
/// Every stanza passes, in order: handler resolution, the
/// authentication gate of RFC 3920 section 4.3, sender verification,
/// and the worker for the session's current lifecycle state. Handler
/// failures are caught here and logged; one misbehaving handler never
/// takes the session down.
pub struct ProtocolWorker {
    workers: HashMap<SessionState, Arc<dyn StateAwareWorker>>,
    writer: ResponseWriter,
}

impl ProtocolWorker {
    /// Build the pipeline with a worker for every lifecycle state.
    pub fn new() -> Self {
        let mut workers: HashMap<SessionState, Arc<dyn StateAwareWorker>> = HashMap::new();
        workers.insert(SessionState::Unconnected, Arc::new(UnconnectedWorker));
        workers.insert(SessionState::Initiated, Arc::new(InitiatedWorker));
        let dispatch: Arc<dyn StateAwareWorker> = Arc::new(DispatchWorker);
        workers.insert(SessionState::Started, Arc::clone(&dispatch));
        workers.insert(SessionState::Encrypted, Arc::clone(&dispatch));
        workers.insert(SessionState::Authenticated, dispatch);
        workers.insert(
            SessionState::EncryptionStarted,
            Arc::new(EncryptionStartedWorker),
        );
        let terminal: Arc<dyn StateAwareWorker> = Arc::new(TerminalWorker);
        workers.insert(SessionState::Ended, Arc::clone(&terminal));
        workers.insert(SessionState::Closed, terminal);
        Self {
            workers,
            writer: ResponseWriter,
        }
    }

    /// Admit one stanza.
    ///
    /// Recoverable violations are answered through the response writer
    /// and return `Ok`; the only `Err` is the configuration defect of
    /// a state without a registered worker, which aborts this request
    /// and lets the driver close the connection.
    pub async fn process_stanza(
        &self,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
        stanza: &Stanza,
    ) -> Result<(), ContractViolation> {
        let Some(handler) = server.handlers().resolve(stanza) else {
            warn!(
                session_id = %session.id(),
                stanza = %stanza.dense(),
                code = ProtocolViolation::UnsupportedStanzaType.error_code(),
                "no handler for stanza"
            );
            self.writer.unsupported_stanza_type(session).await;
            return Ok(());
        };

        let state = holder.state();
        let worker = self
            .workers
            .get(&state)
            .ok_or(ContractViolation::NoWorkerForState(state))?;

        if state != SessionState::Authenticated && CoreStanza::wrap(stanza).is_some() {
            warn!(
                session_id = %session.id(),
                ?state,
                code = ProtocolViolation::NotAuthorized.error_code(),
                "content stanza before authentication"
            );
            self.writer.not_authorized(session, stanza).await;
            return Ok(());
        }

        if let Err(violation) = Self::verify_sender(server, session, stanza) {
            warn!(
                session_id = %session.id(),
                from = stanza.attribute("from").unwrap_or_default(),
                code = violation.error_code(),
                "sender verification failed"
            );
            self.writer.wrong_from_jid(session, stanza).await;
            return Ok(());
        }

        if let Err(failure) = worker
            .process(&handler, stanza, server, session, holder, &self.writer)
            .await
        {
            // handler failures are contained; the session stays alive
            error!(
                session_id = %session.id(),
                handler = handler.name(),
                code = failure.error_code(),
                %failure,
                stanza = %stanza.dense(),
                "stanza handler failed"
            );
        }
        Ok(())
    }

    /// The three sender rules, applied to any stanza carrying a
    /// `from`: it must belong to the session's account once one is
    /// known, a full `from` must name a currently bound resource, and
    /// a bare `from` is ambiguous when the session holds more than one
    /// binding.
    fn verify_sender(
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        stanza: &Stanza,
    ) -> Result<(), ProtocolViolation> {
        let Some(from) = stanza.attribute("from") else {
            return Ok(());
        };
        let from = from
            .parse::<crate::addr::Entity>()
            .map_err(|_| ProtocolViolation::WrongFromJid)?;
        // without an authenticated account there is no bare form to
        // compare against; the binding rules below still apply
        if let Some(account) = session.initiating_entity() {
            if from.bare() != account {
                return Err(ProtocolViolation::WrongFromJid);
            }
        }
        match from.resource() {
            Some(_) => {
                if server.registry().bound_resources(&from, false).is_empty() {
                    return Err(ProtocolViolation::WrongFromJid);
                }
            }
            None => {
                if server.registry().resources_for_session(session).len() > 1 {
                    return Err(ProtocolViolation::WrongFromJid);
                }
            }
        }
        Ok(())
    }

    /// Transport reports a completed TLS handshake. Legal only while
    /// the session waits in `EncryptionStarted`; anywhere else the
    /// signal is answered with a TLS failure and ignored.
    pub async fn process_tls_established(
        &self,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
    ) {
        if holder.state() != SessionState::EncryptionStarted {
            warn!(
                session_id = %session.id(),
                state = ?holder.state(),
                code = ProtocolViolation::TlsDesync.error_code(),
                "unexpected TLS establishment signal"
            );
            self.writer
                .protocol_error(session, ProtocolViolation::TlsDesync)
                .await;
            return;
        }
        if let Err(refused) = holder.transition_to(SessionState::Encrypted) {
            warn!(session_id = %session.id(), %refused, "state transition refused");
            return;
        }
        session.mark_reopen_stream();
    }

    /// Transport reports that the connection will stay unencrypted
    /// (handshake failed or TLS unavailable). The session is aborted.
    pub async fn process_tls_failed(
        &self,
        session: &Arc<SessionContext>,
        holder: &Arc<SessionStateHolder>,
    ) {
        warn!(session_id = %session.id(), "TLS not established, aborting session");
        self.writer
            .protocol_error(session, ProtocolViolation::TlsDesync)
            .await;
        holder.close();
    }

    /// Pull the next stanza from the stream parser. Parse failures are
    /// answered through the response writer and skipped; `None` means
    /// the peer closed the stream.
    pub async fn acquire_stanza(
        &self,
        session: &Arc<SessionContext>,
        parser: &mut (dyn StreamParser + '_),
    ) -> Option<Stanza> {
        loop {
            match parser.next_stanza().await {
                Ok(next) => return next,
                Err(failure) => {
                    warn!(
                        session_id = %session.id(),
                        code = ProtocolViolation::BadFormat.error_code(),
                        %failure,
                        "dropping undecodable stream input"
                    );
                    self.writer.parse_failure(session).await;
                }
            }
        }
    }

    /// Answer a parse failure the driver observed itself.
    pub async fn process_parse_failure(&self, session: &Arc<SessionContext>) {
        self.writer.parse_failure(session).await;
    }
}

impl Default for ProtocolWorker {
    fn default() -> Self {
        Self::new()
    }
}
