//! Server-wide runtime context.

use crate::addr::Entity;
use crate::config::Config;
use crate::error::AddrError;
use crate::handlers::HandlerRegistry;
use crate::protocol::ProtocolWorker;
use crate::registry::ResourceRegistry;
use crate::session::{SessionContext, SessionId, SessionStateHolder};
use crate::stanza::Stanza;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Everything shared across sessions: server identity, the handler
/// registry, the resource registry, the admission pipeline and the
/// live-session table.
///
/// Built once at startup and passed by `Arc` into every dispatch call.
/// Sessions hold no back-reference to it.
pub struct ServerRuntimeContext {
    domain: Entity,
    handlers: HandlerRegistry,
    registry: ResourceRegistry,
    worker: ProtocolWorker,
    sessions: DashMap<SessionId, Arc<SessionContext>>,
    outbound_queue: usize,
}

impl ServerRuntimeContext {
    /// Build the runtime context from configuration and a populated
    /// handler registry. Fails when the configured domain is not a
    /// valid address.
    pub fn new(config: &Config, handlers: HandlerRegistry) -> Result<Arc<Self>, AddrError> {
        let domain = Entity::parse(&config.server.domain)?;
        Ok(Arc::new(Self {
            domain,
            handlers,
            registry: ResourceRegistry::new(),
            worker: ProtocolWorker::new(),
            sessions: DashMap::new(),
            outbound_queue: config.limits.outbound_queue,
        }))
    }

    /// The domain this server is authoritative for.
    pub fn domain(&self) -> &Entity {
        &self.domain
    }

    /// The handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// The resource registry.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The admission pipeline.
    pub fn stanza_processor(&self) -> &ProtocolWorker {
        &self.worker
    }

    /// Allocate and register a session for a newly accepted
    /// connection. Returns the context, its state holder, and the
    /// receive half of the outbound path for the transport.
    pub fn create_session(
        &self,
    ) -> (
        Arc<SessionContext>,
        Arc<SessionStateHolder>,
        mpsc::Receiver<Stanza>,
    ) {
        let (session, holder, outbound_rx) = SessionContext::new(self.outbound_queue);
        self.sessions.insert(session.id(), Arc::clone(&session));
        debug!(session_id = %session.id(), "session created");
        (session, holder, outbound_rx)
    }

    /// Deregister a session and drop all its resource bindings.
    pub fn remove_session(&self, session: &SessionContext) {
        self.registry.unbind_session(session);
        self.sessions.remove(&session.id());
        debug!(session_id = %session.id(), "session removed");
    }

    /// Look up a live session by id.
    pub fn session(&self, id: &SessionId) -> Option<Arc<SessionContext>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
