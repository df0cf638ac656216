//! Per-connection session context.

use crate::addr::Entity;
use crate::error::HandlerError;
use crate::session::{SessionState, SessionStateHolder};
use crate::stanza::Stanza;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier of one live connection.
pub type SessionId = Uuid;

/// One live, possibly-encrypted connection.
///
/// Created when the transport accepts a connection, destroyed when the
/// connection closes. Inbound processing for a session is serialized by
/// its driver; the fields here use interior locks only because the
/// resource registry and deferred handler tasks hold the context across
/// tasks and may touch it concurrently with the dispatch path.
#[derive(Debug)]
pub struct SessionContext {
    id: SessionId,
    state: Arc<SessionStateHolder>,
    initiating_entity: RwLock<Option<Entity>>,
    reopen_stream: AtomicBool,
    outbound: mpsc::Sender<Stanza>,
    created_at: DateTime<Utc>,
}

impl SessionContext {
    /// Allocate a context together with its state holder and the
    /// receive half of the outbound path (kept by the transport, which
    /// serializes stanzas onto the wire).
    pub fn new(
        outbound_queue: usize,
    ) -> (Arc<Self>, Arc<SessionStateHolder>, mpsc::Receiver<Stanza>) {
        let (outbound, outbound_rx) = mpsc::channel(outbound_queue);
        let holder = Arc::new(SessionStateHolder::new());
        let context = Arc::new(Self {
            id: Uuid::new_v4(),
            state: Arc::clone(&holder),
            initiating_entity: RwLock::new(None),
            reopen_stream: AtomicBool::new(false),
            outbound,
            created_at: Utc::now(),
        });
        (context, holder, outbound_rx)
    }

    /// This session's unique identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current protocol state.
    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    /// The state holder owned by this session.
    pub fn state_holder(&self) -> &Arc<SessionStateHolder> {
        &self.state
    }

    /// The authenticated bare account, once authentication succeeded.
    pub fn initiating_entity(&self) -> Option<Entity> {
        self.initiating_entity.read().clone()
    }

    /// Record the authenticated account. Stored in bare form; set once
    /// by the authentication path.
    pub fn set_initiating_entity(&self, entity: Entity) {
        *self.initiating_entity.write() = Some(entity.bare());
    }

    /// Mark that the next inbound bytes must be parsed as a fresh
    /// stream header (after TLS establishment or authentication).
    pub fn mark_reopen_stream(&self) {
        self.reopen_stream.store(true, Ordering::Release);
    }

    /// Consume the stream-reopen mark; the transport polls this after
    /// each processed unit.
    pub fn take_reopen_stream(&self) -> bool {
        self.reopen_stream.swap(false, Ordering::AcqRel)
    }

    /// When the connection was accepted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queue a stanza for delivery to the peer. Safe to call from the
    /// dispatch path and from deferred tasks concurrently. Fails only
    /// when the connection is gone.
    pub async fn write_stanza(&self, stanza: Stanza) -> Result<(), HandlerError> {
        self.outbound
            .send(stanza)
            .await
            .map_err(|_| HandlerError::OutboundClosed)
    }

    /// End the session deliberately: the state becomes
    /// [`SessionState::Ended`] and no further stanza is dispatched.
    /// Transport teardown moves to `Closed` through the state holder
    /// instead; resource-registry cleanup is the driver's job.
    pub fn end(&self) {
        // refused only when already terminal
        let _ = self.state.transition_to(SessionState::Ended);
    }
}
