//! Stanza content handlers.
//!
//! This module holds the [`StanzaHandler`] contract the admission
//! pipeline dispatches to, the server-wide [`HandlerRegistry`], and the
//! handlers that belong to the protocol core itself: stream and TLS
//! negotiation, SASL framing, and resource binding. Business-logic
//! handlers (roster, presence routing, and the like) live outside this
//! crate and register through the same contract.

pub mod bind;
pub mod deferred;
pub mod negotiation;

use crate::error::HandlerError;
use crate::server::ServerRuntimeContext;
use crate::session::{SessionContext, SessionState};
use crate::stanza::Stanza;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What a handler asks the session to do after it ran.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    /// Response stanza to queue on the session's outbound path.
    pub response: Option<Stanza>,
    /// State transition requested of the state machine, if any.
    pub next_state: Option<SessionState>,
    /// Whether the next inbound bytes must open a fresh stream.
    pub reopen_stream: bool,
}

impl HandlerOutcome {
    /// Nothing to send, no transition. Also the shape a deferred
    /// handler returns when its response will arrive later.
    pub fn none() -> Self {
        Self::default()
    }

    /// A synchronous response, no transition.
    pub fn reply(response: Stanza) -> Self {
        Self {
            response: Some(response),
            ..Self::default()
        }
    }

    /// Request a state transition.
    pub fn transition(next_state: SessionState) -> Self {
        Self {
            next_state: Some(next_state),
            ..Self::default()
        }
    }

    /// Attach a response stanza.
    pub fn with_response(mut self, response: Stanza) -> Self {
        self.response = Some(response);
        self
    }

    /// Request a stream reopen.
    pub fn with_reopen(mut self) -> Self {
        self.reopen_stream = true;
        self
    }
}

/// A content handler for one stanza element.
#[async_trait]
pub trait StanzaHandler: Send + Sync {
    /// Element name this handler serves.
    fn name(&self) -> &str;

    /// Namespace the handler is registered under, if namespace-bound.
    /// For IQ handlers this is the namespace of the request payload.
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Whether dispatch must supply a live session context. Handlers
    /// reached through the admission pipeline always get one.
    fn is_session_required(&self) -> bool {
        true
    }

    /// Execute the handler's logic for an admitted stanza.
    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
    ) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandlerKey {
    name: String,
    namespace: Option<String>,
}

/// Server-wide handler registry, built once at startup.
///
/// Handlers are keyed by element name plus namespace. Content stanzas
/// (IQ in particular) resolve by the namespace of their payload child,
/// so `iq` + `urn:ietf:params:xml:ns:xmpp-bind` and `iq` + a disco
/// namespace are distinct registrations. A name-only registration acts
/// as the fallback for that element.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn StanzaHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the protocol core's own handlers:
    /// stream open, STARTTLS, and resource binding. SASL needs an
    /// authenticator and is registered by the caller.
    pub fn with_core_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(negotiation::StreamOpenHandler));
        registry.register(Arc::new(negotiation::StartTlsHandler));
        registry.register(Arc::new(bind::BindHandler));
        registry
    }

    /// Add a handler under its name/namespace key. A later
    /// registration for the same key replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn StanzaHandler>) {
        let key = HandlerKey {
            name: handler.name().to_string(),
            namespace: handler.namespace().map(str::to_string),
        };
        self.handlers.insert(key, handler);
    }

    /// Resolve the handler for a stanza, preferring the
    /// namespace-qualified registration over the name-only fallback.
    pub fn resolve(&self, stanza: &Stanza) -> Option<Arc<dyn StanzaHandler>> {
        let namespace = Self::dispatch_namespace(stanza);
        let qualified = HandlerKey {
            name: stanza.name().to_string(),
            namespace: namespace.map(str::to_string),
        };
        if let Some(handler) = self.handlers.get(&qualified) {
            return Some(Arc::clone(handler));
        }
        let fallback = HandlerKey {
            name: stanza.name().to_string(),
            namespace: None,
        };
        self.handlers.get(&fallback).map(Arc::clone)
    }

    /// The namespace a stanza dispatches on: for IQs the payload
    /// child's namespace, otherwise the top-level element's.
    fn dispatch_namespace(stanza: &Stanza) -> Option<&str> {
        if stanza.name() == "iq" {
            if let Some(payload) = stanza.element().first_child() {
                return payload.namespace();
            }
        }
        stanza.namespace()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
