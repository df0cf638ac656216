//! In-memory test harness: a server context with the core handlers
//! plus a scripted authenticator, and a scripted stream parser that
//! feeds a fixed stanza sequence to a session driver.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use stanzad::error::{HandlerError, ParseError};
use stanzad::handlers::HandlerRegistry;
use stanzad::handlers::negotiation::{AuthHandler, Authenticator};
use stanzad::parser::StreamParser;
use stanzad::stanza::{Stanza, XmlElement, ns};
use stanzad::{Config, Entity, ServerRuntimeContext};
use tracing_subscriber::EnvFilter;

/// Initialize tracing once per test binary; `RUST_LOG` selects the
/// verbosity, quiet by default.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Accepts any credential whose payload parses as an address.
pub struct PayloadAuthenticator;

#[async_trait]
impl Authenticator for PayloadAuthenticator {
    async fn verify(&self, _mechanism: &str, payload: &str) -> Result<Entity, HandlerError> {
        Entity::parse(payload).map_err(|e| HandlerError::Internal(e.to_string()))
    }
}

/// A server context with the core handlers and a PLAIN-only SASL
/// handler backed by [`PayloadAuthenticator`].
pub fn test_server() -> Arc<ServerRuntimeContext> {
    init_tracing();
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.register(Arc::new(AuthHandler::new(
        vec!["PLAIN".to_string()],
        Arc::new(PayloadAuthenticator),
    )));
    ServerRuntimeContext::new(&Config::default(), handlers).expect("default config is valid")
}

/// Stream parser yielding a fixed script, then end-of-stream (or, in
/// hold-open mode, a stream that stays silent instead of closing).
pub struct ScriptedParser {
    script: VecDeque<Result<Stanza, ParseError>>,
    hold_open: bool,
}

impl ScriptedParser {
    pub fn new(stanzas: Vec<Stanza>) -> Self {
        Self {
            script: stanzas.into_iter().map(Ok).collect(),
            hold_open: false,
        }
    }

    /// Like [`new`](Self::new), but the stream never reaches
    /// end-of-stream; the connection stays open after the script.
    pub fn hold_open(stanzas: Vec<Stanza>) -> Self {
        Self {
            script: stanzas.into_iter().map(Ok).collect(),
            hold_open: true,
        }
    }

    pub fn with_script(script: Vec<Result<Stanza, ParseError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            hold_open: false,
        }
    }
}

#[async_trait]
impl StreamParser for ScriptedParser {
    async fn next_stanza(&mut self) -> Result<Option<Stanza>, ParseError> {
        match self.script.pop_front() {
            Some(Ok(stanza)) => Ok(Some(stanza)),
            Some(Err(failure)) => Err(failure),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}

/// Client-side stream open.
pub fn stream_open(to: &str) -> Stanza {
    Stanza::builder("stream", Some(ns::STREAM))
        .attribute("to", to)
        .attribute("version", "1.0")
        .build()
}

/// SASL auth request carrying the account address as payload, the
/// shape [`PayloadAuthenticator`] accepts.
pub fn auth(account: &str) -> Stanza {
    Stanza::builder("auth", Some(ns::SASL))
        .attribute("mechanism", "PLAIN")
        .text(account)
        .build()
}

/// Resource-binding IQ set.
pub fn bind_request(id: &str) -> Stanza {
    Stanza::builder("iq", Some(ns::CLIENT))
        .attribute("type", "set")
        .attribute("id", id)
        .child(XmlElement::new("bind", Some(ns::BIND)))
        .build()
}

/// Drain everything currently queued on an outbound receiver.
pub fn drain(outbound: &mut tokio::sync::mpsc::Receiver<Stanza>) -> Vec<Stanza> {
    let mut stanzas = Vec::new();
    while let Ok(stanza) = outbound.try_recv() {
        stanzas.push(stanza);
    }
    stanzas
}
