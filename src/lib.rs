//! Protocol core of an XMPP server.
//!
//! This crate owns the server-side session lifecycle and the stanza
//! admission pipeline of RFC 3920: the per-connection state machine,
//! the resource registry binding accounts to live sessions, handler
//! resolution and dispatch, and the deferred IQ-get pattern. It does
//! not speak to the network and does not tokenize XML; a transport
//! layer feeds it parsed stanzas through the [`parser::StreamParser`]
//! contract and renders outbound stanza trees onto the wire.
//!
//! The entry points are [`server::ServerRuntimeContext`] (built once
//! from a [`config::Config`] and a populated
//! [`handlers::HandlerRegistry`]) and [`driver::SessionDriver`] (one
//! per accepted connection).

#![warn(missing_docs)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod addr;
pub mod config;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stanza;

pub use addr::Entity;
pub use config::Config;
pub use driver::{DriverHandles, SessionDriver, TransportSignal};
pub use handlers::{HandlerOutcome, HandlerRegistry, StanzaHandler};
pub use registry::ResourceRegistry;
pub use server::ServerRuntimeContext;
pub use session::{SessionContext, SessionState, SessionStateHolder};
pub use stanza::Stanza;
