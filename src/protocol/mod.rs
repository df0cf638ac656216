//! The admission pipeline and session state machine.
//!
//! [`worker::ProtocolWorker`] admits every inbound stanza: it resolves
//! the content handler, applies the authentication gate and sender
//! verification, then hands the stanza to the worker for the session's
//! current state. [`response::ResponseWriter`] answers every rejected
//! case with the standards-defined error shape.

pub mod response;
pub mod states;
pub mod worker;

pub use response::ResponseWriter;
pub use worker::ProtocolWorker;
