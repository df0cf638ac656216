//! Session lifecycle: protocol states and per-connection context.

mod context;
mod state;

pub use context::{SessionContext, SessionId};
pub use state::{SessionState, SessionStateHolder};
