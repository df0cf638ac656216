//! Contract to the external XML stream parser.

use crate::error::ParseError;
use crate::stanza::Stanza;
use async_trait::async_trait;

/// Pull interface over one connection's decoded stanza stream.
///
/// The XML tokenizer lives outside this crate; the core consumes
/// well-formed, already-parsed stanzas through this trait. A parse
/// failure is recoverable: the pipeline answers it through the
/// response writer and keeps reading.
///
/// Implementations must be cancel-safe: the session driver polls
/// [`next_stanza`](StreamParser::next_stanza) inside a `select!` and
/// may drop the future before completion.
#[async_trait]
pub trait StreamParser: Send {
    /// The next stanza, or `None` when the peer closed the stream.
    async fn next_stanza(&mut self) -> Result<Option<Stanza>, ParseError>;
}
