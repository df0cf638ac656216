//! Per-connection session driver.
//!
//! The transport layer accepts a connection, calls
//! [`SessionDriver::accept`], keeps the [`DriverHandles`] (the outbound
//! stanza queue to render onto the wire and the signal sender for TLS
//! events), and runs the driver with its stream parser. The driver's
//! select loop is what serializes a session's inbound processing: one
//! stanza or transport signal at a time, in arrival order.

use crate::parser::StreamParser;
use crate::server::ServerRuntimeContext;
use crate::session::{SessionContext, SessionStateHolder};
use crate::stanza::Stanza;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

/// Out-of-band events the transport reports to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    /// The TLS handshake completed; the stream is now encrypted.
    TlsEstablished,
    /// The handshake failed or TLS is unavailable; the stream stays
    /// unencrypted.
    TlsUnsecured,
}

/// The transport's half of a driven session.
pub struct DriverHandles {
    /// Receive half of the session's outbound stanza queue.
    pub outbound: mpsc::Receiver<Stanza>,
    /// Sender for TLS transport signals.
    pub signals: mpsc::Sender<TransportSignal>,
}

/// Owns one session's inbound processing from accept to close.
pub struct SessionDriver {
    server: Arc<ServerRuntimeContext>,
    session: Arc<SessionContext>,
    holder: Arc<SessionStateHolder>,
    signals: mpsc::Receiver<TransportSignal>,
}

impl SessionDriver {
    /// Register a new session for an accepted connection.
    pub fn accept(server: &Arc<ServerRuntimeContext>) -> (Self, DriverHandles) {
        let (session, holder, outbound) = server.create_session();
        let (signal_tx, signal_rx) = mpsc::channel(4);
        (
            Self {
                server: Arc::clone(server),
                session,
                holder,
                signals: signal_rx,
            },
            DriverHandles {
                outbound,
                signals: signal_tx,
            },
        )
    }

    /// The driven session.
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Process the connection until the peer closes the stream or the
    /// session reaches a terminal state. Always deregisters the
    /// session and drops its bindings on the way out.
    #[instrument(skip_all, fields(session_id = %self.session.id()))]
    pub async fn run(mut self, mut parser: Box<dyn StreamParser>) -> anyhow::Result<()> {
        info!("session opened");
        let worker = self.server.stanza_processor();
        let mut signals_open = true;
        loop {
            if self.holder.state().is_terminal() {
                break;
            }
            tokio::select! {
                stanza = worker.acquire_stanza(&self.session, parser.as_mut()) => {
                    let Some(stanza) = stanza else {
                        debug!("peer closed the stream");
                        break;
                    };
                    if let Err(violation) = worker
                        .process_stanza(&self.server, &self.session, &self.holder, &stanza)
                        .await
                    {
                        error!(%violation, "closing session on configuration defect");
                        self.close();
                        return Err(violation.into());
                    }
                }
                signal = self.signals.recv(), if signals_open => {
                    match signal {
                        Some(TransportSignal::TlsEstablished) => {
                            worker.process_tls_established(&self.session, &self.holder).await;
                        }
                        Some(TransportSignal::TlsUnsecured) => {
                            worker.process_tls_failed(&self.session, &self.holder).await;
                        }
                        None => signals_open = false,
                    }
                }
            }
        }
        self.close();
        Ok(())
    }

    /// Transport idle notification; bookkeeping only.
    pub fn notify_idle(&self) {
        debug!(session_id = %self.session.id(), "session idle");
    }

    fn close(&self) {
        // transport teardown, as opposed to a deliberate session end
        self.holder.close();
        self.server.remove_session(&self.session);
        info!(session_id = %self.session.id(), "session closed");
    }
}
