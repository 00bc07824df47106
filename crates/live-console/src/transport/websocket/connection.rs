use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{self, Command, ERR_NOT_FOUND, Request};
use crate::context::{ConsoleContext, TransportKind};
use crate::error::WriteError;
use crate::session::{ConsoleSession, SessionId};
use crate::terminal::{Size, TerminalWriter};

/// Writes terminal output as event frames tagged with the request id that
/// created the session.
pub struct EventWriter {
    request_id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

impl EventWriter {
    pub fn new(request_id: u64, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            request_id,
            outbound,
        }
    }
}

impl TerminalWriter for EventWriter {
    fn write(&self, text: &str) -> Result<(), WriteError> {
        self.outbound
            .send(protocol::output_event(self.request_id, text))
            .map_err(|_| WriteError::Disconnected)
    }
}

/// Message handling for one websocket connection, independent of the
/// socket itself. Outbound frames go to the channel given at construction.
pub struct ConsoleConnection {
    ctx: Arc<ConsoleContext>,
    outbound: mpsc::UnboundedSender<String>,
    sessions: HashMap<u64, Arc<ConsoleSession>>,
}

impl ConsoleConnection {
    pub fn new(ctx: Arc<ConsoleContext>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            ctx,
            outbound,
            sessions: HashMap::new(),
        }
    }

    /// Sessions created over this connection, keyed by creating request id.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn handle_text(&mut self, text: &str) {
        match protocol::parse_request(text) {
            Ok(request) => self.handle_request(request),
            Err(err) => {
                debug!(code = err.code, message = %err.message, "Rejected websocket frame");
                self.send(err.to_frame());
            }
        }
    }

    pub fn handle_request(&mut self, request: Request) {
        let Request { id, command } = request;
        match command {
            Command::CreateSession { session_id } => self.create_session(id, session_id),
            Command::Input { session_id, data } => match self.ctx.registry().get(&session_id) {
                Some(session) => {
                    if let Err(e) = session.feed(&data) {
                        debug!(%session_id, error = %e, "Input for closed session dropped");
                    }
                }
                None => debug!(%session_id, "Input for unknown session dropped"),
            },
            Command::Resize {
                session_id,
                cols,
                rows,
            } => match self.ctx.registry().get(&session_id) {
                Some(session) => session.resize(cols, rows),
                None => debug!(%session_id, "Resize for unknown session dropped"),
            },
            Command::UnsubscribeEvents { subscription } => {
                match self.sessions.remove(&subscription) {
                    Some(session) => {
                        self.release(&session);
                        self.send(protocol::success_result(id));
                    }
                    None => self.send(protocol::error_result(
                        id,
                        ERR_NOT_FOUND,
                        "Subscription not found.",
                    )),
                }
            }
        }
    }

    fn create_session(&mut self, id: u64, session_id: String) {
        let writer = Arc::new(EventWriter::new(id, self.outbound.clone()));
        let prepared = match self.ctx.prepare(
            SessionId::new(session_id.clone()),
            TransportKind::Websocket,
            writer,
            Size::default(),
        ) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(%session_id, error = %e, "Console session refused");
                self.send(protocol::error_result(id, e.code(), &e.to_string()));
                return;
            }
        };

        if let Some(replaced) = self.sessions.insert(id, Arc::clone(prepared.session())) {
            self.release(&replaced);
        }
        self.send(protocol::success_result(id));
        prepared.start();
        info!(%session_id, request_id = id, "Websocket console session created");
    }

    /// Closes and unregisters every session this connection created.
    pub fn disconnect(&mut self) {
        let sessions: Vec<_> = self.sessions.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            self.release(session);
        }
        if !sessions.is_empty() {
            debug!(sessions = sessions.len(), "Websocket disconnect released sessions");
        }
    }

    fn release(&self, session: &Arc<ConsoleSession>) {
        if !session.is_closed() {
            let _ = session.close();
        }
        self.ctx.registry().remove_if_same(session);
    }

    fn send(&self, frame: String) {
        if self.outbound.send(frame).is_err() {
            debug!("Websocket outbound channel closed");
        }
    }
}

impl Drop for ConsoleConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
