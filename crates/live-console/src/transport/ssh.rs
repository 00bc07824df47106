//! SSH transport: one console session per interactive channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Config, Handle, Handler, Msg, Session, run_stream};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::KeyPair;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::{ConsoleContext, PreparedSession, TransportKind};
use crate::error::{ConsoleError, WriteError};
use crate::session::{ConsoleSession, SessionId, generate_session_id};
use crate::terminal::{Size, TerminalWriter};

/// How long in-flight connections get to finish after shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum ChannelEvent {
    Data(String),
    Close,
}

/// Terminal writer feeding an SSH channel through its output queue.
struct ChannelWriter {
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl TerminalWriter for ChannelWriter {
    fn write(&self, text: &str) -> Result<(), WriteError> {
        self.events
            .send(ChannelEvent::Data(text.to_string()))
            .map_err(|_| WriteError::Disconnected)
    }
}

async fn forward_output(
    handle: Handle,
    channel: ChannelId,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Data(text) => {
                if handle
                    .data(channel, CryptoVec::from_slice(text.as_bytes()))
                    .await
                    .is_err()
                {
                    debug!(?channel, "SSH channel gone, dropping output");
                    break;
                }
            }
            ChannelEvent::Close => break,
        }
    }
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

/// Reassembles UTF-8 text from packets that may split multi-byte sequences.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Returns all complete text so far; an incomplete trailing sequence is
    /// held back for the next call. Invalid bytes become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        text
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

enum ChannelState {
    Pending(PreparedSession),
    Running,
}

struct SshChannel {
    session: Arc<ConsoleSession>,
    state: Option<ChannelState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    utf8: Utf8Accumulator,
}

impl SshChannel {
    fn release(self) {
        // A pending session is released when its guard drops with `state`.
        if matches!(self.state, Some(ChannelState::Running)) && !self.session.is_closed() {
            let _ = self.session.close();
        }
    }
}

/// Per-connection `russh` handler.
pub struct ConnectionHandler {
    ctx: Arc<ConsoleContext>,
    peer: Option<SocketAddr>,
    channels: HashMap<ChannelId, SshChannel>,
}

impl ConnectionHandler {
    pub fn new(ctx: Arc<ConsoleContext>, peer: Option<SocketAddr>) -> Self {
        Self {
            ctx,
            peer,
            channels: HashMap::new(),
        }
    }

    fn release_channel(&mut self, channel: ChannelId) {
        if let Some(ssh_channel) = self.channels.remove(&channel) {
            debug!(session_id = %ssh_channel.session.id(), "SSH channel released");
            ssh_channel.release();
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        for (_, ssh_channel) in self.channels.drain() {
            ssh_channel.release();
        }
        debug!(peer = ?self.peer, "SSH connection handler dropped");
    }
}

fn clamp_dimension(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(peer = ?self.peer, user, "Accepting SSH client");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let channel_id = channel.id();
        let id = SessionId::new(format!("ssh-{}", generate_session_id()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let writer = Arc::new(ChannelWriter {
            events: events_tx.clone(),
        });

        let prepared = match self
            .ctx
            .prepare(id, TransportKind::Ssh, writer, Size::default())
        {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(peer = ?self.peer, error = %e, "Refusing SSH channel");
                return Ok(false);
            }
        };

        info!(peer = ?self.peer, session_id = %prepared.session().id(), "SSH channel opened");
        tokio::spawn(forward_output(session.handle(), channel_id, events_rx));
        self.channels.insert(
            channel_id,
            SshChannel {
                session: Arc::clone(prepared.session()),
                state: Some(ChannelState::Pending(prepared)),
                events: events_tx,
                utf8: Utf8Accumulator::default(),
            },
        );
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(ssh_channel) = self.channels.get(&channel) {
            debug!(session_id = %ssh_channel.session.id(), term, col_width, row_height, "PTY requested");
            ssh_channel
                .session
                .resize(clamp_dimension(col_width), clamp_dimension(row_height));
        }
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(ssh_channel) = self.channels.get_mut(&channel) else {
            session.channel_failure(channel);
            return Ok(());
        };
        match ssh_channel.state.take() {
            Some(ChannelState::Pending(prepared)) => {
                let launched = prepared.start();
                let events = ssh_channel.events.clone();
                tokio::spawn(async move {
                    let _ = launched.task.await;
                    let _ = events.send(ChannelEvent::Close);
                });
                ssh_channel.state = Some(ChannelState::Running);
                session.channel_success(channel);
            }
            other => {
                ssh_channel.state = other;
                session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(ssh_channel) = self.channels.get(&channel) {
            ssh_channel
                .session
                .resize(clamp_dimension(col_width), clamp_dimension(row_height));
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(ssh_channel) = self.channels.get_mut(&channel) else {
            debug!(?channel, "Data for unknown SSH channel dropped");
            return Ok(());
        };
        let text = ssh_channel.utf8.push(data);
        if text.is_empty() {
            return Ok(());
        }
        if let Err(e) = ssh_channel.session.feed(&text) {
            debug!(session_id = %ssh_channel.session.id(), error = %e, "Input after session closed");
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.release_channel(channel);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.release_channel(channel);
        Ok(())
    }
}

async fn serve_connection(
    config: Arc<Config>,
    stream: TcpStream,
    handler: ConnectionHandler,
    peer: SocketAddr,
    ctx: Arc<ConsoleContext>,
) {
    let running = match run_stream(config, stream, handler).await {
        Ok(running) => running,
        Err(e) => {
            debug!(%peer, error = %e, "SSH handshake failed");
            return;
        }
    };
    tokio::pin!(running);

    let result = tokio::select! {
        result = &mut running => result,
        _ = ctx.wait_for_shutdown() => {
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut running).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%peer, "Dropping SSH connection after drain timeout");
                    Ok(())
                }
            }
        }
    };
    match result {
        Ok(()) => info!(%peer, "SSH connection closed"),
        Err(e) => debug!(%peer, error = %e, "SSH connection ended with error"),
    }
}

/// Bound SSH listener, ready to serve.
pub struct SshServer {
    listener: TcpListener,
    config: Arc<Config>,
    ctx: Arc<ConsoleContext>,
}

impl SshServer {
    pub async fn bind(
        addr: &str,
        keys: Vec<KeyPair>,
        ctx: Arc<ConsoleContext>,
    ) -> Result<Self, ConsoleError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConsoleError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let config = Config {
            keys,
            inactivity_timeout: None,
            auth_rejection_time: Duration::from_secs(1),
            ..Default::default()
        };
        Ok(Self {
            listener,
            config: Arc::new(config),
            ctx,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accepts connections until shutdown, then drains them.
    pub async fn run(self) {
        let SshServer {
            listener,
            config,
            ctx,
        } = self;
        let mut connections = JoinSet::new();
        info!(addr = ?listener.local_addr().ok(), "SSH console listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "SSH connection accepted");
                        let handler = ConnectionHandler::new(Arc::clone(&ctx), Some(peer));
                        connections.spawn(serve_connection(
                            Arc::clone(&config),
                            stream,
                            handler,
                            peer,
                            Arc::clone(&ctx),
                        ));
                    }
                    Err(e) => warn!(error = %e, "SSH accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = ctx.wait_for_shutdown() => break,
            }
        }

        drop(listener);
        let pending = connections.len();
        if pending > 0 {
            info!(connections = pending, "Draining SSH connections");
        }
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "SSH drain timed out, aborting connections"
            );
            connections.shutdown().await;
        }
        info!("SSH console stopped");
    }
}
