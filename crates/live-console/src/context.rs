//! Shared state handed to both transports, and the one place sessions are
//! started.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span};

use crate::error::SessionError;
use crate::repl::{HostHandle, Namespace, ReplExit, run_isolated};
use crate::session::{ConsoleSession, SessionGuard, SessionId, SessionRegistry, open_session};
use crate::terminal::{InputReader, NewlineMode, Size, TerminalWriter};

/// Which transport a session arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ssh,
    Websocket,
}

impl TransportKind {
    pub fn newline_mode(self) -> NewlineMode {
        match self {
            TransportKind::Ssh => NewlineMode::CrLf,
            TransportKind::Websocket => NewlineMode::Verbatim,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ssh => write!(f, "ssh"),
            TransportKind::Websocket => write!(f, "websocket"),
        }
    }
}

/// A session whose REPL task is running.
#[derive(Debug)]
pub struct LaunchedSession {
    pub session: Arc<ConsoleSession>,
    pub task: JoinHandle<ReplExit>,
}

/// Registry, host handle and shutdown signal for one console host.
pub struct ConsoleContext {
    registry: Arc<SessionRegistry>,
    host: Arc<HostHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl ConsoleContext {
    pub fn new(name: impl Into<String>, max_sessions: usize) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::with_max_sessions(max_sessions));
        let host = HostHandle::new(name, Arc::clone(&registry));
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            registry,
            host,
            shutdown_tx,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn host(&self) -> &Arc<HostHandle> {
        &self.host
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        let mut signal = self.shutdown_tx.subscribe();
        let _ = signal.wait_for(|stop| *stop).await;
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Flips the shutdown signal and closes every registered session.
    pub fn shutdown(&self) -> usize {
        self.shutdown_tx.send_replace(true);
        let closed = self.registry.close_all();
        info!(sessions = closed, "Console sessions closed");
        closed
    }

    /// Opens a session and registers it under `id` without starting its
    /// REPL. Dropping the returned value unregisters the session again.
    pub fn prepare(
        &self,
        id: SessionId,
        kind: TransportKind,
        writer: Arc<dyn TerminalWriter>,
        size: Size,
    ) -> Result<PreparedSession, SessionError> {
        let (session, reader) = open_session(id, writer, kind.newline_mode(), size);
        self.registry.insert(Arc::clone(&session))?;

        let registry = Arc::clone(&self.registry);
        let guard = SessionGuard::new(session).on_release(move |session| {
            if registry.remove_if_same(session) {
                debug!(session_id = %session.id(), "Session unregistered");
            }
        });

        Ok(PreparedSession {
            guard,
            reader,
            namespace: Namespace::new(Arc::clone(&self.host)),
            kind,
        })
    }

    /// Opens, registers and starts a session in one step.
    pub fn launch(
        &self,
        id: SessionId,
        kind: TransportKind,
        writer: Arc<dyn TerminalWriter>,
        size: Size,
    ) -> Result<LaunchedSession, SessionError> {
        self.prepare(id, kind, writer, size).map(PreparedSession::start)
    }
}

/// A registered session whose REPL has not started yet.
pub struct PreparedSession {
    guard: SessionGuard,
    reader: InputReader,
    namespace: Namespace,
    kind: TransportKind,
}

impl PreparedSession {
    pub fn session(&self) -> &Arc<ConsoleSession> {
        self.guard.session()
    }

    /// Spawns the REPL task. The task owns the [`SessionGuard`], so when the
    /// loop ends for any reason the input is closed and the registry entry
    /// is dropped.
    pub fn start(self) -> LaunchedSession {
        let PreparedSession {
            guard,
            reader,
            namespace,
            kind,
        } = self;
        let session = Arc::clone(guard.session());
        let output = Arc::clone(session.output());
        let app_session = Arc::clone(session.app_session());
        let span = info_span!("session", session_id = %session.id(), transport = %kind);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                info!("Console session started");
                run_isolated(namespace, reader, output, app_session).await
            }
            .instrument(span),
        );
        LaunchedSession { session, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriteError;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Capture(Mutex<String>);

    impl TerminalWriter for Capture {
        fn write(&self, text: &str) -> Result<(), WriteError> {
            self.0.lock().unwrap().push_str(text);
            Ok(())
        }
    }

    fn launch(ctx: &ConsoleContext, id: &str) -> LaunchedSession {
        ctx.launch(
            SessionId::from(id),
            TransportKind::Websocket,
            Arc::new(Capture::default()),
            Size::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_launch_registers_until_repl_ends() {
        let ctx = ConsoleContext::new("test", 4);
        let launched = launch(&ctx, "abc");
        assert!(ctx.registry().get("abc").is_some());

        launched.session.feed("quit\n").unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), launched.task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ReplExit::Quit);
        assert!(ctx.registry().get("abc").is_none());
        assert!(launched.session.is_closed());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let ctx = ConsoleContext::new("test", 4);
        let _first = launch(&ctx, "abc");
        let err = ctx
            .launch(
                SessionId::from("abc"),
                TransportKind::Websocket,
                Arc::new(Capture::default()),
                Size::default(),
            )
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyExists("abc".into()));
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let ctx = ConsoleContext::new("test", 4);
        let a = launch(&ctx, "a");
        let b = launch(&ctx, "b");
        let mut signal = ctx.shutdown_signal();

        assert_eq!(ctx.shutdown(), 2);
        assert!(ctx.is_shutting_down());
        assert!(*signal.borrow_and_update());
        for task in [a.task, b.task] {
            let exit = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(exit, ReplExit::InputClosed);
        }
        assert!(ctx.registry().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_prepared_session_unregisters_it() {
        let ctx = ConsoleContext::new("test", 4);
        let prepared = ctx
            .prepare(
                SessionId::from("ssh-1"),
                TransportKind::Ssh,
                Arc::new(Capture::default()),
                Size::default(),
            )
            .unwrap();
        let session = Arc::clone(prepared.session());
        assert_eq!(ctx.registry().len(), 1);

        drop(prepared);
        assert!(ctx.registry().is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_newline_mode_per_transport() {
        assert_eq!(TransportKind::Ssh.newline_mode(), NewlineMode::CrLf);
        assert_eq!(TransportKind::Websocket.newline_mode(), NewlineMode::Verbatim);
    }
}
