//! Interactive terminal sessions and the registry that tracks them.

mod registry;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SessionError;
use crate::terminal::{
    AppSession, ConsoleOutput, InputReader, NewlineMode, PipeInput, Size, TerminalWriter,
    create_pipe_input,
};

pub use registry::{DEFAULT_MAX_SESSIONS, SessionInfo, SessionRegistry};

/// Identifier of a live session, unique within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

pub fn generate_session_id() -> SessionId {
    SessionId::new(Uuid::new_v4().to_string()[..8].to_string())
}

/// One interactive terminal: a virtual input pipe, an output device, and
/// the application context binding the two.
pub struct ConsoleSession {
    id: SessionId,
    created_at: DateTime<Utc>,
    input: PipeInput,
    output: Arc<ConsoleOutput>,
    app_session: Arc<AppSession>,
}

impl ConsoleSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Injects `data` as if the user had typed it.
    pub fn feed(&self, data: &str) -> Result<(), SessionError> {
        self.input.send_text(data)
    }

    /// Updates the viewport and asks the bound application, if any, to
    /// re-lay itself out.
    pub fn resize(&self, cols: u16, rows: u16) {
        let size = Size::new(cols, rows);
        self.output.set_size(size);
        if let Some(app) = self.app_session.app() {
            app.on_resize(size);
        }
    }

    /// Closes the input pipe, ending the REPL bound to this session.
    pub fn close(&self) -> Result<(), SessionError> {
        self.input.close()
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_closed()
    }

    pub fn size(&self) -> Size {
        self.output.get_size()
    }

    pub fn output(&self) -> &Arc<ConsoleOutput> {
        &self.output
    }

    pub fn app_session(&self) -> &Arc<AppSession> {
        &self.app_session
    }
}

impl fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Acquires the input pipe, output device and application context of a new
/// session. The caller owns the returned reader and hands it to the REPL.
pub fn open_session(
    id: SessionId,
    writer: Arc<dyn TerminalWriter>,
    newline: NewlineMode,
    size: Size,
) -> (Arc<ConsoleSession>, InputReader) {
    let (input, reader) = create_pipe_input();
    let output = Arc::new(ConsoleOutput::with_size(writer, newline, size));
    let session = Arc::new(ConsoleSession {
        id,
        created_at: Utc::now(),
        input,
        output,
        app_session: AppSession::new(),
    });
    (session, reader)
}

type ReleaseHook = Box<dyn FnOnce(&Arc<ConsoleSession>) + Send>;

/// Scoped ownership of a session.
///
/// Dropping the guard closes the session's input unless something else
/// already did, then runs the release hook. Both happen on every exit path
/// of the owning task, unwinding included.
pub struct SessionGuard {
    session: Arc<ConsoleSession>,
    on_release: Option<ReleaseHook>,
}

impl SessionGuard {
    pub fn new(session: Arc<ConsoleSession>) -> Self {
        Self {
            session,
            on_release: None,
        }
    }

    pub fn on_release(mut self, hook: impl FnOnce(&Arc<ConsoleSession>) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn session(&self) -> &Arc<ConsoleSession> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.session.is_closed() {
            let _ = self.session.close();
        }
        if let Some(hook) = self.on_release.take() {
            hook(&self.session);
        }
    }
}
