//! Error types for sessions, terminal output, and process lifecycle.
//!
//! Each error carries a stable string code and a suggestion so that both the
//! websocket transport and the CLI can report it without matching on variants.

use std::io;

use thiserror::Error;

/// Session-level errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    #[error("Session limit reached: maximum {0} sessions allowed")]
    LimitReached(usize),
    #[error("Session input is closed")]
    InputClosed,
}

impl SessionError {
    /// Returns the wire code used in websocket error results.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "session_not_found",
            SessionError::AlreadyExists(_) => "session_exists",
            SessionError::LimitReached(_) => "session_limit",
            SessionError::InputClosed => "session_closed",
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) => {
                "The session has ended. Open a new console session.".to_string()
            }
            SessionError::AlreadyExists(id) => {
                format!("Session '{}' is still live. Pick a fresh session id.", id)
            }
            SessionError::LimitReached(_) => {
                "Close unused consoles or raise the limit with LIVE_CONSOLE_MAX_SESSIONS.".to_string()
            }
            SessionError::InputClosed => {
                "The console was closed. Reconnect to start a new session.".to_string()
            }
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::LimitReached(_))
    }
}

/// Failure of a transport-specific terminal writer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Terminal client disconnected")]
    Disconnected,
    #[error("Transport write failed: {0}")]
    Transport(String),
}

/// Startup and lifecycle errors of the console host.
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("No usable SSH host keys in {0}")]
    HostKeys(String),
    #[error("Failed to setup signal handler: {0}")]
    SignalSetup(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConsoleError {
    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            ConsoleError::Bind { .. } => {
                "Another process may own the port. Pick another with --ssh-port or --http-listen."
                    .to_string()
            }
            ConsoleError::HostKeys(dir) => format!(
                "Generate a host key, e.g. ssh-keygen -t ed25519 -N '' -f {}/ssh_host_ed25519_key",
                dir
            ),
            ConsoleError::SignalSetup(_) => {
                "Signal handler setup failed. Check system signal configuration.".to_string()
            }
            ConsoleError::Io(_) => "Check file permissions and available resources.".to_string(),
        }
    }

    /// Converts to UNIX sysexits.h-compliant exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConsoleError::Bind { .. } => 69,      // EX_UNAVAILABLE
            ConsoleError::HostKeys(_) => 78,      // EX_CONFIG
            ConsoleError::SignalSetup(_) => 71,   // EX_OSERR
            ConsoleError::Io(_) => 74,            // EX_IOERR
        }
    }
}
