#![deny(clippy::all)]

pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod repl;
pub mod server;
pub mod session;
#[cfg(unix)]
pub mod signal_handler;
pub mod terminal;
pub mod transport;

pub use config::{Cli, Commands, ConsoleConfig};
pub use context::{ConsoleContext, LaunchedSession, PreparedSession, TransportKind};
pub use error::{ConsoleError, SessionError, WriteError};
pub use server::{ConsoleServer, run_serve};
pub use session::{ConsoleSession, SessionGuard, SessionId, SessionRegistry};
