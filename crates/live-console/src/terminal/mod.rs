//! Virtual terminal plumbing shared by every transport.
//!
//! A session's terminal is three pieces: a pipe the transport writes typed
//! text into, an output device that forwards rendered text to the transport,
//! and an application context that knows which interactive application is
//! currently drawing on that pair.

mod app;
mod input;
mod output;

pub use app::{AppBinding, AppSession, Application};
pub use input::{InputReader, PipeInput, create_pipe_input};
pub use output::{ConsoleOutput, NewlineMode, Size, TerminalWriter};
