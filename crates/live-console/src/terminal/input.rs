use std::sync::Mutex;

use live_console_common::mutex_lock_or_recover;
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Creates a connected virtual input pipe.
///
/// The transport holds the [`PipeInput`] and injects text as if it were
/// typed; the REPL runner holds the [`InputReader`].
pub fn create_pipe_input() -> (PipeInput, InputReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PipeInput {
            sender: Mutex::new(Some(tx)),
        },
        InputReader { receiver: rx },
    )
}

/// Write half of the virtual input source.
pub struct PipeInput {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl PipeInput {
    pub fn send_text(&self, data: &str) -> Result<(), SessionError> {
        let sender = mutex_lock_or_recover(&self.sender);
        let sender = sender.as_ref().ok_or(SessionError::InputClosed)?;
        sender
            .send(data.to_string())
            .map_err(|_| SessionError::InputClosed)
    }

    /// Closes the pipe. The reader sees end-of-input once buffered text is
    /// drained. A second call fails with [`SessionError::InputClosed`].
    pub fn close(&self) -> Result<(), SessionError> {
        let mut sender = mutex_lock_or_recover(&self.sender);
        match sender.take() {
            Some(_) => Ok(()),
            None => Err(SessionError::InputClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        mutex_lock_or_recover(&self.sender).is_none()
    }
}

/// Read half of the virtual input source.
pub struct InputReader {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl InputReader {
    /// Waits for the next chunk of input. Returns `None` once the pipe is
    /// closed and drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}
