use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::sync::watch;
use tracing::info;

use crate::error::ConsoleError;

/// Background thread turning SIGINT/SIGTERM into the shutdown signal.
pub struct SignalHandler {
    _handle: JoinHandle<()>,
}

impl SignalHandler {
    pub fn setup(shutdown: watch::Sender<bool>) -> Result<Self, ConsoleError> {
        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| ConsoleError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(signal = sig, "Received signal, initiating graceful shutdown");
                    shutdown.send_replace(true);
                }
            })
            .map_err(|e| {
                ConsoleError::SignalSetup(format!("failed to spawn signal handler: {}", e))
            })?;

        Ok(Self { _handle: handle })
    }
}
