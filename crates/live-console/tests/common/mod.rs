#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use live_console::ConsoleContext;
use live_console::WriteError;
use live_console::terminal::{Application, Size, TerminalWriter};
use live_console::transport::websocket::ConsoleConnection;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation timed out")
}

/// Removes CSI escape sequences so assertions see plain terminal text.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Drives a [`ConsoleConnection`] the way the websocket loop does, with the
/// outbound frames captured on a channel.
pub struct WsHarness {
    pub ctx: Arc<ConsoleContext>,
    pub connection: ConsoleConnection,
    outbound: mpsc::UnboundedReceiver<String>,
    next_id: u64,
}

impl WsHarness {
    pub fn new() -> Self {
        Self::with_context(ConsoleContext::new("test", 16))
    }

    pub fn with_context(ctx: Arc<ConsoleContext>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            connection: ConsoleConnection::new(Arc::clone(&ctx), tx),
            ctx,
            outbound: rx,
            next_id: 1,
        }
    }

    /// Sends `type` with `fields`, returning the request id used.
    pub fn send(&mut self, kind: &str, fields: Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let mut frame = json!({ "id": id, "type": kind });
        if let (Some(frame), Some(fields)) = (frame.as_object_mut(), fields.as_object()) {
            frame.extend(fields.clone());
        }
        self.connection.handle_text(&frame.to_string());
        id
    }

    pub fn create(&mut self, session_id: &str) -> u64 {
        self.send("console/create_session", json!({ "session_id": session_id }))
    }

    pub fn input(&mut self, session_id: &str, data: &str) {
        self.send(
            "console/input",
            json!({ "session_id": session_id, "data": data }),
        );
    }

    pub fn resize(&mut self, session_id: &str, cols: u16, rows: u16) {
        self.send(
            "console/resize",
            json!({ "session_id": session_id, "cols": cols, "rows": rows }),
        );
    }

    pub async fn next_frame(&mut self) -> Value {
        let text = with_timeout(self.outbound.recv())
            .await
            .expect("outbound channel closed");
        serde_json::from_str(&text).expect("outbound frame is JSON")
    }

    /// Waits for the result frame answering request `id`, skipping events.
    pub async fn result_for(&mut self, id: u64) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == "result" && frame["id"] == id {
                return frame;
            }
        }
    }

    /// Collects output events for request `id` until the visible text
    /// contains `needle`. Returns everything collected.
    pub async fn output_until(&mut self, id: u64, needle: &str) -> String {
        let mut collected = String::new();
        while !strip_ansi(&collected).contains(needle) {
            let frame = self.next_frame().await;
            if frame["type"] == "event" && frame["id"] == id {
                collected.push_str(frame["event"].as_str().unwrap_or_default());
            }
        }
        strip_ansi(&collected)
    }

    /// Frames that arrive within the quiet period.
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(text)) = tokio::time::timeout(QUIET_PERIOD, self.outbound.recv()).await {
            frames.push(serde_json::from_str(&text).expect("outbound frame is JSON"));
        }
        frames
    }
}

/// Writer that records everything written to it.
#[derive(Default)]
pub struct RecordingWriter {
    text: Mutex<String>,
}

impl RecordingWriter {
    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }
}

impl TerminalWriter for RecordingWriter {
    fn write(&self, text: &str) -> Result<(), WriteError> {
        self.text.lock().unwrap().push_str(text);
        Ok(())
    }
}

/// Application that records every resize it is asked to handle.
#[derive(Default)]
pub struct RecordingApp {
    sizes: Mutex<Vec<Size>>,
}

impl RecordingApp {
    pub fn sizes(&self) -> Vec<Size> {
        self.sizes.lock().unwrap().clone()
    }
}

impl Application for RecordingApp {
    fn on_resize(&self, size: Size) {
        self.sizes.lock().unwrap().push(size);
    }
}

/// Collects formatted `tracing` output for the current thread while the
/// returned guard lives.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
