use std::borrow::Cow;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use live_console_common::{rwlock_read_or_recover, rwlock_write_or_recover};

use crate::error::WriteError;

pub const DEFAULT_COLS: u16 = 79;
pub const DEFAULT_ROWS: u16 = 20;

/// Viewport size of a virtual terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub rows: u16,
    pub cols: u16,
}

impl Size {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(DEFAULT_COLS, DEFAULT_ROWS)
    }
}

/// Transport-specific sink for terminal output.
pub trait TerminalWriter: Send + Sync {
    fn write(&self, text: &str) -> Result<(), WriteError>;
}

/// Line-ending handling applied before text reaches the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlineMode {
    /// Rewrite bare `\n` as `\r\n` for raw terminals.
    CrLf,
    /// Pass text through; the client does its own line handling.
    Verbatim,
}

/// Terminal output device backed by a [`TerminalWriter`].
pub struct ConsoleOutput {
    writer: Arc<dyn TerminalWriter>,
    newline: NewlineMode,
    size: RwLock<Size>,
    last_was_cr: AtomicBool,
}

impl ConsoleOutput {
    pub fn new(writer: Arc<dyn TerminalWriter>, newline: NewlineMode) -> Self {
        Self::with_size(writer, newline, Size::default())
    }

    pub fn with_size(writer: Arc<dyn TerminalWriter>, newline: NewlineMode, size: Size) -> Self {
        Self {
            writer,
            newline,
            size: RwLock::new(size),
            last_was_cr: AtomicBool::new(false),
        }
    }

    pub fn write(&self, text: &str) -> Result<(), WriteError> {
        if text.is_empty() {
            return Ok(());
        }
        match self.newline {
            NewlineMode::Verbatim => self.writer.write(text),
            NewlineMode::CrLf => {
                let prev_cr = self.last_was_cr.load(Ordering::Acquire);
                let normalized = normalize_crlf(text, prev_cr);
                self.last_was_cr.store(text.ends_with('\r'), Ordering::Release);
                self.writer.write(&normalized)
            }
        }
    }

    /// Nothing is buffered below this layer.
    pub fn flush(&self) -> Result<(), WriteError> {
        Ok(())
    }

    pub fn get_size(&self) -> Size {
        *rwlock_read_or_recover(&self.size)
    }

    pub fn set_size(&self, size: Size) {
        *rwlock_write_or_recover(&self.size) = size;
    }

    pub fn encoding(&self) -> &'static str {
        "utf-8"
    }

    pub fn is_tty(&self) -> bool {
        true
    }

    pub fn newline_mode(&self) -> NewlineMode {
        self.newline
    }
}

fn normalize_crlf(text: &str, prev_cr: bool) -> Cow<'_, str> {
    if !text.contains('\n') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = if prev_cr { '\r' } else { '\0' };
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    Cow::Owned(out)
}
