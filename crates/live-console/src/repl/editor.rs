//! Minimal line editor driven by raw terminal bytes.

use unicode_width::UnicodeWidthChar;

use super::highlight::highlight_line;
use crate::terminal::Size;

const MAX_HISTORY: usize = 500;
const TAB_WIDTH: usize = 4;

/// A decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    /// Control chord, stored as the lowercase letter (`Ctrl('c')`).
    Ctrl(char),
    Unknown,
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Normal,
    Esc,
    Csi(String),
    Ss3,
}

/// Splits raw input into keys. Escape sequences may arrive split across
/// chunks; the decoder carries partial state between calls.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: DecodeState,
    last_was_cr: bool,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, data: &str) -> Vec<Key> {
        let mut keys = Vec::new();
        for c in data.chars() {
            self.push(c, &mut keys);
        }
        keys
    }

    fn push(&mut self, c: char, keys: &mut Vec<Key>) {
        match std::mem::take(&mut self.state) {
            DecodeState::Normal => self.normal(c, keys),
            DecodeState::Esc => match c {
                '[' => self.state = DecodeState::Csi(String::new()),
                'O' => self.state = DecodeState::Ss3,
                _ => {
                    keys.push(Key::Unknown);
                    self.normal(c, keys);
                }
            },
            DecodeState::Csi(mut params) => {
                if ('\x40'..='\x7e').contains(&c) {
                    keys.push(csi_key(&params, c));
                } else {
                    params.push(c);
                    self.state = DecodeState::Csi(params);
                }
            }
            DecodeState::Ss3 => keys.push(csi_key("", c)),
        }
    }

    fn normal(&mut self, c: char, keys: &mut Vec<Key>) {
        let was_cr = std::mem::replace(&mut self.last_was_cr, c == '\r');
        let key = match c {
            '\r' => Key::Enter,
            '\n' if was_cr => return,
            '\n' => Key::Enter,
            '\t' => Key::Tab,
            '\x7f' | '\x08' => Key::Backspace,
            '\x1b' => {
                self.state = DecodeState::Esc;
                return;
            }
            '\x01'..='\x1a' => Key::Ctrl(char::from(c as u8 - 1 + b'a')),
            c if c.is_control() => Key::Unknown,
            c => Key::Char(c),
        };
        keys.push(key);
    }
}

fn csi_key(params: &str, final_byte: char) -> Key {
    match (params, final_byte) {
        (_, 'A') => Key::Up,
        (_, 'B') => Key::Down,
        (_, 'C') => Key::Right,
        (_, 'D') => Key::Left,
        (_, 'H') | ("1" | "7", '~') => Key::Home,
        (_, 'F') | ("4" | "8", '~') => Key::End,
        ("3", '~') => Key::Delete,
        _ => Key::Unknown,
    }
}

/// What the caller should do after a key was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEvent {
    Nothing,
    Redraw,
    Submit(String),
    Interrupt,
    EndOfInput,
    ClearScreen,
}

/// Single-line buffer with cursor, history and horizontal scrolling.
#[derive(Debug)]
pub struct LineEditor {
    prompt: String,
    buffer: Vec<char>,
    cursor: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    draft: Vec<char>,
}

impl LineEditor {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            buffer: Vec::new(),
            cursor: 0,
            history: Vec::new(),
            history_pos: None,
            draft: Vec::new(),
        }
    }

    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn handle_key(&mut self, key: Key) -> EditEvent {
        match key {
            Key::Char(c) => {
                self.insert(c);
                EditEvent::Redraw
            }
            Key::Tab => {
                for _ in 0..TAB_WIDTH {
                    self.insert(' ');
                }
                EditEvent::Redraw
            }
            Key::Enter => EditEvent::Submit(self.submit()),
            Key::Backspace | Key::Ctrl('h') => {
                if self.cursor == 0 {
                    return EditEvent::Nothing;
                }
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
                EditEvent::Redraw
            }
            Key::Delete => self.delete_forward(),
            Key::Left | Key::Ctrl('b') => self.move_to(self.cursor.saturating_sub(1)),
            Key::Right | Key::Ctrl('f') => self.move_to((self.cursor + 1).min(self.buffer.len())),
            Key::Home | Key::Ctrl('a') => self.move_to(0),
            Key::End | Key::Ctrl('e') => self.move_to(self.buffer.len()),
            Key::Up | Key::Ctrl('p') => self.history_prev(),
            Key::Down | Key::Ctrl('n') => self.history_next(),
            Key::Ctrl('k') => {
                self.buffer.truncate(self.cursor);
                EditEvent::Redraw
            }
            Key::Ctrl('u') => {
                self.buffer.drain(..self.cursor);
                self.cursor = 0;
                EditEvent::Redraw
            }
            Key::Ctrl('w') => {
                let mut start = self.cursor;
                while start > 0 && self.buffer[start - 1] == ' ' {
                    start -= 1;
                }
                while start > 0 && self.buffer[start - 1] != ' ' {
                    start -= 1;
                }
                self.buffer.drain(start..self.cursor);
                self.cursor = start;
                EditEvent::Redraw
            }
            Key::Ctrl('c') => {
                self.reset();
                EditEvent::Interrupt
            }
            Key::Ctrl('d') => {
                if self.buffer.is_empty() {
                    EditEvent::EndOfInput
                } else {
                    self.delete_forward()
                }
            }
            Key::Ctrl('l') => EditEvent::ClearScreen,
            Key::Ctrl(_) | Key::Unknown => EditEvent::Nothing,
        }
    }

    /// Redraws the prompt line for a terminal of `size`. When the line is
    /// wider than the viewport only the window around the cursor is shown.
    pub fn render(&self, size: Size, color: bool) -> String {
        let prompt_width = str_width(&self.prompt);
        let available = usize::from(size.cols)
            .saturating_sub(prompt_width + 1)
            .max(1);

        let mut start = self.cursor;
        let mut before = 0;
        while start > 0 {
            let w = char_width(self.buffer[start - 1]);
            if before + w > available {
                break;
            }
            before += w;
            start -= 1;
        }
        let mut end = start;
        let mut used = 0;
        while end < self.buffer.len() {
            let w = char_width(self.buffer[end]);
            if used + w > available {
                break;
            }
            used += w;
            end += 1;
        }

        let visible: String = self.buffer[start..end].iter().collect();
        let column = prompt_width + before;
        let mut out = format!(
            "\r\x1b[K{}{}\r",
            self.prompt,
            highlight_line(&visible, color)
        );
        if column > 0 {
            out.push_str(&format!("\x1b[{}C", column));
        }
        out
    }

    fn insert(&mut self, c: char) {
        self.buffer.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn delete_forward(&mut self) -> EditEvent {
        if self.cursor >= self.buffer.len() {
            return EditEvent::Nothing;
        }
        self.buffer.remove(self.cursor);
        EditEvent::Redraw
    }

    fn move_to(&mut self, cursor: usize) -> EditEvent {
        if cursor == self.cursor {
            return EditEvent::Nothing;
        }
        self.cursor = cursor;
        EditEvent::Redraw
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.history_pos = None;
        self.draft.clear();
    }

    fn submit(&mut self) -> String {
        let line = self.line();
        if !line.trim().is_empty() && self.history.last() != Some(&line) {
            self.history.push(line.clone());
            if self.history.len() > MAX_HISTORY {
                self.history.remove(0);
            }
        }
        self.reset();
        line
    }

    fn load(&mut self, chars: Vec<char>) -> EditEvent {
        self.buffer = chars;
        self.cursor = self.buffer.len();
        EditEvent::Redraw
    }

    fn history_prev(&mut self) -> EditEvent {
        let pos = match self.history_pos {
            None if self.history.is_empty() => return EditEvent::Nothing,
            None => {
                self.draft = self.buffer.clone();
                self.history.len() - 1
            }
            Some(0) => return EditEvent::Nothing,
            Some(pos) => pos - 1,
        };
        self.history_pos = Some(pos);
        self.load(self.history[pos].chars().collect())
    }

    fn history_next(&mut self) -> EditEvent {
        let Some(pos) = self.history_pos else {
            return EditEvent::Nothing;
        };
        if pos + 1 < self.history.len() {
            self.history_pos = Some(pos + 1);
            self.load(self.history[pos + 1].chars().collect())
        } else {
            self.history_pos = None;
            let draft = std::mem::take(&mut self.draft);
            self.load(draft)
        }
    }
}

fn char_width(c: char) -> usize {
    c.width().unwrap_or(0)
}

fn str_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}
