//! ANSI colouring for echoed values and the line being edited.

use super::value::Value;

const RESET: &str = "\x1b[0m";
const NUMBER: &str = "\x1b[36m";
const STRING: &str = "\x1b[32m";
const KEYWORD: &str = "\x1b[35m";
const ERROR: &str = "\x1b[31m";

const KEYWORDS: [&str; 6] = ["and", "or", "not", "True", "False", "None"];

fn paint(out: &mut String, style: &str, text: &str) {
    out.push_str(style);
    out.push_str(text);
    out.push_str(RESET);
}

pub fn paint_value(value: &Value, color: bool) -> String {
    if !color {
        return value.repr();
    }
    let mut out = String::new();
    paint_into(&mut out, value);
    out
}

fn paint_into(out: &mut String, value: &Value) {
    match value {
        Value::Int(_) | Value::Float(_) => paint(out, NUMBER, &value.repr()),
        Value::Str(_) => paint(out, STRING, &value.repr()),
        Value::None | Value::Bool(_) => paint(out, KEYWORD, &value.repr()),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                paint_into(out, item);
            }
            out.push(']');
        }
        other => out.push_str(&other.repr()),
    }
}

pub fn paint_error(message: &str, color: bool) -> String {
    if color {
        format!("{}error:{} {}", ERROR, RESET, message)
    } else {
        format!("error: {}", message)
    }
}

/// Colours numbers, string literals and keywords in `line`. Only escape
/// sequences are inserted, so the visible text is unchanged.
pub fn highlight_line(line: &str, color: bool) -> String {
    if !color {
        return line.to_string();
    }
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            let text: String = chars[start..i].iter().collect();
            paint(&mut out, STRING, &text);
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            paint(&mut out, NUMBER, &text);
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if KEYWORDS.contains(&text.as_str()) {
                paint(&mut out, KEYWORD, &text);
            } else {
                out.push_str(&text);
            }
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Removes CSI sequences, leaving only visible text.
#[cfg(test)]
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
