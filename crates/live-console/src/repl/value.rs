use std::fmt;
use std::sync::Arc;

use super::namespace::HostHandle;

/// Functions available in every session's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Reveal,
    Len,
    Str,
    Repr,
    Int,
    Float,
    Type,
    Help,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::Print,
        Builtin::Reveal,
        Builtin::Len,
        Builtin::Str,
        Builtin::Repr,
        Builtin::Int,
        Builtin::Float,
        Builtin::Type,
        Builtin::Help,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Reveal => "reveal",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Repr => "repr",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Type => "type",
            Builtin::Help => "help",
        }
    }
}

/// Methods callable on the host handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMethod {
    Get,
    Set,
    Keys,
}

impl HostMethod {
    pub fn name(self) -> &'static str {
        match self {
            HostMethod::Get => "get",
            HostMethod::Set => "set",
            HostMethod::Keys => "keys",
        }
    }
}

/// A runtime value of the console language.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Builtin(Builtin),
    Host(Arc<HostHandle>),
    HostMethod(Arc<HostHandle>, HostMethod),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Builtin(_) | Value::HostMethod(..) => "builtin_function",
            Value::Host(_) => "host",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Builtin(_) | Value::Host(_) | Value::HostMethod(..) => true,
        }
    }

    /// Numeric view used by arithmetic; bools count as integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements held by this value with nested lists counted in full and
    /// strings counted by byte length.
    pub fn weight(&self) -> usize {
        match self {
            Value::Str(s) => s.len().max(1),
            Value::List(items) => contents_weight(items).saturating_add(1),
            _ => 1,
        }
    }

    /// Levels of list nesting; scalars are 0.
    pub fn nesting(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.iter().map(Value::nesting).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Whether the host handle, or a method bound to it, appears anywhere
    /// inside this value.
    pub fn holds_host(&self) -> bool {
        match self {
            Value::Host(_) | Value::HostMethod(..) => true,
            Value::List(items) => items.iter().any(Value::holds_host),
            _ => false,
        }
    }

    /// The form shown when a value is echoed or passed to `repr`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) => write!(f, "{}", self.repr()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Host(host) => write!(f, "<host {} pid={}>", host.name(), host.pid()),
            Value::HostMethod(_, m) => write!(f, "<bound method host.{}>", m.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(a, b),
            (Value::HostMethod(a, m), Value::HostMethod(b, n)) => Arc::ptr_eq(a, b) && m == n,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

/// Combined weight of a list's elements.
pub fn contents_weight(items: &[Value]) -> usize {
    items
        .iter()
        .fold(0usize, |total, item| total.saturating_add(item.weight()))
}

pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
