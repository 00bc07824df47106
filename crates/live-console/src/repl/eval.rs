use std::cmp::Ordering;

use super::EvalError;
use super::highlight;
use super::namespace::Namespace;
use super::syntax::{BinaryOp, Expr, Literal, Statement, UnaryOp};
use super::value::{Builtin, HostMethod, Value, contents_weight};
use crate::terminal::ConsoleOutput;

const MAX_SEQUENCE_LEN: usize = 1 << 20;
const MAX_LIST_NESTING: usize = 64;

const HELP_TEXT: &str = "\
Evaluate expressions against the running process.

  host                 handle to the host process
  host.name, host.version, host.pid, host.uptime, host.sessions
  host.get(key[, default]), host.set(key, value), host.keys()
  print(...)           write values to this console
  reveal(value)        show a value with highlighting
  len, str, repr, int, float, type, help

  name = expr          bind a variable in this session
  exit, quit, Ctrl-D   leave the console
";

#[derive(Debug, Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::I(i64::from(*b))),
            Value::Int(i) => Some(Num::I(*i)),
            Value::Float(f) => Some(Num::F(*f)),
            _ => None,
        }
    }

    fn f(self) -> f64 {
        match self {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }
}

/// Evaluates statements against a session namespace, writing any side
/// output (`print`, `reveal`, `help`) to the session's terminal.
pub struct Evaluator<'a> {
    namespace: &'a mut Namespace,
    output: &'a ConsoleOutput,
    color: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(namespace: &'a mut Namespace, output: &'a ConsoleOutput) -> Self {
        let color = output.is_tty();
        Self {
            namespace,
            output,
            color,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Runs one statement. Returns the value to echo, if any.
    pub fn execute(&mut self, statement: &Statement) -> Result<Option<Value>, EvalError> {
        match statement {
            Statement::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.namespace.set(name.clone(), value);
                Ok(None)
            }
            Statement::Expr(expr) => {
                let value = self.eval(expr)?;
                if matches!(value, Value::None) {
                    return Ok(None);
                }
                self.namespace.set("_", value.clone());
                Ok(Some(value))
            }
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => self
                .namespace
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Name(name.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                check_list(&values)?;
                Ok(Value::List(values))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                subscript(target, index)
            }
            Expr::Attr(target, attr) => {
                let target = self.eval(target)?;
                match &target {
                    Value::Host(host) => host.attribute(attr).ok_or_else(|| {
                        EvalError::Attribute(format!("'host' object has no attribute '{}'", attr))
                    }),
                    other => Err(EvalError::Attribute(format!(
                        "'{}' object has no attribute '{}'",
                        other.type_name(),
                        attr
                    ))),
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match callee {
            Value::Builtin(builtin) => self.call_builtin(builtin, args),
            Value::HostMethod(host, method) => match method {
                HostMethod::Get => {
                    let (key, default) = match args.as_slice() {
                        [key] => (key, Value::None),
                        [key, default] => (key, default.clone()),
                        _ => return Err(arity("get", "1 or 2", args.len())),
                    };
                    Ok(host.get(&key_string(key)?).unwrap_or(default))
                }
                HostMethod::Set => match args.as_slice() {
                    [key, value] => {
                        host.set(key_string(key)?, value.clone())?;
                        Ok(Value::None)
                    }
                    _ => Err(arity("set", "2", args.len())),
                },
                HostMethod::Keys => {
                    if !args.is_empty() {
                        return Err(arity("keys", "0", args.len()));
                    }
                    Ok(Value::List(host.keys().into_iter().map(Value::Str).collect()))
                }
            },
            other => Err(EvalError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
        match builtin {
            Builtin::Print => {
                let line: Vec<String> = args.iter().map(Value::to_string).collect();
                self.output.write(&format!("{}\n", line.join(" ")))?;
                Ok(Value::None)
            }
            Builtin::Reveal => {
                let value = single(builtin, args)?;
                let shown = highlight::paint_value(&value, self.color);
                self.output.write(&format!("{}\n", shown))?;
                Ok(Value::None)
            }
            Builtin::Help => {
                if !args.is_empty() {
                    return Err(arity("help", "0", args.len()));
                }
                self.output.write(HELP_TEXT)?;
                Ok(Value::None)
            }
            Builtin::Len => match single(builtin, args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(EvalError::Type(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            Builtin::Str => {
                if args.is_empty() {
                    return Ok(Value::Str(String::new()));
                }
                Ok(Value::Str(single(builtin, args)?.to_string()))
            }
            Builtin::Repr => Ok(Value::Str(single(builtin, args)?.repr())),
            Builtin::Type => Ok(Value::Str(single(builtin, args)?.type_name().to_string())),
            Builtin::Int => match single(builtin, args)? {
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => {
                    if !f.is_finite() || f.abs() >= 9.2e18 {
                        return Err(EvalError::Overflow);
                    }
                    Ok(Value::Int(f.trunc() as i64))
                }
                Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    EvalError::Value(format!("invalid literal for int(): {}", Value::Str(s).repr()))
                }),
                other => Err(EvalError::Type(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            },
            Builtin::Float => match single(builtin, args)? {
                Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    EvalError::Value(format!(
                        "could not convert string to float: {}",
                        Value::Str(s).repr()
                    ))
                }),
                other => Num::of(&other)
                    .map(|n| Value::Float(n.f()))
                    .ok_or_else(|| {
                        EvalError::Type(format!(
                            "float() argument must be a string or a number, not '{}'",
                            other.type_name()
                        ))
                    }),
            },
        }
    }
}

fn arity(name: &str, expected: &str, given: usize) -> EvalError {
    EvalError::Type(format!(
        "{}() takes {} argument(s) ({} given)",
        name, expected, given
    ))
}

fn single(builtin: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
    let given = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(arity(builtin.name(), "exactly 1", given)),
    }
}

fn key_string(key: &Value) -> Result<String, EvalError> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvalError::Type(format!(
            "host state keys must be str, not '{}'",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!value.is_truthy()));
    }
    let num = Num::of(&value).ok_or_else(|| {
        let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
        EvalError::Type(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            value.type_name()
        ))
    })?;
    Ok(match (op, num) {
        (UnaryOp::Neg, Num::I(i)) => Value::Int(i.checked_neg().ok_or(EvalError::Overflow)?),
        (UnaryOp::Neg, Num::F(f)) => Value::Float(-f),
        (_, Num::I(i)) => Value::Int(i),
        (_, Num::F(f)) => Value::Float(f),
    })
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                EvalError::Type(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, &left, &right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            check_len(contents_weight(a).saturating_add(contents_weight(b)))?;
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            return Ok(Value::List(joined));
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s))
            if n.as_i64().is_some() =>
        {
            let times = repeat_count(n, s.len())?;
            return Ok(Value::Str(s.repeat(times)));
        }
        (BinaryOp::Mul, Value::List(items), n) | (BinaryOp::Mul, n, Value::List(items))
            if n.as_i64().is_some() =>
        {
            let times = repeat_count(n, contents_weight(items))?;
            let mut repeated = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                repeated.extend(items.iter().cloned());
            }
            return Ok(Value::List(repeated));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(&left), Num::of(&right)) else {
        return Err(unsupported(op, &left, &right));
    };

    match (a, b) {
        (Num::I(x), Num::I(y)) => int_arith(op, x, y),
        _ => float_arith(op, a.f(), b.f()),
    }
}

fn check_len(len: usize) -> Result<(), EvalError> {
    if len > MAX_SEQUENCE_LEN {
        return Err(EvalError::Overflow);
    }
    Ok(())
}

/// A new list literal may not nest deeper than the limit nor hold more
/// than the sequence limit in total.
fn check_list(items: &[Value]) -> Result<(), EvalError> {
    check_len(contents_weight(items))?;
    let nesting = 1 + items.iter().map(Value::nesting).max().unwrap_or(0);
    if nesting > MAX_LIST_NESTING {
        return Err(EvalError::Value("list nested too deeply".to_string()));
    }
    Ok(())
}

fn repeat_count(n: &Value, unit: usize) -> Result<usize, EvalError> {
    if unit == 0 {
        return Ok(0);
    }
    let times = usize::try_from(n.as_i64().unwrap_or(0).max(0)).map_err(|_| EvalError::Overflow)?;
    check_len(unit.checked_mul(times).ok_or(EvalError::Overflow)?)?;
    Ok(times)
}

fn int_arith(op: BinaryOp, x: i64, y: i64) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Add => Value::Int(x.checked_add(y).ok_or(EvalError::Overflow)?),
        BinaryOp::Sub => Value::Int(x.checked_sub(y).ok_or(EvalError::Overflow)?),
        BinaryOp::Mul => Value::Int(x.checked_mul(y).ok_or(EvalError::Overflow)?),
        BinaryOp::Div => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            Value::Float(x as f64 / y as f64)
        }
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = x.checked_div(y).ok_or(EvalError::Overflow)?;
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Value::Int(if adjust { q - 1 } else { q })
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = x.wrapping_rem(y);
            Value::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
        BinaryOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(EvalError::ZeroDivision);
                }
                Value::Float((x as f64).powf(y as f64))
            } else {
                let exp = u32::try_from(y).map_err(|_| EvalError::Overflow)?;
                Value::Int(x.checked_pow(exp).ok_or(EvalError::Overflow)?)
            }
        }
        _ => unreachable!("comparison operators are handled before arithmetic"),
    };
    Ok(value)
}

fn float_arith(op: BinaryOp, x: f64, y: f64) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            x.powf(y)
        }
        _ => unreachable!("comparison operators are handled before arithmetic"),
    };
    Ok(Value::Float(value))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (Num::of(left)?, Num::of(right)?);
            a.f().partial_cmp(&b.f())
        }
    }
}

fn subscript(target: Value, index: Value) -> Result<Value, EvalError> {
    let Some(i) = index.as_i64() else {
        return Err(EvalError::Type(format!(
            "indices must be integers, not '{}'",
            index.type_name()
        )));
    };
    let resolve = |len: usize| -> Option<usize> {
        let len = i64::try_from(len).ok()?;
        let idx = if i < 0 { i.checked_add(len)? } else { i };
        if (0..len).contains(&idx) {
            usize::try_from(idx).ok()
        } else {
            None
        }
    };
    match target {
        Value::List(items) => resolve(items.len())
            .map(|idx| items[idx].clone())
            .ok_or_else(|| EvalError::Index("list index out of range".to_string())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|idx| Value::Str(chars[idx].to_string()))
                .ok_or_else(|| EvalError::Index("string index out of range".to_string()))
        }
        other => Err(EvalError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
