use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use live_console_common::{rwlock_read_or_recover, rwlock_write_or_recover};

use super::EvalError;
use super::value::{Builtin, HostMethod, Value};
use crate::session::SessionRegistry;

/// Handle to the running host process, exposed to every session as `host`.
///
/// Besides read-only facts about the process it carries a shared key/value
/// store, so one console can leave state for another to inspect.
pub struct HostHandle {
    name: String,
    version: &'static str,
    pid: u32,
    started_at: Instant,
    registry: Arc<SessionRegistry>,
    state: RwLock<BTreeMap<String, Value>>,
}

impl HostHandle {
    pub fn new(name: impl Into<String>, registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION"),
            pid: std::process::id(),
            started_at: Instant::now(),
            registry,
            state: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        rwlock_read_or_recover(&self.state).get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), EvalError> {
        if value.holds_host() {
            return Err(EvalError::Type(
                "the host handle cannot be stored in host state".to_string(),
            ));
        }
        rwlock_write_or_recover(&self.state).insert(key.into(), value);
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        rwlock_read_or_recover(&self.state).keys().cloned().collect()
    }

    pub(crate) fn attribute(self: &Arc<Self>, attr: &str) -> Option<Value> {
        let value = match attr {
            "name" => Value::Str(self.name.clone()),
            "version" => Value::Str(self.version.to_string()),
            "pid" => Value::Int(i64::from(self.pid)),
            "uptime" => Value::Float(self.started_at.elapsed().as_secs_f64()),
            "sessions" => Value::List(
                self.registry
                    .list()
                    .into_iter()
                    .map(|info| Value::Str(info.id.to_string()))
                    .collect(),
            ),
            "get" => Value::HostMethod(Arc::clone(self), HostMethod::Get),
            "set" => Value::HostMethod(Arc::clone(self), HostMethod::Set),
            "keys" => Value::HostMethod(Arc::clone(self), HostMethod::Keys),
            _ => return None,
        };
        Some(value)
    }
}

/// Names visible to code evaluated in one session.
pub struct Namespace {
    vars: HashMap<String, Value>,
}

impl Namespace {
    /// A namespace holding `host` and the builtins.
    pub fn new(host: Arc<HostHandle>) -> Self {
        let mut vars = HashMap::new();
        vars.insert("host".to_string(), Value::Host(host));
        for builtin in Builtin::ALL {
            vars.insert(builtin.name().to_string(), Value::Builtin(builtin));
        }
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
