//! Host functions exposed to the guest as global callables.

use crate::bridge::HostValue;
use mlua::{Lua, Variadic};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Host function that can be called from guest code
pub type HostFn = Arc<dyn Fn(&[HostValue]) -> Result<HostValue, CallbackError> + Send + Sync>;

/// Failure raised by a host callback.
///
/// Caught at the dispatch boundary and surfaced to the guest as a generic
/// runtime error; it never escapes as a host-side panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    /// Human-readable failure description
    message: String,
}

impl CallbackError {
    /// Create a new callback failure
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Named host functions registered with a VM.
///
/// Entries are kept alive for the full VM lifetime; the installed guest
/// thunks hold reference-counted clones of the same functions.
#[derive(Clone, Default)]
pub struct CallbackTable {
    entries: BTreeMap<String, HostFn>,
}

impl CallbackTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a host function under a global name, replacing any
    /// previous entry of the same name
    pub fn register(&mut self, name: impl Into<String>, func: HostFn) {
        self.entries.insert(name.into(), func);
    }

    /// Look up a function by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostFn> {
        self.entries.get(name)
    }

    /// Whether a function is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, in deterministic order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &HostFn)> {
        self.entries.iter()
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Install every registered callback as a guest-global callable.
///
/// Runs after the environment sandbox so the thunks survive filtering and
/// cannot be clobbered by library loading.
pub(crate) fn install(lua: &Lua, table: &CallbackTable) -> mlua::Result<()> {
    let globals = lua.globals();
    for (name, func) in table.entries() {
        let func = Arc::clone(func);
        let callback_name = name.clone();
        let thunk = lua.create_function(move |_, args: Variadic<HostValue>| {
            match func(&args) {
                Ok(value) => Ok(value),
                Err(err) => {
                    tracing::warn!(callback = %callback_name, error = %err, "host callback failed");
                    Err(mlua::Error::RuntimeError(format!(
                        "host callback '{callback_name}' failed: {err}"
                    )))
                }
            }
        })?;
        globals.set(name.as_str(), thunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn adder() -> HostFn {
        Arc::new(|args| match args {
            [HostValue::Int(a), HostValue::Int(b)] => Ok(HostValue::Int(a + b)),
            _ => Err(CallbackError::new("add expects two integers")),
        })
    }

    #[test]
    fn test_table_register_and_lookup() {
        let mut table = CallbackTable::new();
        assert!(table.is_empty());
        table.register("add", adder());
        assert!(table.contains("add"));
        assert!(table.get("add").is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["add"]);
    }

    #[test]
    fn test_table_debug_lists_names() {
        let mut table = CallbackTable::new();
        table.register("add", adder());
        assert_eq!(format!("{table:?}"), "[\"add\"]");
    }

    #[test]
    fn test_install_exposes_global_callable() {
        let lua = Lua::new();
        let mut table = CallbackTable::new();
        table.register("add", adder());
        install(&lua, &table).unwrap();
        let sum: i64 = lua.load("return add(2, 3)").eval().unwrap();
        assert_eq!(sum, 5);
    }

    #[test]
    fn test_arguments_arrive_in_order() {
        let lua = Lua::new();
        let seen: Arc<Mutex<Vec<HostValue>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = Arc::clone(&seen);
        let mut table = CallbackTable::new();
        table.register(
            "record",
            Arc::new(move |args: &[HostValue]| {
                seen_in_callback.lock().unwrap().extend_from_slice(args);
                Ok(HostValue::Nil)
            }),
        );
        install(&lua, &table).unwrap();
        lua.load("record(2, 3)").exec().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![HostValue::Int(2), HostValue::Int(3)]
        );
    }

    #[test]
    fn test_failure_surfaces_as_guest_runtime_error() {
        let lua = Lua::new();
        let mut table = CallbackTable::new();
        table.register("boom", Arc::new(|_: &[HostValue]| Err(CallbackError::new("refused"))));
        install(&lua, &table).unwrap();
        let err = lua.load("boom()").exec().unwrap_err();
        assert!(format!("{err:?}").contains("host callback 'boom' failed: refused"));
    }

    #[test]
    fn test_guest_can_recover_failure() {
        let lua = Lua::new();
        let mut table = CallbackTable::new();
        table.register("boom", Arc::new(|_: &[HostValue]| Err(CallbackError::new("refused"))));
        install(&lua, &table).unwrap();
        let recovered: bool = lua.load("return not pcall(boom)").eval().unwrap();
        assert!(recovered);
    }

    #[test]
    fn test_callback_error_display() {
        let err = CallbackError::new("bad input");
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(err.message(), "bad input");
    }
}
