//! Sandboxed VM instances.

use crate::account::MemoryAccount;
use crate::bridge::HostValue;
use crate::callbacks::{self, CallbackTable, HostFn};
use crate::env;
use crate::error::{VmError, VmResult};
use crate::governor::{ExecutionBudget, INSTRUCTION_GRANULARITY};
use mlua::{HookTriggers, IntoLua, Lua, MultiValue, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Default guest memory cap: 5 MiB
pub const DEFAULT_MEMORY_LIMIT: usize = 5 * 1024 * 1024;

/// VM construction configuration
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Guest memory cap in bytes; must be nonzero
    pub memory_limit: usize,
    /// Instruction budget per invocation; zero means unbounded
    pub instruction_limit: u64,
    /// Host functions exposed to the guest as globals
    pub callbacks: CallbackTable,
}

impl VmConfig {
    /// Create a config with defaults: 5 MiB, unbounded execution, no
    /// callbacks
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            instruction_limit: 0,
            callbacks: CallbackTable::new(),
        }
    }

    /// Set the guest memory cap in bytes
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set the instruction budget per invocation
    #[must_use]
    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = limit;
        self
    }

    /// Replace the callback table
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: CallbackTable) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Register a single callback
    #[must_use]
    pub fn with_callback(mut self, name: impl Into<String>, func: HostFn) -> Self {
        self.callbacks.register(name, func);
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One isolated guest interpreter plus its accounting and capability
/// state.
///
/// A `Vm` is not internally synchronized: every top-level operation takes
/// `&mut self`, so callers serialize invocations per instance, and
/// re-entering a VM from inside one of its own host callbacks is not
/// expressible in safe code. Independent instances share nothing and may
/// run concurrently on separate threads.
pub struct Vm {
    /// The guest interpreter; `None` once closed
    lua: Option<Lua>,
    /// Guest memory accounting
    account: MemoryAccount,
    /// Instruction budget, shared with the governor hook
    budget: Arc<Mutex<ExecutionBudget>>,
    /// Registered host functions, kept alive for the VM lifetime
    callbacks: CallbackTable,
    /// Interpreter bytes in use when construction finished; guest-owned
    /// usage is measured above this watermark
    baseline_memory: usize,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("open", &self.lua.is_some())
            .field("account", &self.account)
            .field("budget", &self.budget)
            .field("callbacks", &self.callbacks.names().collect::<Vec<_>>())
            .field("baseline_memory", &self.baseline_memory)
            .finish()
    }
}

impl Vm {
    /// Construct a sandboxed VM.
    ///
    /// Creates the guest state with only the permitted standard modules,
    /// applies the environment sandbox, registers host callbacks last,
    /// and installs the guest memory cap.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Construction`] on bad configuration or
    /// interpreter-init failure
    pub fn new(config: VmConfig) -> VmResult<Self> {
        if config.memory_limit == 0 {
            return Err(VmError::construction("memory_limit must be nonzero"));
        }
        if config.callbacks.names().any(str::is_empty) {
            return Err(VmError::construction("callback names must not be empty"));
        }

        let lua = env::new_state().map_err(VmError::construction)?;
        env::apply(&lua).map_err(VmError::construction)?;
        callbacks::install(&lua, &config.callbacks).map_err(VmError::construction)?;

        // The sandbox environment itself is host overhead; the guest gets
        // memory_limit bytes above this watermark.
        let baseline_memory = lua.used_memory();
        let cap = baseline_memory
            .checked_add(config.memory_limit)
            .ok_or_else(|| VmError::construction("memory_limit overflows the interpreter cap"))?;
        lua.set_memory_limit(cap).map_err(VmError::construction)?;

        tracing::debug!(
            memory_limit = config.memory_limit,
            instruction_limit = config.instruction_limit,
            callbacks = config.callbacks.len(),
            baseline_memory,
            "constructed sandboxed VM"
        );

        Ok(Self {
            lua: Some(lua),
            account: MemoryAccount::new(config.memory_limit),
            budget: Arc::new(Mutex::new(ExecutionBudget::new(config.instruction_limit))),
            callbacks: config.callbacks,
            baseline_memory,
        })
    }

    /// Execute a script in the guest.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Guest`] for guest failures,
    /// [`VmError::InstructionLimit`] for governor aborts,
    /// [`VmError::Closed`] on a closed VM
    pub fn execute(&mut self, script: &str) -> VmResult<()> {
        let lua = self.lua.as_ref().ok_or(VmError::Closed)?;

        Self::arm_governor(lua, &self.budget);
        let result = lua.load(script).exec();
        lua.remove_hook();
        self.account
            .reconcile(lua.used_memory().saturating_sub(self.baseline_memory));

        result.map_err(|err| self.classify(&err))
    }

    /// Call a global guest function with positional arguments and return
    /// its single result.
    ///
    /// Additional guest return values are dropped; a guest function
    /// returning nothing yields [`HostValue::Nil`].
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Argument`] for an empty name, [`VmError::Guest`]
    /// when the global is not a function or the guest fails,
    /// [`VmError::InstructionLimit`] for governor aborts,
    /// [`VmError::Closed`] on a closed VM
    pub fn call(&mut self, name: &str, args: &[HostValue]) -> VmResult<HostValue> {
        let lua = self.lua.as_ref().ok_or(VmError::Closed)?;
        if name.is_empty() {
            return Err(VmError::argument("function name must not be empty"));
        }

        let target: Value = lua
            .globals()
            .get(name)
            .map_err(|err| VmError::from_guest(&err))?;
        let Value::Function(func) = target else {
            return Err(VmError::Guest {
                message: format!("global '{name}' is not a function"),
            });
        };

        let mut guest_args = Vec::with_capacity(args.len());
        for value in args {
            guest_args.push(
                value
                    .clone()
                    .into_lua(lua)
                    .map_err(|err| VmError::from_guest(&err))?,
            );
        }

        Self::arm_governor(lua, &self.budget);
        let result = func.call::<_, HostValue>(MultiValue::from_vec(guest_args));
        lua.remove_hook();
        self.account
            .reconcile(lua.used_memory().saturating_sub(self.baseline_memory));

        result.map_err(|err| self.classify(&err))
    }

    /// Whether a global guest function exists under `name`.
    ///
    /// Never fails; returns `false` on a closed VM.
    #[must_use]
    pub fn function_exists(&self, name: &str) -> bool {
        let Some(lua) = self.lua.as_ref() else {
            return false;
        };
        matches!(lua.globals().get::<_, Value>(name), Ok(Value::Function(_)))
    }

    /// Close the VM, releasing the guest interpreter.
    ///
    /// Idempotent; every subsequent operation fails with
    /// [`VmError::Closed`].
    pub fn close(&mut self) {
        if let Some(lua) = self.lua.take() {
            drop(lua);
            tracing::debug!("closed VM");
        }
    }

    /// Whether the VM has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lua.is_none()
    }

    /// The guest memory cap in bytes
    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.account.max_memory()
    }

    /// Guest-owned bytes observed after the most recent invocation
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.account.total_allocated()
    }

    /// The instruction budget per invocation; zero means unbounded
    #[must_use]
    pub fn instruction_limit(&self) -> u64 {
        self.budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .instruction_limit()
    }

    /// The registered host callbacks
    #[must_use]
    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Reset the budget and arm the governor hook for one invocation.
    ///
    /// An unbounded budget removes the hook entirely so unlimited
    /// execution carries no governor overhead.
    fn arm_governor(lua: &Lua, budget: &Arc<Mutex<ExecutionBudget>>) {
        let bounded = {
            let mut budget = budget.lock().unwrap_or_else(PoisonError::into_inner);
            budget.reset();
            budget.is_bounded()
        };
        if bounded {
            let budget = Arc::clone(budget);
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(INSTRUCTION_GRANULARITY),
                move |_, _| {
                    budget
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .charge(u64::from(INSTRUCTION_GRANULARITY))
                        .map_err(|err| mlua::Error::RuntimeError(err.to_string()))
                },
            );
        } else {
            lua.remove_hook();
        }
    }

    /// Map an invocation failure to the boundary taxonomy, surfacing a
    /// tripped budget as the distinguished limit error.
    fn classify(&self, err: &mlua::Error) -> VmError {
        let budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);
        if budget.is_exhausted() {
            let limit = budget.instruction_limit();
            tracing::debug!(limit, "guest execution aborted by instruction budget");
            return VmError::InstructionLimit { limit };
        }
        VmError::from_guest(err)
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.close();
    }
}
