//! WARDEN Sandboxed Lua VM
//!
//! Embeds an untrusted Lua 5.4 guest inside a trusted host process and
//! constrains it along three axes: memory consumption, computation
//! quantity, and reachable capability surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod bridge;
pub mod callbacks;
pub mod env;
pub mod error;
pub mod governor;
pub mod vm;

pub use account::{AccountError, MemoryAccount};
pub use bridge::HostValue;
pub use callbacks::{CallbackError, CallbackTable, HostFn};
pub use error::{VmError, VmResult};
pub use governor::{BudgetError, ExecutionBudget};
pub use vm::{Vm, VmConfig, DEFAULT_MEMORY_LIMIT};
