//! Boundary error taxonomy.

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

/// Errors crossing the host boundary.
///
/// Every variant carries a human-readable message, and the kinds stay
/// distinguishable: a governor abort is never reported as a generic guest
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// Bad configuration or interpreter-init failure
    #[error("Construction failed: {reason}")]
    Construction {
        /// What was wrong
        reason: String,
    },

    /// Invalid argument at the host boundary
    #[error("Invalid argument: {reason}")]
    Argument {
        /// What was wrong
        reason: String,
    },

    /// Guest-raised error, syntax error, or guest memory exhaustion
    #[error("Guest error: {message}")]
    Guest {
        /// Message from the guest's error path
        message: String,
    },

    /// Governor abort: the instruction budget was exceeded
    #[error("Instruction limit exceeded: budget {limit}")]
    InstructionLimit {
        /// The configured instruction budget
        limit: u64,
    },

    /// Operation on a closed VM
    #[error("VM is closed")]
    Closed,
}

impl VmError {
    pub(crate) fn construction(err: impl std::fmt::Display) -> Self {
        Self::Construction {
            reason: err.to_string(),
        }
    }

    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        Self::Argument {
            reason: reason.into(),
        }
    }

    /// Map an interpreter error unwinding out of guest execution to the
    /// boundary taxonomy, flattening dispatch wrappers down to the root
    /// message.
    pub(crate) fn from_guest(err: &mlua::Error) -> Self {
        match err {
            mlua::Error::CallbackError { cause, .. } => Self::from_guest(cause),
            mlua::Error::MemoryError(message) => Self::Guest {
                message: format!("memory exhausted: {message}"),
            },
            mlua::Error::RuntimeError(message) => Self::Guest {
                message: message.clone(),
            },
            mlua::Error::SyntaxError { message, .. } => Self::Guest {
                message: message.clone(),
            },
            other => Self::Guest {
                message: other.to_string(),
            },
        }
    }
}
