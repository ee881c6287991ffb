//! Memory accounting for guest allocations.

use serde::{Deserialize, Serialize};

/// Tracks and caps all guest-owned memory.
///
/// Invariant: `0 <= total_allocated <= max_memory` at every observable
/// point. Frees clamp to zero on inconsistent accounting instead of
/// wrapping; growth is overflow-checked and committed only on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccount {
    /// Bytes currently attributed to the guest
    total_allocated: usize,
    /// Hard cap on guest-owned bytes
    max_memory: usize,
}

impl MemoryAccount {
    /// Create a new account with a byte cap
    #[must_use]
    pub fn new(max_memory: usize) -> Self {
        Self {
            total_allocated: 0,
            max_memory,
        }
    }

    /// Account for a reallocation of `old_size` bytes to `new_size` bytes.
    ///
    /// `new_size == 0` is a free: it always succeeds and clamps at zero.
    /// Anything else is an allocate/resize: it fails before mutating any
    /// state if the arithmetic overflows or the cap would be exceeded.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Overflow`] if `total - old + new` overflows,
    /// [`AccountError::Exhausted`] if it exceeds `max_memory`.
    pub fn reallocate(&mut self, old_size: usize, new_size: usize) -> Result<(), AccountError> {
        if new_size == 0 {
            self.total_allocated = self.total_allocated.saturating_sub(old_size);
            return Ok(());
        }

        let base = self.total_allocated.saturating_sub(old_size);
        let new_total = base
            .checked_add(new_size)
            .ok_or(AccountError::Overflow { old_size, new_size })?;

        if new_total > self.max_memory {
            return Err(AccountError::Exhausted {
                requested: new_size,
                available: self.max_memory.saturating_sub(base),
            });
        }

        self.total_allocated = new_total;
        Ok(())
    }

    /// Account for a fresh allocation of `size` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the cap would be exceeded
    pub fn allocate(&mut self, size: usize) -> Result<(), AccountError> {
        self.reallocate(0, size)
    }

    /// Account for a release of `size` bytes; always succeeds
    pub fn release(&mut self, size: usize) {
        // free path of reallocate is infallible
        let _ = self.reallocate(size, 0);
    }

    /// Overwrite the tracked total from an external usage reading,
    /// clamped into the account's invariant range
    pub fn reconcile(&mut self, used: usize) {
        self.total_allocated = used.min(self.max_memory);
    }

    /// Bytes currently attributed to the guest
    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    /// The byte cap
    #[must_use]
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Bytes still available under the cap
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.max_memory - self.total_allocated
    }

    /// Check whether an allocation of `size` bytes would fit
    #[must_use]
    pub fn can_fit(&self, size: usize) -> bool {
        size <= self.remaining()
    }
}

/// Accounting errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// Arithmetic overflow while computing the new total
    #[error("Allocation accounting overflow: old {old_size}, new {new_size}")]
    Overflow {
        /// Previous request size
        old_size: usize,
        /// Requested size
        new_size: usize,
    },

    /// The cap would be exceeded
    #[error("Memory exhausted: requested {requested} bytes, {available} bytes available")]
    Exhausted {
        /// Requested size
        requested: usize,
        /// Bytes still available under the cap
        available: usize,
    },
}
