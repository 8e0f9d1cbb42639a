//! Database configuration.

/// Locking policy for raw operations.
///
/// `PerCall` is the normal mode: every raw operation is self-contained and,
/// when write-back caching is off, flushes through to the backend before
/// returning. `CallerHeld` is bulk mode: the caller owns the critical
/// section for a whole batch, per-operation flushing is deferred, and key
/// enumeration is served from a snapshot frozen when the batch began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Normal operation: each call locks, applies, and flushes as needed.
    #[default]
    PerCall,
    /// Bulk operation: the caller holds the lock for the whole batch.
    CallerHeld,
}

/// Tunables for a [`Database`](super::Database).
#[derive(Debug, Clone, Copy)]
pub struct DatabaseOptions {
    /// When true, writes accumulate in the pending cache until an explicit
    /// `sync`. When false (the default), every write merges into the backend
    /// immediately.
    pub write_back: bool,
    /// When true (the default), mutating a top-level entry view persists the
    /// row immediately.
    pub auto_update: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            write_back: false,
            auto_update: true,
        }
    }
}

impl DatabaseOptions {
    /// Enables or disables write-back caching.
    pub fn write_back(mut self, enabled: bool) -> Self {
        self.write_back = enabled;
        self
    }

    /// Enables or disables automatic persistence of entry mutations.
    pub fn auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }
}
