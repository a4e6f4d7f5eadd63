//! Store and loader pool configuration.

/// What to do when an async default finishes loading but the key was
/// populated by someone else in the meantime (a synchronous `set`, or
/// another accessor's default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Drop the loaded default; the value already in the container wins.
    #[default]
    KeepExisting,
    /// Write the loaded default over whatever is there.
    LastWriteWins,
}

/// Configuration for a [`KeyedStateStore`](crate::KeyedStateStore).
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Precedence between a completed async default and an existing value.
    pub conflict_policy: ConflictPolicy,
}

impl StoreConfig {
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

/// Configuration for a [`TokioExecutor`](crate::TokioExecutor).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of default loaders running at once. Extra loads
    /// queue until a slot frees up. Zero is treated as one.
    pub max_concurrent_loads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: 16,
        }
    }
}
