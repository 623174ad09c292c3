//! Manager-wide configuration.
//!
//! There is no durability, network, or schema configuration in this
//! crate's scope (§1 Non-goals) — this is the entire configuration
//! surface the manager has.

/// Tunables for the transaction manager.
#[derive(Debug, Clone)]
pub struct TxManagerConfig {
    /// GC backlog charged per story mutation (§4.4, §5).
    pub steps_per_mutation: u32,
    /// How many backlog steps `drain_gc` performs per call when the host
    /// asks the manager to "drain what's convenient" rather than
    /// single-stepping.
    pub gc_batch_size: u32,
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        TxManagerConfig {
            steps_per_mutation: 2,
            gc_batch_size: 32,
        }
    }
}

impl TxManagerConfig {
    /// A configuration with a tiny GC batch size, useful for tests that
    /// want to observe the backlog draining one step at a time.
    pub fn with_small_batch() -> Self {
        TxManagerConfig {
            gc_batch_size: 1,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_constants() {
        let config = TxManagerConfig::default();
        assert_eq!(config.steps_per_mutation, 2);
    }
}
