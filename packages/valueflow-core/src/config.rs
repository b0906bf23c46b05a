//! Analysis configuration and id allocation.

use serde::{Deserialize, Serialize};

use crate::shared::models::{StateId, SymbolId};

/// First bit position handed out by a bit-vector manager; 0 is reserved
/// as "empty".
pub const FIRST_BIT_POS: u32 = 1;

/// Round counter value for the first visit of a statement.
pub const FIRST_ROUND: u32 = 0;

/// Sink node id for callees resolvable only at runtime.
pub const DYNAMIC_METHOD_ID: i64 = -1;

/// Sink node id for callees that could not be resolved at all.
pub const ERROR_METHOD_ID: i64 = -2;

/// Symbol id under which return-value states are recorded in a summary.
pub const RETURN_SYMBOL_ID: i64 = -3;

/// Symbol id of the implicit receiver.
pub const BUILTIN_THIS_SYMBOL_ID: i64 = -9;

/// Engine tuning knobs.
///
/// The round caps are the termination guarantee: a statement is never
/// recomputed more than `max_stmt_rounds` times, and statements reached
/// through a loop back-edge are bounded by `loop_rounds` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum state-analysis rounds per statement.
    pub max_stmt_rounds: u32,

    /// Analysis rounds granted to statements inside a loop body.
    pub loop_rounds: u32,

    /// First state id minted by a fresh allocator.
    pub start_state_id: StateId,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_stmt_rounds: 4,
            loop_rounds: 2,
            start_state_id: 100,
        }
    }
}

/// Allocator for globally-unique ids.
///
/// Owned by the analysis session and passed by `&mut` into every component
/// that mints state ids or synthetic symbol ids, so uniqueness holds without
/// any process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    next_id: i64,
}

impl IdAllocator {
    pub fn new(start: i64) -> Self {
        Self { next_id: start }
    }

    /// Mint a fresh state id.
    #[inline]
    pub fn state_id(&mut self) -> StateId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Mint a stable positive id for a name that resolved to no declaration.
    #[inline]
    pub fn synthetic_symbol_id(&mut self) -> SymbolId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of ids handed out so far, relative to the start value.
    #[inline]
    pub fn minted(&self, start: i64) -> i64 {
        self.next_id - start
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(AnalysisConfig::default().start_state_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let mut ids = IdAllocator::new(100);
        let a = ids.state_id();
        let b = ids.synthetic_symbol_id();
        let c = ids.state_id();
        assert_eq!((a, b, c), (100, 101, 102));
        assert_eq!(ids.minted(100), 3);
    }

    #[test]
    fn test_default_config_bounds() {
        let config = AnalysisConfig::default();
        assert!(config.loop_rounds <= config.max_stmt_rounds);
    }
}
