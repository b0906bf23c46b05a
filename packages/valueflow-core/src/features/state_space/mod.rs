//! The Symbol/State arena: value representation and sub-graph extraction.

pub mod space;
pub mod state;
pub mod symbol;

pub use space::{ExtractedSpace, SpaceItem, SymbolStateSpace};
pub use state::{AccessPoint, AccessStep, State, StateKind, StateValue};
pub use symbol::Symbol;
