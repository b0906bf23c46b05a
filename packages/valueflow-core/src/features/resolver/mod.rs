//! Symbol and state resolution.
//!
//! One resolver serves both analysis phases; the phase-specific part (how
//! the implicit receiver is looked up) is driven by which caller frame the
//! phase hands in, not by a second implementation.

pub mod anything;
pub mod source;
pub mod states;

pub use anything::{AnythingOutcome, AnythingResolution, DeferredIndexUpdate, DeferredTarget};
pub use source::{resolve_symbol_source, resolve_symbol_source_with_scope};
pub use states::{InferOutcome, Resolver};
