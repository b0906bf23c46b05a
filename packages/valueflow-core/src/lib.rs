/*
 * valueflow-core - summary-based interprocedural value-flow analysis
 *
 * Feature-first layout:
 * - shared/    : IR statements, CFG, scope/declaration summaries
 * - features/  : vertical slices (state_space → bitvector → def_use →
 *                resolver → summary → engine), plus call graph/path and the
 *                program-db port
 * - pipeline/  : whole-program orchestration (def/use → templates → global)
 *
 * The engine is single-threaded and cooperative: callee analysis suspends
 * and resumes on an explicit frame stack, never on the host call stack.
 */

#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

/// Shared models
pub mod shared;

/// Feature modules
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Configuration and id allocation
pub mod config;

/// Error types
pub mod errors;

pub use config::{AnalysisConfig, IdAllocator};
pub use errors::{Result, ValueflowError};
pub use features::engine::Phase;
pub use features::loader::{ArtifactStore, MemoryProgramDb, ProgramBuilder, ProgramDb};
pub use pipeline::AnalysisSession;
