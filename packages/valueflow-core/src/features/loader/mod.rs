//! Program database port, in-memory implementation, and artifact store.

pub mod artifacts;
pub mod memory;
pub mod ports;

pub use artifacts::{ArtifactStore, DefUseArtifacts, SummaryPhaseArtifacts};
pub use memory::{MemoryProgramDb, ProgramBuilder};
pub use ports::{MethodIr, ProgramDb};
