//! Fixed-point engine: frames, statement state transfer, phase drivers.

pub mod driver;
pub mod frame;
pub mod stmt_states;

pub use driver::AnalysisDriver;
pub use frame::{
    ComputeFrame, ComputeFrameStack, InterruptionData, StmtResultFlag, StmtWorkList,
    SymbolDepGraph,
};
pub use stmt_states::{fuse_states, group_states_by_id, InStates, Phase, StmtStateAnalysis};
