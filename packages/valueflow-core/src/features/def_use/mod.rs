//! Per-statement def/use analysis.

pub mod builder;
pub mod status;

pub use builder::{DefUseAnalysis, THIS_NAME, TMP_VARIABLE_PREFIX};
pub use status::StmtStatus;
