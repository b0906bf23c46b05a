//! Method summaries: the relocatable description of a procedure's effects.

pub mod def_use_summary;
pub mod parameter;
pub mod template;

pub use def_use_summary::MethodDefUseSummary;
pub use parameter::{Argument, MethodCallArguments, ParameterInfo, ParameterMapping};
pub use template::{CallSiteKey, IndexMapInSummary, MethodSummaryInstance, MethodSummaryTemplate};
