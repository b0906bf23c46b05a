//! Call-site argument/parameter records.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::features::state_space::AccessPoint;
use crate::shared::models::{MethodId, StateId, StmtId, SymbolId};

/// One actual argument at a call site, as seen in the caller's arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub call_stmt_id: StmtId,
    /// Position for positional args, usize::MAX for named-only.
    pub position: usize,
    /// Keyword for named args.
    pub name: Option<String>,
    pub source_symbol_id: SymbolId,
    pub access_path: Vec<AccessPoint>,
    /// Live state indices of the argument in the caller's arena.
    pub states: FxHashSet<usize>,
    /// Arena index of the argument's symbol/state record itself.
    pub index_in_space: usize,
}

/// Arguments of one call, split the way parameters bind them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodCallArguments {
    pub positional: Vec<Argument>,
    pub named: Vec<Argument>,
}

/// One formal parameter of a method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub method_id: MethodId,
    pub position: usize,
    pub name: String,
    /// = declaring parameter_decl statement id.
    pub symbol_id: SymbolId,
    pub packed_positional: bool,
    pub packed_named: bool,
    pub has_default: bool,
}

/// How a formal parameter binds at one call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Caller-arena index of the bound argument state.
    pub arg_index_in_space: usize,
    pub arg_state_id: StateId,
    pub arg_source_symbol_id: SymbolId,
    pub arg_access_path: Vec<AccessPoint>,
    pub parameter_symbol_id: SymbolId,
    /// For packed parameters: the projection step (array slot / field key)
    /// the argument lands in.
    pub parameter_access_point: Option<AccessPoint>,
    /// The binding fell back to the parameter's default value; the "arg"
    /// then names the default-value symbol instead of a caller state.
    pub is_default_value: bool,
}

impl ParameterMapping {
    pub fn direct(
        arg: &Argument,
        arg_state_id: StateId,
        parameter_symbol_id: SymbolId,
    ) -> Self {
        Self {
            arg_index_in_space: arg.index_in_space,
            arg_state_id,
            arg_source_symbol_id: arg.source_symbol_id,
            arg_access_path: arg.access_path.clone(),
            parameter_symbol_id,
            parameter_access_point: None,
            is_default_value: false,
        }
    }
}
