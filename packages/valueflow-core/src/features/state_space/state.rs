//! Values and access paths.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::shared::models::{ConstValue, MethodId, StateId, StmtId, SymbolId, UnitId};

/// Specialized kinds of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// A normal, concrete value.
    Regular,
    /// Declared but never resolved to anything.
    Unsolved,
    /// Escaped from / controlled by a caller or the external world; not yet
    /// concrete. Carries a `source_symbol_id` naming whose value it stands
    /// in for.
    Anything,
}

/// What a state holds at its leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    None,
    Const(ConstValue),
    MethodRef(MethodId),
    ClassRef(StmtId),
    UnitRef(UnitId),
}

impl StateValue {
    pub fn is_none(&self) -> bool {
        matches!(self, StateValue::None)
    }
}

/// One step of an access path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessStep {
    /// The root of the path: a plain name.
    TopLevel { key: String },
    Field { name: String },
    ArraySlot { index: usize },
}

/// A step plus the state id the step landed on; the second-to-last step's
/// state id recovers the structural parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub step: AccessStep,
    pub state_id: StateId,
}

impl AccessPoint {
    pub fn top_level(key: impl Into<String>, state_id: StateId) -> Self {
        Self {
            step: AccessStep::TopLevel { key: key.into() },
            state_id,
        }
    }

    pub fn field(name: impl Into<String>, state_id: StateId) -> Self {
        Self {
            step: AccessStep::Field { name: name.into() },
            state_id,
        }
    }

    pub fn array_slot(index: usize, state_id: StateId) -> Self {
        Self {
            step: AccessStep::ArraySlot { index },
            state_id,
        }
    }
}

/// A value (or abstract placeholder for one) in the analyzed program.
///
/// `state_id` is the identity group: every copy/update of the same logical
/// value shares it, and reaching definitions kill/gen over it. `stmt_id` is
/// the creation site of this particular version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub stmt_id: StmtId,
    pub state_id: StateId,
    pub kind: StateKind,

    pub data_type: String,
    pub value: StateValue,

    /// field name → child state indices
    pub fields: FxHashMap<String, FxHashSet<usize>>,
    /// ordered array slots, each a child state index set
    pub array: Vec<FxHashSet<usize>>,

    /// Children absorbed when a write made this state its own descendant;
    /// kept flat instead of nesting so resolution stays finite.
    pub collapsed_elements: FxHashSet<usize>,
    pub collapsed: bool,

    /// For Anything states: whose value this stands in for.
    pub source_symbol_id: SymbolId,
    pub source_state_id: StateId,

    /// How this state was reached from a root value.
    pub access_path: Vec<AccessPoint>,
}

impl State {
    pub fn new(stmt_id: StmtId, state_id: StateId) -> Self {
        Self {
            stmt_id,
            state_id,
            kind: StateKind::Regular,
            data_type: String::new(),
            value: StateValue::None,
            fields: FxHashMap::default(),
            array: Vec::new(),
            collapsed_elements: FxHashSet::default(),
            collapsed: false,
            source_symbol_id: -1,
            source_state_id: state_id,
            access_path: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: StateKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_value(mut self, value: StateValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn with_source_symbol(mut self, symbol_id: SymbolId) -> Self {
        self.source_symbol_id = symbol_id;
        self
    }

    pub fn with_access_path(mut self, access_path: Vec<AccessPoint>) -> Self {
        self.access_path = access_path;
        self
    }

    /// Deep copy as a new version created at `stmt_id`; identity and
    /// structure are kept, child index sets are copied as-is.
    pub fn copy_at(&self, stmt_id: StmtId) -> Self {
        Self {
            stmt_id,
            ..self.clone()
        }
    }

    pub fn is_anything(&self) -> bool {
        self.kind == StateKind::Anything
    }

    pub fn has_children(&self) -> bool {
        !self.fields.is_empty() || !self.array.is_empty() || !self.collapsed_elements.is_empty()
    }

    /// Structural parent, recoverable whenever the access path has at least
    /// two steps.
    pub fn parent_state_id(&self) -> Option<StateId> {
        if self.access_path.len() < 2 {
            return None;
        }
        Some(self.access_path[self.access_path.len() - 2].state_id)
    }

    /// True when `state_id` appears anywhere on this state's access path,
    /// i.e. the state descends from that value.
    pub fn descends_from(&self, state_id: StateId) -> bool {
        self.access_path.iter().any(|p| p.state_id == state_id)
    }

    pub fn add_field(&mut self, name: impl Into<String>, child_index: usize) {
        self.fields.entry(name.into()).or_default().insert(child_index);
    }

    pub fn set_array_slot(&mut self, index: usize, children: FxHashSet<usize>) {
        while self.array.len() <= index {
            self.array.push(FxHashSet::default());
        }
        self.array[index] = children;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_recovery_needs_two_steps() {
        let mut state = State::new(1, 100);
        state.access_path = vec![AccessPoint::top_level("p", 90)];
        assert_eq!(state.parent_state_id(), None);

        state.access_path.push(AccessPoint::field("f", 100));
        assert_eq!(state.parent_state_id(), Some(90));
    }

    #[test]
    fn test_descends_from_sees_whole_path() {
        let mut state = State::new(1, 102);
        state.access_path = vec![
            AccessPoint::top_level("p", 90),
            AccessPoint::field("f", 101),
            AccessPoint::field("g", 102),
        ];
        assert!(state.descends_from(90));
        assert!(state.descends_from(101));
        assert!(!state.descends_from(77));
    }

    #[test]
    fn test_array_slot_grows_on_demand() {
        let mut state = State::new(1, 100);
        let mut children = FxHashSet::default();
        children.insert(7usize);
        state.set_array_slot(2, children);
        assert_eq!(state.array.len(), 3);
        assert!(state.array[2].contains(&7));
    }
}
