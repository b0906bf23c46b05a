//! The Symbol/State arena.
//!
//! Append-only indexed storage; every reference between records is a plain
//! integer index into the owning arena, never a pointer. Cross-arena moves
//! go through extraction (collect + renumber) or whole-space append, both of
//! which return old↔new index maps.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::state::State;
use super::symbol::Symbol;
use crate::shared::models::StateId;

/// One arena record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SpaceItem {
    Symbol(Symbol),
    State(State),
}

impl SpaceItem {
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            SpaceItem::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&State> {
        match self {
            SpaceItem::State(s) => Some(s),
            _ => None,
        }
    }
}

/// Result of extracting a reachable sub-graph into a standalone arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedSpace {
    pub space: SymbolStateSpace,
    pub old_to_new: FxHashMap<usize, usize>,
    pub new_to_old: FxHashMap<usize, usize>,
}

impl ExtractedSpace {
    pub fn map_index(&self, old: usize) -> usize {
        *self.old_to_new.get(&old).unwrap_or(&old)
    }
}

/// Append-only arena of Symbols and States.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStateSpace {
    items: Vec<SpaceItem>,
    state_index_to_id: FxHashMap<usize, StateId>,
}

impl SymbolStateSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: SpaceItem) -> usize {
        let index = self.items.len();
        if let SpaceItem::State(state) = &item {
            self.state_index_to_id.insert(index, state.state_id);
        }
        self.items.push(item);
        index
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> usize {
        self.add(SpaceItem::Symbol(symbol))
    }

    pub fn add_state(&mut self, state: State) -> usize {
        self.add(SpaceItem::State(state))
    }

    pub fn get(&self, index: usize) -> Option<&SpaceItem> {
        self.items.get(index)
    }

    pub fn symbol(&self, index: usize) -> Option<&Symbol> {
        self.items.get(index).and_then(SpaceItem::as_symbol)
    }

    pub fn symbol_mut(&mut self, index: usize) -> Option<&mut Symbol> {
        match self.items.get_mut(index) {
            Some(SpaceItem::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    pub fn state(&self, index: usize) -> Option<&State> {
        self.items.get(index).and_then(SpaceItem::as_state)
    }

    pub fn state_mut(&mut self, index: usize) -> Option<&mut State> {
        match self.items.get_mut(index) {
            Some(SpaceItem::State(s)) => Some(s),
            _ => None,
        }
    }

    /// Identity group of the state at `index`, if the index holds a state.
    pub fn state_id_of(&self, index: usize) -> Option<StateId> {
        self.state_index_to_id.get(&index).copied()
    }

    pub fn state_ids_of(&self, indices: &FxHashSet<usize>) -> FxHashSet<StateId> {
        indices
            .iter()
            .filter_map(|i| self.state_id_of(*i))
            .collect()
    }

    pub fn is_state_index(&self, index: usize) -> bool {
        self.state_index_to_id.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SpaceItem)> {
        self.items.iter().enumerate()
    }

    /// Indices reachable from `roots` through symbol states, fields, array
    /// slots and collapsed children.
    fn collect_reachable(&self, roots: &FxHashSet<usize>) -> Vec<usize> {
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        let mut pending: Vec<usize> = roots.iter().copied().collect();

        while let Some(index) = pending.pop() {
            if !seen.insert(index) {
                continue;
            }
            match self.items.get(index) {
                Some(SpaceItem::Symbol(symbol)) => {
                    pending.extend(symbol.states.iter().copied());
                }
                Some(SpaceItem::State(state)) => {
                    for children in state.fields.values() {
                        pending.extend(children.iter().copied());
                    }
                    for children in &state.array {
                        pending.extend(children.iter().copied());
                    }
                    pending.extend(state.collapsed_elements.iter().copied());
                }
                None => {
                    seen.remove(&index);
                }
            }
        }

        let mut ordered: Vec<usize> = seen.into_iter().collect();
        ordered.sort_unstable();
        ordered
    }

    /// Copy the sub-graph reachable from `roots` into a fresh arena.
    ///
    /// Two passes: first collect and copy every reachable record, then remap
    /// child index sets through the finished old→new table, so sharing is
    /// preserved and repeated root indices are harmless.
    pub fn extract(&self, roots: &FxHashSet<usize>) -> ExtractedSpace {
        let ordered = self.collect_reachable(roots);

        let mut result = ExtractedSpace::default();
        for old_index in ordered {
            let item = self.items[old_index].clone();
            let new_index = result.space.add(item);
            result.old_to_new.insert(old_index, new_index);
            result.new_to_old.insert(new_index, old_index);
        }

        let old_to_new = result.old_to_new.clone();
        for item in result.space.items.iter_mut() {
            remap_item(item, &old_to_new);
        }
        result
    }

    /// Append a deep copy of `other` onto this arena, renumbering the copy's
    /// internal indices. Returns old-index-in-other → new-index-in-self.
    pub fn append_space_copy(&mut self, other: &SymbolStateSpace) -> FxHashMap<usize, usize> {
        let baseline = self.items.len();
        let mut old_to_new = FxHashMap::default();
        for old_index in 0..other.items.len() {
            old_to_new.insert(old_index, old_index + baseline);
        }
        for item in &other.items {
            let mut copied = item.clone();
            remap_item(&mut copied, &old_to_new);
            self.add(copied);
        }
        old_to_new
    }
}

fn remap_set(set: &FxHashSet<usize>, old_to_new: &FxHashMap<usize, usize>) -> FxHashSet<usize> {
    set.iter()
        .filter_map(|old| old_to_new.get(old).copied())
        .collect()
}

fn remap_item(item: &mut SpaceItem, old_to_new: &FxHashMap<usize, usize>) {
    match item {
        SpaceItem::Symbol(symbol) => {
            symbol.states = remap_set(&symbol.states, old_to_new);
        }
        SpaceItem::State(state) => {
            for children in state.fields.values_mut() {
                *children = remap_set(children, old_to_new);
            }
            for children in state.array.iter_mut() {
                *children = remap_set(children, old_to_new);
            }
            state.collapsed_elements = remap_set(&state.collapsed_elements, old_to_new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::state_space::state::StateValue;
    use crate::shared::models::ConstValue;

    fn literal(space: &mut SymbolStateSpace, stmt_id: i64, state_id: i64, v: i64) -> usize {
        space.add_state(
            State::new(stmt_id, state_id).with_value(StateValue::Const(ConstValue::Int(v))),
        )
    }

    #[test]
    fn test_extraction_is_a_closed_subgraph() {
        let mut space = SymbolStateSpace::new();
        let leaf = literal(&mut space, 1, 100, 1);
        let mut composite = State::new(2, 101);
        composite.add_field("x", leaf);
        let root = space.add_state(composite);
        let mut symbol = Symbol::new(2, "p");
        symbol.states.insert(root);
        let sym_index = space.add_symbol(symbol);
        // an unrelated record that must not be dragged along
        literal(&mut space, 3, 102, 9);

        let mut roots = FxHashSet::default();
        roots.insert(sym_index);
        let extracted = space.extract(&roots);

        assert_eq!(extracted.space.len(), 3);
        for (_, item) in extracted.space.iter() {
            match item {
                SpaceItem::Symbol(s) => {
                    for index in &s.states {
                        assert!(extracted.space.get(*index).is_some());
                    }
                }
                SpaceItem::State(s) => {
                    for children in s.fields.values() {
                        for index in children {
                            assert!(extracted.space.get(*index).is_some());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_extraction_preserves_sharing() {
        let mut space = SymbolStateSpace::new();
        let shared = literal(&mut space, 1, 100, 42);
        let mut a = State::new(2, 101);
        a.add_field("x", shared);
        let mut b = State::new(3, 102);
        b.add_field("y", shared);
        let a_index = space.add_state(a);
        let b_index = space.add_state(b);

        let mut roots = FxHashSet::default();
        roots.insert(a_index);
        roots.insert(b_index);
        let extracted = space.extract(&roots);

        let new_a = extracted.space.state(extracted.map_index(a_index)).unwrap();
        let new_b = extracted.space.state(extracted.map_index(b_index)).unwrap();
        let ax: Vec<usize> = new_a.fields["x"].iter().copied().collect();
        let by: Vec<usize> = new_b.fields["y"].iter().copied().collect();
        assert_eq!(ax, by);
    }

    #[test]
    fn test_extraction_idempotent_for_repeated_roots() {
        let mut space = SymbolStateSpace::new();
        let index = literal(&mut space, 1, 100, 5);

        let mut roots = FxHashSet::default();
        roots.insert(index);
        roots.insert(index);
        let extracted = space.extract(&roots);
        assert_eq!(extracted.space.len(), 1);
    }

    #[test]
    fn test_append_space_copy_renumbers() {
        let mut target = SymbolStateSpace::new();
        literal(&mut target, 1, 100, 1);

        let mut other = SymbolStateSpace::new();
        let child = literal(&mut other, 2, 101, 2);
        let mut parent = State::new(2, 102);
        parent.add_field("f", child);
        let parent_index = other.add_state(parent);

        let old_to_new = target.append_space_copy(&other);
        let new_parent = target.state(old_to_new[&parent_index]).unwrap();
        assert!(new_parent.fields["f"].contains(&old_to_new[&child]));
        assert_eq!(target.len(), 3);
        // the source arena is untouched
        assert_eq!(other.len(), 2);
    }
}
