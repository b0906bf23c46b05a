//! Bit-vector reaching-definition machinery.
//!
//! Definition sites are interned into bit positions; in/out sets are plain
//! word vectors. Kill and gen operate over identity groups (`symbol_id` /
//! `state_id`), so a new definition invalidates every prior definition of the
//! same identity, including ones minted in earlier loop rounds.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::FIRST_BIT_POS;
use crate::shared::models::{StateId, StmtId, SymbolId};

/// A growable bitset over machine words.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitSet {
    words: Vec<u64>,
}

// Capacity history must not affect equality: [1] and [1, 0] are the same set.
impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        let longest = self.words.len().max(other.words.len());
        (0..longest).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for BitSet {}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&mut self, pos: u32) {
        let word = (pos / 64) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (pos % 64);
    }

    #[inline]
    pub fn clear(&mut self, pos: u32) {
        let word = (pos / 64) as usize;
        if word < self.words.len() {
            self.words[word] &= !(1u64 << (pos % 64));
        }
    }

    #[inline]
    pub fn contains(&self, pos: u32) -> bool {
        let word = (pos / 64) as usize;
        word < self.words.len() && self.words[word] & (1u64 << (pos % 64)) != 0
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Positions of all set bits, by repeatedly stripping the lowest one.
    pub fn iter_ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, word)| {
            let mut remaining = *word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros();
                remaining &= remaining - 1;
                Some(word_index as u32 * 64 + bit)
            })
        })
    }
}

/// A definition site of a symbol identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolDefNode {
    /// Arena index of the defined symbol record.
    pub index: usize,
    pub symbol_id: SymbolId,
    pub stmt_id: StmtId,
}

impl SymbolDefNode {
    pub fn new(index: usize, symbol_id: SymbolId, stmt_id: StmtId) -> Self {
        Self {
            index,
            symbol_id,
            stmt_id,
        }
    }

    /// Placeholder def for an external symbol with no local definition.
    pub fn external(symbol_id: SymbolId) -> Self {
        Self {
            index: usize::MAX,
            symbol_id,
            stmt_id: -1,
        }
    }

    pub fn is_external(&self) -> bool {
        self.index == usize::MAX
    }
}

/// A definition site of a state identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDefNode {
    pub index: usize,
    pub state_id: StateId,
    pub stmt_id: StmtId,
}

impl StateDefNode {
    pub fn new(index: usize, state_id: StateId, stmt_id: StmtId) -> Self {
        Self {
            index,
            state_id,
            stmt_id,
        }
    }
}

/// Interns definition nodes into bit positions and runs kill/gen/explain
/// over vectors. One manager per kind (symbol/state) per compute frame.
#[derive(Debug, Clone)]
pub struct BitVectorManager<T: Eq + Hash + Clone> {
    counter: u32,
    id_to_bit_pos: FxHashMap<T, u32>,
    bit_pos_to_id: FxHashMap<u32, T>,
}

impl<T: Eq + Hash + Clone> Default for BitVectorManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> BitVectorManager<T> {
    pub fn new() -> Self {
        Self {
            counter: FIRST_BIT_POS,
            id_to_bit_pos: FxHashMap::default(),
            bit_pos_to_id: FxHashMap::default(),
        }
    }

    pub fn init(&mut self, ids: impl IntoIterator<Item = T>) {
        for id in ids {
            self.add_bit_id(id);
        }
    }

    /// Assign the next position to `id` if unseen; first-seen order.
    pub fn add_bit_id(&mut self, id: T) {
        if self.id_to_bit_pos.contains_key(&id) {
            return;
        }
        self.id_to_bit_pos.insert(id.clone(), self.counter);
        self.bit_pos_to_id.insert(self.counter, id);
        self.counter += 1;
    }

    pub fn bit_pos_of(&self, id: &T) -> Option<u32> {
        self.id_to_bit_pos.get(id).copied()
    }

    /// Clear the bits of every id in `ids` that has a position.
    pub fn kill(&self, vector: &mut BitSet, ids: impl IntoIterator<Item = T>) {
        for id in ids {
            if let Some(pos) = self.id_to_bit_pos.get(&id) {
                vector.clear(*pos);
            }
        }
    }

    /// Set the bits of every id in `ids` that has a position.
    pub fn gen(&self, vector: &mut BitSet, ids: impl IntoIterator<Item = T>) {
        for id in ids {
            if let Some(pos) = self.id_to_bit_pos.get(&id) {
                vector.set(*pos);
            }
        }
    }

    /// Decode a vector back into its definition-node set.
    pub fn explain(&self, vector: &BitSet) -> FxHashSet<T> {
        vector
            .iter_ones()
            .filter_map(|pos| self.bit_pos_to_id.get(&pos).cloned())
            .collect()
    }

    pub fn is_set(&self, vector: &BitSet, id: &T) -> bool {
        self.id_to_bit_pos
            .get(id)
            .map(|pos| vector.contains(*pos))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.id_to_bit_pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_bit_pos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_roundtrip() {
        let mut bits = BitSet::new();
        bits.set(1);
        bits.set(65);
        bits.set(200);
        let ones: Vec<u32> = bits.iter_ones().collect();
        assert_eq!(ones, vec![1, 65, 200]);
        bits.clear(65);
        assert!(!bits.contains(65));
        assert!(bits.contains(200));
    }

    #[test]
    fn test_bitset_equality_ignores_capacity() {
        let mut grown = BitSet::new();
        grown.set(1);
        grown.set(100);
        grown.clear(100);
        let mut small = BitSet::new();
        small.set(1);
        assert_eq!(grown, small);
    }

    #[test]
    fn test_positions_start_at_one() {
        let mut manager: BitVectorManager<SymbolDefNode> = BitVectorManager::new();
        let def = SymbolDefNode::new(0, 7, 3);
        manager.add_bit_id(def);
        assert_eq!(manager.bit_pos_of(&def), Some(1));
    }

    #[test]
    fn test_kill_gen_is_identity_group_exclusive() {
        let mut manager: BitVectorManager<SymbolDefNode> = BitVectorManager::new();
        let first = SymbolDefNode::new(0, 7, 3);
        let second = SymbolDefNode::new(4, 7, 9);
        let other = SymbolDefNode::new(2, 8, 5);
        manager.init([first, second, other]);

        let mut vector = BitSet::new();
        manager.gen(&mut vector, [first, other]);
        // redefine identity 7: kill all of its defs, gen the new one
        manager.kill(&mut vector, [first, second]);
        manager.gen(&mut vector, [second]);

        let live = manager.explain(&vector);
        assert!(live.contains(&second));
        assert!(live.contains(&other));
        assert!(!live.contains(&first));
        assert_eq!(live.iter().filter(|d| d.symbol_id == 7).count(), 1);
    }

    #[test]
    fn test_explain_decodes_exactly_the_generated_defs() {
        let mut manager: BitVectorManager<StateDefNode> = BitVectorManager::new();
        let defs: Vec<StateDefNode> = (0..70)
            .map(|i| StateDefNode::new(i as usize, 100 + i, i))
            .collect();
        manager.init(defs.iter().copied());

        let mut vector = BitSet::new();
        manager.gen(&mut vector, [defs[0], defs[63], defs[69]]);
        let live = manager.explain(&vector);
        assert_eq!(live.len(), 3);
        assert!(live.contains(&defs[63]));
    }
}
