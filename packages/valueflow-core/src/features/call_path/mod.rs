//! Call-path deduplication.
//!
//! A path alternates {method, call statement, method, ...}. The trie keeps
//! only maximal, fully-resolved chains: storing a longer path evicts any
//! shorter stored path it extends, and a path that is itself a prefix of a
//! stored one is dropped.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::shared::models::{MethodId, StmtId};

/// An interprocedural call path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallPath {
    elements: Vec<i64>,
}

/// One concrete call edge on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_id: MethodId,
    pub call_stmt_id: StmtId,
    pub callee_id: MethodId,
}

impl CallPath {
    pub fn root(method_id: MethodId) -> Self {
        Self {
            elements: vec![method_id],
        }
    }

    pub fn from_elements(elements: Vec<i64>) -> Self {
        Self { elements }
    }

    /// Extend with one call edge.
    pub fn push_call(&self, call_stmt_id: StmtId, callee_id: MethodId) -> Self {
        let mut elements = self.elements.clone();
        elements.push(call_stmt_id);
        elements.push(callee_id);
        Self { elements }
    }

    pub fn elements(&self) -> &[i64] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn has_any_negative(&self) -> bool {
        self.elements.iter().any(|e| *e < 0)
    }

    /// Whether `method_id` already appears as a procedure element.
    pub fn contains_method(&self, method_id: MethodId) -> bool {
        self.elements.iter().step_by(2).any(|e| *e == method_id)
    }

    /// Decompose into call sites. A bare root yields one sentinel site.
    pub fn call_sites(&self) -> Vec<CallSite> {
        if self.elements.len() == 1 {
            return vec![CallSite {
                caller_id: self.elements[0],
                call_stmt_id: -1,
                callee_id: -1,
            }];
        }
        let mut result = Vec::new();
        let mut i = 0;
        while i + 2 < self.elements.len() {
            result.push(CallSite {
                caller_id: self.elements[i],
                call_stmt_id: self.elements[i + 1],
                callee_id: self.elements[i + 2],
            });
            i += 2;
        }
        result
    }

    /// How many times the trailing cycle (ending at the last element)
    /// repeats immediately before it. Used to cap recursive unrolling.
    pub fn count_cycles(&self) -> usize {
        let path = &self.elements;
        let n = path.len();
        if n < 2 {
            return 0;
        }
        let last = path[n - 1];
        for i in (0..n - 1).rev() {
            if path[i] != last {
                continue;
            }
            let cycle_len = n - i - 1;
            if i + 1 < cycle_len {
                break;
            }
            let current = &path[i + 1 - cycle_len..i + 1];
            if current != &path[i + 1..i + 1 + cycle_len] {
                break;
            }
            let mut count = 1;
            let mut j = (i + 1).checked_sub(2 * cycle_len);
            while let Some(start) = j {
                if &path[start..start + cycle_len] == current {
                    count += 1;
                    j = start.checked_sub(cycle_len);
                } else {
                    break;
                }
            }
            return count;
        }
        0
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    children: FxHashMap<i64, TrieNode>,
    is_end: bool,
}

/// Stores the deduplicated call-path set.
#[derive(Debug, Default)]
pub struct PathManager {
    root: TrieNode,
    paths: Vec<CallPath>,
}

impl PathManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns true when the stored set changed.
    ///
    /// Paths containing sentinel (negative) elements are rejected. An exact
    /// duplicate is a no-op. A stored strict prefix of the new path is
    /// evicted in favor of the longer one; a new path that is a prefix of a
    /// stored one is dropped.
    pub fn add_path(&mut self, path: &CallPath) -> bool {
        if path.is_empty() || path.has_any_negative() {
            return false;
        }

        let elements = path.elements();
        let mut evicted: Option<Vec<i64>> = None;
        let mut need_to_add = false;

        let mut current = &mut self.root;
        for (i, value) in elements.iter().enumerate() {
            if !need_to_add && !current.children.contains_key(value) {
                need_to_add = true;
            }
            current = current.children.entry(*value).or_default();
            if current.is_end {
                if i + 1 == elements.len() {
                    // exact duplicate
                    return false;
                }
                // the new path strictly extends a stored one: evict it
                evicted = Some(elements[..i + 1].to_vec());
                current.is_end = false;
                need_to_add = true;
            }
        }

        if !need_to_add {
            // the new path is a prefix of (or equal to) a stored one
            return false;
        }

        current.is_end = true;
        if let Some(shorter) = evicted {
            self.paths.retain(|p| p.elements() != shorter.as_slice());
        }
        self.paths.push(path.clone());
        true
    }

    pub fn path_exists(&self, path: &CallPath) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn paths(&self) -> &[CallPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longer_path_evicts_prefix() {
        let mut manager = PathManager::new();
        let short = CallPath::from_elements(vec![1, 10, 2]);
        let long = CallPath::from_elements(vec![1, 10, 2, 20, 3]);
        assert!(manager.add_path(&short));
        assert!(manager.add_path(&long));
        assert_eq!(manager.len(), 1);
        assert!(manager.path_exists(&long));
        assert!(!manager.path_exists(&short));
    }

    #[test]
    fn test_prefix_of_stored_path_is_dropped() {
        let mut manager = PathManager::new();
        let long = CallPath::from_elements(vec![1, 10, 2, 20, 3]);
        let short = CallPath::from_elements(vec![1, 10, 2]);
        assert!(manager.add_path(&long));
        assert!(!manager.add_path(&short));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_exact_duplicate_is_noop() {
        let mut manager = PathManager::new();
        let path = CallPath::from_elements(vec![1, 10, 2]);
        assert!(manager.add_path(&path));
        assert!(!manager.add_path(&path));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_negative_elements_rejected() {
        let mut manager = PathManager::new();
        let path = CallPath::from_elements(vec![1, 10, -2]);
        assert!(!manager.add_path(&path));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_diverging_paths_both_kept() {
        let mut manager = PathManager::new();
        manager.add_path(&CallPath::from_elements(vec![1, 10, 2]));
        manager.add_path(&CallPath::from_elements(vec![1, 11, 3]));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_count_cycles_on_recursion() {
        // a -> b -> a -> b -> a : trailing cycle (b, a) repeats
        let path = CallPath::from_elements(vec![1, 10, 2, 20, 1, 10, 2, 20, 1]);
        assert!(path.count_cycles() >= 1);

        let no_cycle = CallPath::from_elements(vec![1, 10, 2, 20, 3]);
        assert_eq!(no_cycle.count_cycles(), 0);
    }

    #[test]
    fn test_call_sites_decomposition() {
        let path = CallPath::from_elements(vec![1, 10, 2, 20, 3]);
        let sites = path.call_sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].caller_id, 1);
        assert_eq!(sites[0].call_stmt_id, 10);
        assert_eq!(sites[0].callee_id, 2);
        assert_eq!(sites[1].callee_id, 3);
    }
}
