//! Set reconciliation engine
//!
//! Compares a previous collection snapshot against a new desired collection
//! and exposes the difference as two cursors, one over deletions and one over
//! additions. Callers interleave the cursors with their own side effects
//! (unlink-then-link against the model or the remote store); the mutator
//! itself only sequences local set algebra.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// An element that can participate in set reconciliation.
///
/// The key carries the dual identity rule of the data-object layer: persisted
/// elements key by remote id, unsaved elements key by a process-unique
/// reference token. Keys are captured once, at mutator construction; an
/// element saved mid-reconciliation keeps the key it entered with.
pub trait MutableSetItem {
    type Key: Eq + Hash + Clone;

    fn set_key(&self) -> Self::Key;
}

/// Cursor-style diff between two collection snapshots.
///
/// Deletions are yielded in encounter order of `previous`, additions in
/// encounter order of `desired`. After both cursors are exhausted,
/// `result()` equals `desired` as a set. Membership tests are hash based,
/// O(|previous| + |desired|) overall.
pub struct SetMutator<T: MutableSetItem> {
    deletions: VecDeque<(T::Key, T)>,
    additions: VecDeque<T>,
    previous: Vec<(T::Key, T)>,
    applied_deletions: HashSet<T::Key>,
    applied_additions: Vec<T>,
}

impl<T: MutableSetItem + Clone> SetMutator<T> {
    /// Diff `previous` against `desired`.
    pub fn new(previous: &[T], desired: &[T]) -> Self {
        let previous_keys: HashSet<T::Key> = previous.iter().map(|e| e.set_key()).collect();
        let desired_keys: HashSet<T::Key> = desired.iter().map(|e| e.set_key()).collect();

        let deletions = previous
            .iter()
            .filter(|e| !desired_keys.contains(&e.set_key()))
            .map(|e| (e.set_key(), e.clone()))
            .collect();
        let additions = desired
            .iter()
            .filter(|e| !previous_keys.contains(&e.set_key()))
            .cloned()
            .collect();
        let previous = previous.iter().map(|e| (e.set_key(), e.clone())).collect();

        Self {
            deletions,
            additions,
            previous,
            applied_deletions: HashSet::new(),
            applied_additions: Vec::new(),
        }
    }

    /// True while the deletion cursor has elements left
    pub fn more_deletions(&self) -> bool {
        !self.deletions.is_empty()
    }

    /// Yield the next deletion, removing it from the running result.
    ///
    /// Callers issue exactly one unlink side effect per yielded element.
    ///
    /// # Panics
    /// Panics if the deletion cursor is exhausted; guard with
    /// [`more_deletions`](Self::more_deletions).
    pub fn next_deletion(&mut self) -> T {
        let (key, item) = self
            .deletions
            .pop_front()
            .expect("next_deletion called past exhaustion");
        self.applied_deletions.insert(key);
        item
    }

    /// True while the addition cursor has elements left
    pub fn more_additions(&self) -> bool {
        !self.additions.is_empty()
    }

    /// Yield the next addition, merging it into the running result.
    ///
    /// Callers issue exactly one link side effect per yielded element.
    ///
    /// # Panics
    /// Panics if the addition cursor is exhausted; guard with
    /// [`more_additions`](Self::more_additions).
    pub fn next_addition(&mut self) -> T {
        let item = self
            .additions
            .pop_front()
            .expect("next_addition called past exhaustion");
        self.applied_additions.push(item.clone());
        item
    }

    /// The reconciled collection: `previous` minus applied deletions plus
    /// applied additions. Equal to `desired` (as a set) once both cursors
    /// are exhausted.
    pub fn result(self) -> Vec<T> {
        let mut result: Vec<T> = self
            .previous
            .into_iter()
            .filter(|(key, _)| !self.applied_deletions.contains(key))
            .map(|(_, item)| item)
            .collect();
        result.extend(self.applied_additions);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl MutableSetItem for i32 {
        type Key = i32;

        fn set_key(&self) -> i32 {
            *self
        }
    }

    fn drain<T: MutableSetItem + Clone>(m: &mut SetMutator<T>) -> (Vec<T>, Vec<T>) {
        let mut deleted = Vec::new();
        let mut added = Vec::new();
        while m.more_deletions() {
            deleted.push(m.next_deletion());
        }
        while m.more_additions() {
            added.push(m.next_addition());
        }
        (deleted, added)
    }

    #[test]
    fn diff_yields_ordered_deletions_and_additions() {
        let previous = vec![1, 2, 3, 4];
        let desired = vec![3, 4, 5, 6];
        let mut m = SetMutator::new(&previous, &desired);
        let (deleted, added) = drain(&mut m);
        assert_eq!(deleted, vec![1, 2]);
        assert_eq!(added, vec![5, 6]);
    }

    #[test]
    fn result_equals_desired_after_exhaustion() {
        let previous = vec![10, 20, 30];
        let desired = vec![30, 40];
        let mut m = SetMutator::new(&previous, &desired);
        drain(&mut m);
        let mut result = m.result();
        result.sort();
        assert_eq!(result, vec![30, 40]);
    }

    #[test]
    fn additions_and_deletions_are_disjoint() {
        let previous = vec![1, 2, 3];
        let desired = vec![2, 3, 4];
        let mut m = SetMutator::new(&previous, &desired);
        let (deleted, added) = drain(&mut m);
        for d in &deleted {
            assert!(!added.contains(d));
        }
    }

    #[test]
    fn identical_sets_yield_no_work() {
        let previous = vec![7, 8];
        let desired = vec![8, 7];
        let m = SetMutator::new(&previous, &desired);
        assert!(!m.more_deletions());
        assert!(!m.more_additions());
        let mut result = m.result();
        result.sort();
        assert_eq!(result, vec![7, 8]);
    }

    #[test]
    fn empty_previous_adds_everything() {
        let mut m = SetMutator::new(&[], &[1, 2]);
        let (deleted, added) = drain(&mut m);
        assert!(deleted.is_empty());
        assert_eq!(added, vec![1, 2]);
        assert_eq!(m.result(), vec![1, 2]);
    }

    #[test]
    fn empty_desired_deletes_everything() {
        let mut m = SetMutator::new(&[1, 2], &[]);
        let (deleted, added) = drain(&mut m);
        assert_eq!(deleted, vec![1, 2]);
        assert!(added.is_empty());
        assert!(m.result().is_empty());
    }

    #[test]
    fn partial_drain_reflects_applied_operations_only() {
        let previous = vec![1, 2, 3];
        let desired = vec![3, 4, 5];
        let mut m = SetMutator::new(&previous, &desired);
        m.next_deletion(); // removes 1
        m.next_addition(); // adds 4
        let mut result = m.result();
        result.sort();
        assert_eq!(result, vec![2, 3, 4]);
    }
}
