//! Selection overlay: ordered selected indices per indexed field.
//!
//! Selections are not part of the aggregate. They live beside it, keyed by
//! field path, and change only through recorded `Select` events so undo and
//! redo restore them in lockstep with the data.
//!
//! The free functions compute a new selection from an old one; they never
//! touch the overlay.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::{op::Event, types::{Path, PathStep}};

use super::reorder;

/// A pending change to the selection at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    /// Indexed field owning the selection.
    pub path: Path,
    /// Selection before the change.
    pub old: Vec<usize>,
    /// Selection after the change.
    pub new: Vec<usize>,
}

impl From<SelectionChange> for Event {
    fn from(change: SelectionChange) -> Self {
        Event::Select {
            path: change.path,
            old: change.old,
            new: change.new,
        }
    }
}

/// Selections of every indexed field, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOverlay {
    by_path: BTreeMap<Path, Vec<usize>>,
}

impl SelectionOverlay {
    /// Overlay with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected indices at `path`, in selection order.
    pub fn get(&self, path: &Path) -> &[usize] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the selection at `path`; an empty selection removes the entry.
    pub fn set(&mut self, path: &Path, selection: Vec<usize>) {
        if selection.is_empty() {
            self.by_path.remove(path);
        } else {
            self.by_path.insert(path.clone(), selection);
        }
    }

    /// Returns true when no field has a selection.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Drops every selection.
    pub fn clear(&mut self) {
        self.by_path.clear();
    }

    /// Every non-empty selection.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[usize])> {
        self.by_path.iter().map(|(path, sel)| (path, sel.as_slice()))
    }

    fn below<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a Path, &'a Vec<usize>)> + 'a {
        self.by_path
            .range(path.clone()..)
            .take_while(move |(key, _)| key.starts_with(path))
            .filter(move |(key, _)| key.len() > path.len())
    }

    /// Changes that clear every selection strictly below `path`.
    pub fn clear_below(&self, path: &Path) -> Vec<SelectionChange> {
        self.below(path)
            .map(|(key, sel)| SelectionChange {
                path: key.clone(),
                old: sel.clone(),
                new: Vec::new(),
            })
            .collect()
    }

    /// Changes that re-key selections held inside elements of the indexed
    /// field at `path` after its elements moved. `map` gives an element's new
    /// index, or `None` when the element is gone.
    pub fn remap_below(
        &self,
        path: &Path,
        map: impl Fn(usize) -> Option<usize>,
    ) -> Vec<SelectionChange> {
        let depth = path.len();
        let mut before: BTreeMap<Path, Vec<usize>> = BTreeMap::new();
        let mut after: BTreeMap<Path, Vec<usize>> = BTreeMap::new();

        for (key, sel) in self.below(path) {
            let PathStep::Index(index) = key.steps()[depth] else {
                continue;
            };
            before.insert(key.clone(), sel.clone());
            if let Some(moved) = map(index) {
                after.insert(key.with_step(depth, PathStep::Index(moved)), sel.clone());
            }
        }

        let mut keys: Vec<&Path> = before.keys().chain(after.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let old = before.get(key).cloned().unwrap_or_default();
                let new = after.get(key).cloned().unwrap_or_default();
                (old != new).then(|| SelectionChange {
                    path: key.clone(),
                    old,
                    new,
                })
            })
            .collect()
    }
}

/// Appends each index not yet selected, in call order.
pub fn select(current: &[usize], indices: &[usize]) -> Vec<usize> {
    let mut out = current.to_vec();
    for &index in indices {
        if !out.contains(&index) {
            out.push(index);
        }
    }
    out
}

/// Removes the given indices, keeping survivors in order.
pub fn deselect(current: &[usize], indices: &[usize]) -> Vec<usize> {
    current
        .iter()
        .copied()
        .filter(|index| !indices.contains(index))
        .collect()
}

/// Flips each index in turn: selected ones are dropped, others appended.
pub fn toggle(current: &[usize], indices: &[usize]) -> Vec<usize> {
    let mut out = current.to_vec();
    for &index in indices {
        if let Some(pos) = out.iter().position(|&s| s == index) {
            out.remove(pos);
        } else {
            out.push(index);
        }
    }
    out
}

/// Every index of `0..len` in order.
pub fn select_all(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// Shifts selections at or past `at` up by `count`.
pub fn after_insert(current: &[usize], at: usize, count: usize) -> Vec<usize> {
    current
        .iter()
        .map(|&index| if index >= at { index + count } else { index })
        .collect()
}

/// Drops removed indices and renumbers the survivors. `removed` must be
/// sorted ascending.
pub fn after_remove(current: &[usize], removed: &[usize]) -> Vec<usize> {
    current
        .iter()
        .filter(|index| removed.binary_search(*index).is_err())
        .map(|&index| index - removed.partition_point(|&r| r < index))
        .collect()
}

/// Maps selections to the new position of their element; order is kept.
pub fn after_reorder(current: &[usize], order: &[usize]) -> Vec<usize> {
    let inverse = reorder::inverse(order);
    current
        .iter()
        .filter_map(|&index| inverse.get(index).copied())
        .collect()
}

/// Like [`after_reorder`], then sorted by position.
pub fn after_sort(current: &[usize], order: &[usize]) -> Vec<usize> {
    let mut out = after_reorder(current, order);
    out.sort_unstable();
    out
}

/// Orders the selection by element value; `compare` orders two element
/// indices. Equal values keep their selection order.
pub fn sorted_by_value(
    current: &[usize],
    descending: bool,
    compare: impl Fn(usize, usize) -> Ordering,
) -> Vec<usize> {
    let mut out = current.to_vec();
    if descending {
        out.sort_by(|&a, &b| compare(b, a));
    } else {
        out.sort_by(|&a, &b| compare(a, b));
    }
    out
}
