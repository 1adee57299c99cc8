//! Edit views, the only recording path into a [`Tracked`] aggregate.
//!
//! An [`Edit`] is one action. It dereferences to a [`FieldEdit`] at its base
//! path; `field`, `index` and `at` step down to nested fields. Every mutation
//! applies to the live aggregate immediately and appends its events, including
//! any selection remapping it causes, to the open action.

use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    op::{CapacityChange, Event},
    reflect::{FieldKind, Indexed, Member, Sequence, Value, deserialize_value, serialize_value},
    types::{ActionIndex, Path, PathStep},
};

use super::{
    reorder, selection,
    tracker::{TrackError, Tracked},
};

/// One recorded action. Commits when dropped.
pub struct Edit<'a, T: Member, U: Clone = ()> {
    inner: FieldEdit<'a, T, U>,
    committed: bool,
}

impl<'a, T: Member, U: Clone> Edit<'a, T, U> {
    pub(crate) fn new(tracked: &'a mut Tracked<T, U>, path: Path, kind: Arc<FieldKind>) -> Self {
        Self {
            inner: FieldEdit::new(tracked, path, kind),
            committed: false,
        }
    }

    /// Closes the action. Returns its index, or `None` if nothing was recorded.
    pub fn commit(mut self) -> Option<ActionIndex> {
        self.committed = true;
        self.inner.tracked.commit_action()
    }
}

impl<'a, T: Member, U: Clone> Deref for Edit<'a, T, U> {
    type Target = FieldEdit<'a, T, U>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: Member, U: Clone> DerefMut for Edit<'_, T, U> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T: Member, U: Clone> Drop for Edit<'_, T, U> {
    fn drop(&mut self) {
        if !self.committed {
            self.inner.tracked.commit_action();
        }
    }
}

/// Recording view of one field or element.
pub struct FieldEdit<'a, T, U = ()> {
    tracked: &'a mut Tracked<T, U>,
    path: Path,
    kind: Arc<FieldKind>,
}

impl<'a, T: Member, U: Clone> FieldEdit<'a, T, U> {
    pub(crate) fn new(tracked: &'a mut Tracked<T, U>, path: Path, kind: Arc<FieldKind>) -> Self {
        Self { tracked, path, kind }
    }

    /// Path of the field being edited.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor of the field being edited.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Named field of an aggregate.
    pub fn field(&mut self, name: &str) -> Result<FieldEdit<'_, T, U>, TrackError> {
        let FieldKind::Aggregate(ty) = self.kind.as_ref() else {
            return Err(TrackError::NotAggregate(self.name()));
        };
        let index = ty
            .index_of(name)
            .ok_or_else(|| TrackError::UnknownPath(format!("{}.{name}", self.name())))?;
        let kind = Arc::clone(&ty.fields[index].kind);
        let path = self.path.child(PathStep::Field(index));
        Ok(FieldEdit::new(&mut *self.tracked, path, kind))
    }

    /// Element `index` of a fixed array or sequence.
    pub fn index(&mut self, index: usize) -> Result<FieldEdit<'_, T, U>, TrackError> {
        let len = self.len()?;
        self.check_index(index, len)?;
        let kind = self
            .kind
            .child(PathStep::Index(index))
            .ok_or_else(|| TrackError::NotIndexed(self.name()))?;
        let path = self.path.element(index);
        Ok(FieldEdit::new(&mut *self.tracked, path, kind))
    }

    /// Nested field by relative path text, e.g. `bar_vec[0].ints`.
    pub fn at(&mut self, expr: &str) -> Result<FieldEdit<'_, T, U>, TrackError> {
        let (relative, kind) = self.kind.resolve(expr)?;
        let mut path = self.path.clone();
        for step in relative.steps() {
            path.push(*step);
        }
        if self.tracked.member(&path).is_none() {
            return Err(TrackError::UnknownPath(self.tracked.describe(&path)));
        }
        Ok(FieldEdit::new(&mut *self.tracked, path, kind))
    }

    /// The field itself.
    pub fn get(&self) -> Result<&dyn Member, TrackError> {
        self.tracked
            .member(&self.path)
            .ok_or_else(|| TrackError::UnknownPath(self.name()))
    }

    /// Current value, converted to `V`.
    pub fn value<V: DeserializeOwned>(&self) -> Result<V, TrackError> {
        let value = self.get()?.to_value()?;
        Ok(deserialize_value(value)?)
    }

    /// Element count of a fixed array or sequence.
    pub fn len(&self) -> Result<usize, TrackError> {
        Ok(self.indexed()?.len())
    }

    /// Returns true when the array or sequence has no elements.
    pub fn is_empty(&self) -> Result<bool, TrackError> {
        Ok(self.len()? == 0)
    }

    /// Selected indices, in selection order.
    pub fn selection(&self) -> &[usize] {
        self.tracked.selection_at(&self.path)
    }

    /// Assigns the whole field.
    pub fn set<V: Serialize>(&mut self, value: V) -> Result<(), TrackError> {
        let value = serialize_value(&value)?;
        self.assign(value)
    }

    /// Replaces every element of an array or sequence.
    pub fn assign_values<V: Serialize>(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), TrackError> {
        self.indexed()?;
        let values = serialize_all(values)?;
        self.assign(Value::Array(values))
    }

    /// Replaces a sequence with `count` copies of `value`.
    pub fn assign_n<V: Serialize>(&mut self, count: usize, value: V) -> Result<(), TrackError> {
        self.sequence()?;
        let value = serialize_value(&value)?;
        self.assign(Value::Array(vec![value; count]))
    }

    /// Removes every element of a sequence.
    pub fn clear(&mut self) -> Result<(), TrackError> {
        self.sequence()?;
        self.assign(Value::Array(Vec::new()))
    }

    /// Grows with default elements or truncates.
    pub fn resize(&mut self, new_len: usize) -> Result<(), TrackError> {
        let (len, default) = {
            let sequence = self.sequence()?;
            (sequence.len(), sequence.default_element()?)
        };
        match new_len.cmp(&len) {
            Ordering::Greater => self.insert_values(len, vec![default; new_len - len]),
            Ordering::Less => self.remove_indices((new_len..len).collect()),
            Ordering::Equal => Ok(()),
        }
    }

    /// Reserves room for `additional` more elements. Recorded, but undo leaves capacity alone.
    pub fn reserve(&mut self, additional: usize) -> Result<(), TrackError> {
        self.change_capacity(CapacityChange::Reserve(additional))
    }

    /// Releases spare capacity. Recorded, but undo leaves capacity alone.
    pub fn shrink_to_fit(&mut self) -> Result<(), TrackError> {
        self.change_capacity(CapacityChange::ShrinkToFit)
    }

    /// Appends one element.
    pub fn push<V: Serialize>(&mut self, value: V) -> Result<(), TrackError> {
        let len = self.sequence()?.len();
        self.insert_values(len, vec![serialize_value(&value)?])
    }

    /// Appends every value in order.
    pub fn append<V: Serialize>(&mut self, values: impl IntoIterator<Item = V>) -> Result<(), TrackError> {
        let len = self.sequence()?.len();
        let values = serialize_all(values)?;
        self.insert_values(len, values)
    }

    /// Inserts one element at `at`; `at == len` appends.
    pub fn insert<V: Serialize>(&mut self, at: usize, value: V) -> Result<(), TrackError> {
        self.insert_n(at, 1, value)
    }

    /// Inserts `count` copies of `value` before `at`.
    pub fn insert_n<V: Serialize>(&mut self, at: usize, count: usize, value: V) -> Result<(), TrackError> {
        let len = self.sequence()?.len();
        if at > len {
            return Err(self.out_of_range(at, len));
        }
        let value = serialize_value(&value)?;
        self.insert_values(at, vec![value; count])
    }

    /// Removes the element at `at`.
    pub fn remove(&mut self, at: usize) -> Result<(), TrackError> {
        self.remove_n(at, 1)
    }

    /// Removes `count` elements starting at `at`.
    pub fn remove_n(&mut self, at: usize, count: usize) -> Result<(), TrackError> {
        let len = self.sequence()?.len();
        let end = at.saturating_add(count);
        if count > 0 && end > len {
            return Err(self.out_of_range(end - 1, len));
        }
        self.remove_indices((at..end).collect())
    }

    /// Exchanges two elements.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(&[a, b], len)?;
        self.apply_order(reorder::swap(len, a, b), false)
    }

    /// Moves one element a slot toward the front; the first element stays.
    pub fn move_up(&mut self, index: usize) -> Result<(), TrackError> {
        self.move_up_n(&[index])
    }

    /// Moves each element a slot toward the front. Blocked elements stay put.
    pub fn move_up_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        self.move_indices(indices, reorder::move_up)
    }

    /// Moves one element a slot toward the back; the last element stays.
    pub fn move_down(&mut self, index: usize) -> Result<(), TrackError> {
        self.move_down_n(&[index])
    }

    /// Moves each element a slot toward the back.
    pub fn move_down_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        self.move_indices(indices, reorder::move_down)
    }

    /// Moves one element to the front.
    pub fn move_top(&mut self, index: usize) -> Result<(), TrackError> {
        self.move_top_n(&[index])
    }

    /// Moves elements to the front, keeping their relative order.
    pub fn move_top_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        self.move_indices(indices, reorder::move_top)
    }

    /// Moves one element to the back.
    pub fn move_bottom(&mut self, index: usize) -> Result<(), TrackError> {
        self.move_bottom_n(&[index])
    }

    /// Moves elements to the back, keeping their relative order.
    pub fn move_bottom_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        self.move_indices(indices, reorder::move_bottom)
    }

    /// Moves one element so it ends up at `target`.
    pub fn move_to(&mut self, index: usize, target: usize) -> Result<(), TrackError> {
        self.move_to_n(&[index], target)
    }

    /// Moves elements so they form a block starting at `target`, counted
    /// among the elements that stay.
    pub fn move_to_n(&mut self, indices: &[usize], target: usize) -> Result<(), TrackError> {
        let len = self.len()?;
        if target > len {
            return Err(self.out_of_range(target, len));
        }
        self.move_indices(indices, |len, indices| reorder::move_to(len, indices, target))
    }

    /// Stable ascending sort.
    pub fn sort(&mut self) -> Result<(), TrackError> {
        self.sort_by_value(false)
    }

    /// Stable descending sort.
    pub fn sort_desc(&mut self) -> Result<(), TrackError> {
        self.sort_by_value(true)
    }

    /// Adds one index to the selection.
    pub fn select(&mut self, index: usize) -> Result<(), TrackError> {
        self.select_n(&[index])
    }

    /// Adds indices to the selection, in order, skipping ones already there.
    pub fn select_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(indices, len)?;
        let new = selection::select(self.selection(), indices);
        self.record_selection(new)
    }

    /// Drops one index from the selection.
    pub fn deselect(&mut self, index: usize) -> Result<(), TrackError> {
        self.deselect_n(&[index])
    }

    /// Drops indices from the selection; unselected ones are ignored.
    pub fn deselect_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(indices, len)?;
        let new = selection::deselect(self.selection(), indices);
        self.record_selection(new)
    }

    /// Flips whether `index` is selected.
    pub fn toggle_selected(&mut self, index: usize) -> Result<(), TrackError> {
        self.toggle_selected_n(&[index])
    }

    /// Flips each index in turn.
    pub fn toggle_selected_n(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(indices, len)?;
        let new = selection::toggle(self.selection(), indices);
        self.record_selection(new)
    }

    /// Empties the selection.
    pub fn clear_selections(&mut self) -> Result<(), TrackError> {
        self.indexed()?;
        self.record_selection(Vec::new())
    }

    /// Selects every element in index order.
    pub fn select_all(&mut self) -> Result<(), TrackError> {
        let len = self.len()?;
        self.record_selection(selection::select_all(len))
    }

    /// Orders the selection by ascending element value. Membership is kept.
    pub fn sort_selection(&mut self) -> Result<(), TrackError> {
        self.sort_selection_by_value(false)
    }

    /// Orders the selection by descending element value.
    pub fn sort_selection_descending(&mut self) -> Result<(), TrackError> {
        self.sort_selection_by_value(true)
    }

    /// Replaces the selection; duplicates after the first are dropped.
    pub fn set_selection(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(indices, len)?;
        self.record_selection(selection::select(&[], indices))
    }

    /// Assigns `value` to every selected element, in selection order.
    pub fn set_selected<V: Serialize>(&mut self, value: V) -> Result<(), TrackError> {
        self.set_selected_at("", value)
    }

    /// Assigns `value` to the field at `expr` inside every selected element,
    /// e.g. `angle` or `points[1]`.
    pub fn set_selected_at<V: Serialize>(&mut self, expr: &str, value: V) -> Result<(), TrackError> {
        let element = match self.kind.as_ref() {
            FieldKind::FixedArray { element, .. } | FieldKind::Sequence { element } => Arc::clone(element),
            _ => return Err(TrackError::NotIndexed(self.name())),
        };
        let (relative, _) = element.resolve(expr)?;
        let value = serialize_value(&value)?;

        let mut events = Vec::new();
        for &index in self.selection() {
            let mut path = self.path.element(index);
            for step in relative.steps() {
                path.push(*step);
            }
            let old = self
                .tracked
                .member(&path)
                .ok_or_else(|| TrackError::UnknownPath(self.tracked.describe(&path)))?
                .to_value()?;
            events.push(Event::Set {
                path: path.clone(),
                old,
                new: value.clone(),
            });
            events.extend(self.tracked.clearing_selections(&path));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.tracked.submit(events)
    }

    /// Removes every selected element from a sequence.
    pub fn remove_selection(&mut self) -> Result<(), TrackError> {
        self.sequence()?;
        let selected = self.selection().to_vec();
        self.remove_indices(selected)
    }

    /// [`move_up_n`](Self::move_up_n) over the current selection.
    pub fn move_selections_up(&mut self) -> Result<(), TrackError> {
        let selected = self.selection().to_vec();
        self.move_up_n(&selected)
    }

    /// [`move_down_n`](Self::move_down_n) over the current selection.
    pub fn move_selections_down(&mut self) -> Result<(), TrackError> {
        let selected = self.selection().to_vec();
        self.move_down_n(&selected)
    }

    /// [`move_top_n`](Self::move_top_n) over the current selection.
    pub fn move_selections_top(&mut self) -> Result<(), TrackError> {
        let selected = self.selection().to_vec();
        self.move_top_n(&selected)
    }

    /// [`move_bottom_n`](Self::move_bottom_n) over the current selection.
    pub fn move_selections_bottom(&mut self) -> Result<(), TrackError> {
        let selected = self.selection().to_vec();
        self.move_bottom_n(&selected)
    }

    /// [`move_to_n`](Self::move_to_n) over the current selection.
    pub fn move_selections_to(&mut self, target: usize) -> Result<(), TrackError> {
        let selected = self.selection().to_vec();
        self.move_to_n(&selected, target)
    }

    fn name(&self) -> String {
        self.tracked.describe(&self.path)
    }

    fn indexed(&self) -> Result<&dyn Indexed, TrackError> {
        self.get()?
            .as_indexed()
            .ok_or_else(|| TrackError::NotIndexed(self.name()))
    }

    fn sequence(&self) -> Result<&dyn Sequence, TrackError> {
        self.get()?
            .as_sequence()
            .ok_or_else(|| TrackError::NotSequence(self.name()))
    }

    fn out_of_range(&self, index: usize, len: usize) -> TrackError {
        TrackError::IndexOutOfRange {
            path: self.name(),
            index,
            len,
        }
    }

    fn check_index(&self, index: usize, len: usize) -> Result<(), TrackError> {
        if index >= len {
            return Err(self.out_of_range(index, len));
        }
        Ok(())
    }

    fn check_indices(&self, indices: &[usize], len: usize) -> Result<(), TrackError> {
        indices
            .iter()
            .try_for_each(|&index| self.check_index(index, len))
    }

    fn assign(&mut self, new: Value) -> Result<(), TrackError> {
        let old = self.get()?.to_value()?;
        let mut events = vec![Event::Set {
            path: self.path.clone(),
            old,
            new,
        }];
        events.extend(self.tracked.clearing_selections(&self.path));
        self.tracked.submit(events)
    }

    fn change_capacity(&mut self, change: CapacityChange) -> Result<(), TrackError> {
        self.sequence()?;
        self.tracked.submit(vec![Event::Capacity {
            path: self.path.clone(),
            change,
        }])
    }

    fn insert_values(&mut self, at: usize, values: Vec<Value>) -> Result<(), TrackError> {
        if values.is_empty() {
            return Ok(());
        }
        let count = values.len();
        let own = selection::after_insert(self.selection(), at, count);
        let data = Event::Insert {
            path: self.path.clone(),
            at,
            values,
        };
        let events = self.with_selection_updates(data, own, |index| {
            Some(if index >= at { index + count } else { index })
        });
        self.tracked.submit(events)
    }

    fn remove_indices(&mut self, mut indices: Vec<usize>) -> Result<(), TrackError> {
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            return Ok(());
        }

        let sequence = self.sequence()?;
        let len = sequence.len();
        let mut removed = Vec::with_capacity(indices.len());
        for &index in &indices {
            let element = sequence
                .element(index)
                .ok_or_else(|| self.out_of_range(index, len))?;
            removed.push((index, element.to_value()?));
        }

        let own = selection::after_remove(self.selection(), &indices);
        let data = Event::Remove {
            path: self.path.clone(),
            removed,
        };
        let events = self.with_selection_updates(data, own, |index| {
            if indices.binary_search(&index).is_ok() {
                None
            } else {
                Some(index - indices.partition_point(|&r| r < index))
            }
        });
        self.tracked.submit(events)
    }

    fn move_indices(
        &mut self,
        indices: &[usize],
        arrange: impl FnOnce(usize, &[usize]) -> Vec<usize>,
    ) -> Result<(), TrackError> {
        let len = self.len()?;
        self.check_indices(indices, len)?;
        if indices.is_empty() {
            return Ok(());
        }
        self.apply_order(arrange(len, indices), false)
    }

    fn sort_by_value(&mut self, descending: bool) -> Result<(), TrackError> {
        let order = {
            let indexed = self.indexed()?;
            reorder::sorted(indexed.len(), descending, |a, b| element_order(indexed, a, b))
        };
        self.apply_order(order, true)
    }

    fn sort_selection_by_value(&mut self, descending: bool) -> Result<(), TrackError> {
        let new = {
            let indexed = self.indexed()?;
            selection::sorted_by_value(self.selection(), descending, |a, b| {
                element_order(indexed, a, b)
            })
        };
        self.record_selection(new)
    }

    fn apply_order(&mut self, order: Vec<usize>, sorting: bool) -> Result<(), TrackError> {
        let inverse = reorder::inverse(&order);
        let own = if sorting {
            selection::after_sort(self.selection(), &order)
        } else {
            selection::after_reorder(self.selection(), &order)
        };
        let data = Event::Reorder {
            path: self.path.clone(),
            order,
        };
        let events = self.with_selection_updates(data, own, |index| inverse.get(index).copied());
        self.tracked.submit(events)
    }

    fn record_selection(&mut self, new: Vec<usize>) -> Result<(), TrackError> {
        let old = self.selection();
        if old == new.as_slice() {
            return Ok(());
        }
        let event = Event::Select {
            path: self.path.clone(),
            old: old.to_vec(),
            new,
        };
        self.tracked.submit(vec![event])
    }

    /// `data` followed by the selection changes it implies: the field's own
    /// selection becomes `own`, and selections held inside its elements follow
    /// `map` from old to new element index.
    fn with_selection_updates(
        &self,
        data: Event,
        own: Vec<usize>,
        map: impl Fn(usize) -> Option<usize>,
    ) -> Vec<Event> {
        let mut events = vec![data];
        let old = self.selection();
        if old != own.as_slice() {
            events.push(Event::Select {
                path: self.path.clone(),
                old: old.to_vec(),
                new: own,
            });
        }
        events.extend(
            self.tracked
                .overlay()
                .remap_below(&self.path, map)
                .into_iter()
                .map(Event::from),
        );
        events
    }
}

/// Element ordering for sorts. Every reflected type orders totally; a type
/// mismatch, which a homogeneous collection cannot produce, counts as equal.
fn element_order(indexed: &dyn Indexed, a: usize, b: usize) -> Ordering {
    indexed.compare_elements(a, b).unwrap_or(Ordering::Equal)
}

fn serialize_all<V: Serialize>(values: impl IntoIterator<Item = V>) -> Result<Vec<Value>, TrackError> {
    values
        .into_iter()
        .map(|value| serialize_value(&value).map_err(TrackError::from))
        .collect()
}
